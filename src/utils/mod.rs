pub mod extract;
pub mod geo;
pub mod token;
