pub mod admin;
pub mod requests;
pub mod users;
