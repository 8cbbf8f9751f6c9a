// Middleware module
pub mod main_middleware;
pub mod rate_limit;

pub use main_middleware::*;
pub use rate_limit::*;
