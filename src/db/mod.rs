pub mod db;
pub mod query_timeout;
pub mod requestdb;
pub mod userdb;

#[cfg(test)]
pub mod memory;

use self::{requestdb::BloodRequestExt, userdb::UserExt};

/// Everything the workflow services need from persistence. Implemented by
/// [`db::DBClient`] in production and by the in-memory store in tests.
pub trait Store: UserExt + BloodRequestExt + std::fmt::Debug {}

impl<T> Store for T where T: UserExt + BloodRequestExt + std::fmt::Debug {}
