pub mod background_jobs;
pub mod error;
pub mod matching_service;
pub mod notification_service;
pub mod request_service;
