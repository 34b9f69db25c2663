pub mod analytics;
pub mod error_log;
pub mod session;
pub mod session_store;
pub mod storage;
