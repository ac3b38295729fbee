pub mod error;
pub mod logging;
pub mod request_id;
