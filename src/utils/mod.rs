pub mod logging;
pub mod phone_number;
pub mod retry;

pub use retry::retry_once;
