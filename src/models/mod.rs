pub mod call_log;
pub mod contact;

pub use call_log::{CallLogEntry, CallType, MissedCallRecord};
pub use contact::{Contact, ContactKind};
