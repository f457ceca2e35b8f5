pub mod calls;
pub mod contacts;

pub use calls::CallLogStore;
pub use contacts::NewContact;
