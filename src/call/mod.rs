pub mod controller;
pub mod error;
pub mod events;
pub mod state;

pub use controller::{CallDeps, CallManager};
pub use error::{ControlAction, ControlError};
pub use events::{CallEvent, DisconnectReason, PlatformCallState, PlatformEvent};
pub use state::{CallDirection, CallHandle, CallPhase, CallSession, EndCause};
