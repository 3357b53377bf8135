//! Session runtime
//!
//! Threads, hand-off between them and the status surface the operator sees.

pub mod mailbox;
pub mod session;

pub use crate::game::{ActingFlag, ActingGuard};
pub use mailbox::Mailbox;
pub use session::{LockCallback, LockEvent, Session, SessionError, SessionStatus};
