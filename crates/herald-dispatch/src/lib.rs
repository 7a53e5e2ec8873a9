//! Herald delivery core.
//!
//! Owns the outbound mail transport, the owner/manager access rule shared by
//! every entry point, and the routine that sends a mailing to its recipients
//! and records one attempt per recipient.

pub mod access;
pub mod dispatch;
pub mod transport;

pub use access::{Caller, is_manager, may_access};
pub use dispatch::{DeliveryOutcome, DispatchError, Dispatcher, FinishPolicy, SUCCESS_RESPONSE};
pub use transport::{LogTransport, Outgoing, SmtpConfig, SmtpTransport, Transport, TransportError};
