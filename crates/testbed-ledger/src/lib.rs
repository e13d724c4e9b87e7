//! Ordered compensation for test-fixture lifecycles.
//!
//! Resources created for a test session register a compensating action in a
//! [`CleanupLedger`] before they are created. A [`TransactionalScope`] drains
//! the ledger in reverse when provisioning fails, and a [`SessionHandle`]
//! drains it exactly once when the session is closed.

mod action;
mod audit;
mod error;
mod handler;
mod ledger;
mod policy;
mod scope;
mod session;

pub use action::{ActionKind, CompensatingAction, Diagnostic, Diagnostics};
pub use audit::{ActionRecord, ActionStatus, DrainAuditLog};
pub use error::{BoxError, CompensationError, FailureRecord, HandlerFailure};
pub use handler::{FailureHandler, LogFailureHandler};
pub use ledger::CleanupLedger;
pub use policy::EnvironmentPolicy;
pub use scope::TransactionalScope;
pub use session::{SessionClosed, SessionHandle};
