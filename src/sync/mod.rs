//! Sync engine
//!
//! # Module Structure
//!
//! - [`orchestrator`] - Fetch-and-flatten of one table tree in one context
//! - [`reconciler`] - Deletion of rows not seen in the current pass
//! - [`multiplexer`] - One pass over all root tables and contexts
//! - [`report`] - Per-unit outcome of a pass
//! - [`retry`] - Backoff policy for sink operations
//! - [`cancel`] - Cancellation shared by every task of a pass

pub mod cancel;
pub mod multiplexer;
pub mod orchestrator;
pub mod reconciler;
pub mod report;
pub mod retry;

pub use cancel::CancelToken;
pub use multiplexer::Multiplexer;
pub use orchestrator::{Orchestrator, ParentRef, RunState, ScopeEntry, ScopeLedger};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use report::{Failure, PassReport, PassStatus, ScopeReport, Warning};
pub use retry::RetryPolicy;
