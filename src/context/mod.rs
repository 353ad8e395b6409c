//! Deadlines, cancellation and request-scoped values.
//!
//! ## Contents
//! - [`Context`] immutable handle carrying a deadline, a cancellation signal and values
//! - [`Release`] guard that cancels a derived context (idempotent, also on drop)
//! - [`ContextManager`] applies [`ContextConfig`] policy and runs operations in scope
//!
//! ## Derivation
//! ```text
//! background ──► with_values {rid=r-1} ──► with_timeout(50ms) ──► handler ctx
//!     │                 │                        │
//!     └── never fires   └── child token          └── child token + deadline
//!                                                   min(parent, now+50ms)
//! ```
//! Cancelling any node cancels every node derived from it, never its ancestors.

mod config;
#[allow(clippy::module_inception)]
mod context;
mod manager;

pub use config::ContextConfig;
pub use context::{Context, ContextValue, Release};
pub use manager::ContextManager;
