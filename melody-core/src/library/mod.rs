//! Liked-tracks reconciliation
//!
//! - `ledger`: confirmed set and pending optimistic toggle (lives in the hub)
//! - `reconciler`: stream consumer and toggle-like workflow

pub mod ledger;
pub mod reconciler;

pub use ledger::{LikeLedger, PendingToggle};
pub use reconciler::LibraryReconciler;
