//! # gits-watchlist
//!
//! The persisted set of repositories `gits` fans commands out to.
//!
//! A watchlist is a single JSON file holding the command [`Policy`] and a
//! name-keyed map of [`Target`]s:
//!
//! ```json
//! {
//!   "restriction": ["status", "fetch"],
//!   "repository": {
//!     "app": { "gitdir": "/src/app/.git", "workdir": "/src/app" }
//!   }
//! }
//! ```
//!
//! ## Key components
//!
//! - [`Target`] - one repository's git-dir and work-tree
//! - [`TargetSet`] - name-ordered map of targets, read-only during dispatch
//! - [`Watchlist`] - load/save plus watch, unwatch, prune and filtering
//!
//! [`Policy`]: gits_policy::Policy

pub mod error;
pub mod store;
pub mod target;

pub use error::WatchlistError;
pub use store::Watchlist;
pub use target::{Target, TargetSet};
