//! # gits-policy
//!
//! Allow-list policy for `gits`.
//!
//! A [`Policy`] decides whether a command may be fanned out across the
//! watchlist by looking only at its first argument (the subcommand name
//! for `git`).
//!
//! ## Key invariants
//!
//! - **Empty means open**: an empty or absent allow-list permits every
//!   command, including the empty string.
//! - **Exact match**: a non-empty allow-list matches by exact, case-sensitive
//!   string equality. `stat` does not match `status`.
//! - **Pure**: evaluation has no side effects and never mutates the list.

pub mod allowlist;
pub mod error;

pub use allowlist::Policy;
pub use error::PolicyError;
