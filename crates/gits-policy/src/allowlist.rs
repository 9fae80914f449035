// allowlist.rs - First-argument allow-list.
//
// The policy is consulted once per dispatch, before any process is spawned.
// It only ever looks at the first argument of the forwarded command line;
// everything after it is passed through untouched.
//
// Unlike a default-deny manifest, an empty list here means "no restriction".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Ordered list of permitted first arguments.
///
/// Serializes as a plain JSON array (`"restriction": ["status", "fetch"]`).
/// A missing or `null` array deserializes to the unrestricted policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy {
    #[serde(deserialize_with = "null_as_empty")]
    allowed: Vec<String>,
}

impl Policy {
    /// Policy that permits only the given first arguments.
    ///
    /// Passing an empty iterator yields the unrestricted policy.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Policy that permits every command.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// True when no restriction is configured.
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// The configured entries, in file order.
    pub fn entries(&self) -> &[String] {
        &self.allowed
    }

    /// Whether `first_arg` may be dispatched.
    ///
    /// Always true for an unrestricted policy. Otherwise true iff
    /// `first_arg` equals one entry exactly.
    pub fn is_allowed(&self, first_arg: &str) -> bool {
        self.is_unrestricted() || self.allowed.iter().any(|entry| entry == first_arg)
    }

    /// Check a full command line before dispatch.
    ///
    /// The command is its first element; an empty vector or an empty first
    /// element is rejected regardless of the allow-list.
    pub fn check<S: AsRef<str>>(&self, args: &[S]) -> Result<(), PolicyError> {
        let command = match args.first().map(AsRef::as_ref) {
            Some(command) if !command.is_empty() => command,
            _ => return Err(PolicyError::EmptyCommand),
        };

        if self.is_allowed(command) {
            Ok(())
        } else {
            Err(PolicyError::NotAllowed {
                command: command.to_string(),
                allowed: self.allowed.join(", "),
            })
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unrestricted() {
            write!(f, "All allow")
        } else {
            write!(f, "{}", self.allowed.join(", "))
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
