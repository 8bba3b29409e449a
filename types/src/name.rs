//! Channel names and the reserved protocol prefix.

use std::fmt;

use thiserror::Error;

/// Marks a transport channel as protocol traffic. Never shown to callers.
pub const CHANNEL_NAME_PREFIX: &str = "__messenger__";

/// Addresses every channel in the target bucket.
pub const NAME_WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("channel name must not be empty")]
    Empty,
    #[error("'*' is reserved as a wildcard identifier, please use another name")]
    Wildcard,
    #[error("channel name '{name}' contains the address separator '{separator}'")]
    Separator { name: String, separator: char },
}

/// A validated, unprefixed channel name chosen by the caller.
///
/// Rejects the wildcard and the address separators (`:` and `,`), which
/// would make the channel unaddressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name == NAME_WILDCARD {
            return Err(NameError::Wildcard);
        }
        if let Some(separator) = name.chars().find(|c| matches!(c, ':' | ',')) {
            return Err(NameError::Separator { name, separator });
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The on-the-wire name, carrying the protocol prefix.
    #[must_use]
    pub fn prefixed(&self) -> String {
        format!("{CHANNEL_NAME_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[must_use]
pub fn is_protocol_name(name: &str) -> bool {
    name.starts_with(CHANNEL_NAME_PREFIX)
}

/// Remove the protocol prefix, leaving foreign names untouched.
#[must_use]
pub fn strip_prefix(name: &str) -> &str {
    name.strip_prefix(CHANNEL_NAME_PREFIX).unwrap_or(name)
}

/// Prefix a target name for the wire. The wildcard stays intact.
#[must_use]
pub fn prefix_target(name: &str) -> String {
    if name == NAME_WILDCARD {
        name.to_string()
    } else {
        format!("{CHANNEL_NAME_PREFIX}{name}")
    }
}
