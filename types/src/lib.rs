//! Core domain types for Switchboard.
//!
//! This crate contains the pure data model shared by the hub and every
//! endpoint: roles, instance keys, channel names, addresses and the wire
//! envelope. No IO, no async.

mod address;
mod envelope;
mod name;

pub use address::{Address, AddressError};
pub use envelope::{CallbackId, Envelope, EnvelopeError, EnvelopeKind, SenderInfo};
pub use name::{
    CHANNEL_NAME_PREFIX, ChannelName, NAME_WILDCARD, NameError, is_protocol_name, prefix_target,
    strip_prefix,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Roles
// ============================================================================

/// The kind of execution context taking part in the exchange.
///
/// `Background` is the privileged singleton (the hub role); every other role
/// is a peer that may run in many concurrent instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Background,
    Popup,
    Devtool,
    ContentScript,
}

/// How a role's instance key is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceScope {
    /// One instance per host; addressed through the sentinel slot.
    Singleton,
    /// The peer looks up its own instance key and declares it on the wire.
    Declared,
    /// The hub reads the instance key from the channel's sender descriptor.
    Derived,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{token}' (supported: background, popup, devtool, content_script)")]
pub struct UnknownRoleError {
    token: String,
}

impl UnknownRoleError {
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Background,
        Role::Popup,
        Role::Devtool,
        Role::ContentScript,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Background => "background",
            Role::Popup => "popup",
            Role::Devtool => "devtool",
            Role::ContentScript => "content_script",
        }
    }

    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == token)
    }

    /// Whether this is the privileged singleton role that hosts the hub.
    #[must_use]
    pub const fn is_hub(self) -> bool {
        matches!(self, Role::Background)
    }

    #[must_use]
    pub const fn instance_scope(self) -> InstanceScope {
        match self {
            Role::Background => InstanceScope::Singleton,
            Role::Popup | Role::Devtool => InstanceScope::Declared,
            Role::ContentScript => InstanceScope::Derived,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownRoleError {
            token: s.to_string(),
        })
    }
}

// ============================================================================
// Instance keys
// ============================================================================

/// Identifies one concurrent instance of a peer role (a tab or window id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKey(i64);

impl InstanceKey {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for InstanceKey {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The instance half of a registry bucket key.
///
/// The hub role is a singleton and never carries a numeric key; it lives in
/// the `Singleton` sentinel slot so it cannot collide with a peer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceSlot {
    Singleton,
    Key(InstanceKey),
}

impl InstanceSlot {
    /// The instance key as seen by callers: `None` for the singleton slot.
    #[must_use]
    pub const fn instance(self) -> Option<InstanceKey> {
        match self {
            InstanceSlot::Singleton => None,
            InstanceSlot::Key(key) => Some(key),
        }
    }
}

impl fmt::Display for InstanceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceSlot::Singleton => f.write_str("singleton"),
            InstanceSlot::Key(key) => write!(f, "{key}"),
        }
    }
}

// ============================================================================
// Origin
// ============================================================================

/// Who sent an incoming message, formatted as `role:name[:instance]`.
///
/// The instance is only present for peer senders; the hub role is a
/// singleton and is never qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    role: Role,
    name: String,
    instance: Option<InstanceKey>,
}

impl Origin {
    #[must_use]
    pub fn new(role: Role, name: impl Into<String>, instance: Option<InstanceKey>) -> Self {
        let instance = if role.is_hub() { None } else { instance };
        Self {
            role,
            name: name.into(),
            instance,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Unprefixed channel name of the sender.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instance(&self) -> Option<InstanceKey> {
        self.instance
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.name)?;
        if let Some(instance) = self.instance {
            write!(f, ":{instance}")?;
        }
        Ok(())
    }
}
