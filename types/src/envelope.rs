//! The wire envelope exchanged over every protocol channel.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::name::strip_prefix;
use crate::{InstanceKey, Origin, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Init,
    InitAck,
    Message,
    Response,
}

impl EnvelopeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Init => "init",
            EnvelopeKind::InitAck => "init_ack",
            EnvelopeKind::Message => "message",
            EnvelopeKind::Response => "response",
        }
    }
}

/// Per-endpoint correlation token. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(NonZeroU64);

impl CallbackId {
    pub const FIRST: CallbackId = CallbackId(NonZeroU64::MIN);

    /// Returns `None` for zero.
    #[must_use]
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0.get()
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of the context that opened a channel, as reported by the
/// transport. Opaque to the protocol apart from the optional instance key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_key: Option<InstanceKey>,
}

impl SenderInfo {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            instance_key: None,
        }
    }

    #[must_use]
    pub fn with_instance(mut self, instance: InstanceKey) -> Self {
        self.instance_key = Some(instance);
        self
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame is not a valid envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("envelope could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("{kind} envelope is missing \"to\"")]
    MissingTo { kind: &'static str },
    #[error("{kind} envelope is missing \"toNames\"")]
    MissingToNames { kind: &'static str },
}

/// A protocol message.
///
/// Field names are camelCase on the wire. Optional fields are omitted when
/// absent so that relayed frames stay minimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub from: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Role>,
    /// Prefixed channel name of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    /// Prefixed target names, or the wildcard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_names: Option<Vec<String>>,
    /// Target peer instance; only set on traffic from the hub role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_instance_key: Option<InstanceKey>,
    /// The sender's own declared instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_key: Option<InstanceKey>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<CallbackId>,
    /// Stamped by the hub on relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
    /// Stamped by the hub on relay: the true sender instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayed_from_instance_key: Option<InstanceKey>,
}

impl Envelope {
    fn blank(kind: EnvelopeKind, from: Role) -> Self {
        Self {
            kind,
            from,
            to: None,
            from_name: None,
            to_names: None,
            to_instance_key: None,
            instance_key: None,
            payload: Value::Null,
            callback_id: None,
            sender: None,
            relayed_from_instance_key: None,
        }
    }

    #[must_use]
    pub fn init(from: Role, from_name: impl Into<String>, instance_key: Option<InstanceKey>) -> Self {
        Self {
            from_name: Some(from_name.into()),
            instance_key,
            ..Self::blank(EnvelopeKind::Init, from)
        }
    }

    #[must_use]
    pub fn init_ack() -> Self {
        Self::blank(EnvelopeKind::InitAck, Role::Background)
    }

    #[must_use]
    pub fn message(
        from: Role,
        from_name: impl Into<String>,
        to: Role,
        to_names: Vec<String>,
        payload: Value,
    ) -> Self {
        Self {
            to: Some(to),
            from_name: Some(from_name.into()),
            to_names: Some(to_names),
            payload,
            ..Self::blank(EnvelopeKind::Message, from)
        }
    }

    #[must_use]
    pub fn response(
        from: Role,
        from_name: impl Into<String>,
        to: Role,
        to_name: impl Into<String>,
        callback_id: CallbackId,
        payload: Value,
    ) -> Self {
        Self {
            to: Some(to),
            from_name: Some(from_name.into()),
            to_names: Some(vec![to_name.into()]),
            payload,
            callback_id: Some(callback_id),
            ..Self::blank(EnvelopeKind::Response, from)
        }
    }

    pub fn from_frame(frame: Value) -> Result<Self, EnvelopeError> {
        serde_json::from_value(frame).map_err(EnvelopeError::Decode)
    }

    pub fn to_frame(&self) -> Result<Value, EnvelopeError> {
        serde_json::to_value(self).map_err(EnvelopeError::Encode)
    }

    /// The addressing of a MESSAGE or RESPONSE.
    ///
    /// Missing or empty `to`/`toNames` is a protocol violation.
    pub fn routing(&self) -> Result<(Role, &[String]), EnvelopeError> {
        let kind = self.kind.as_str();
        let to = self.to.ok_or(EnvelopeError::MissingTo { kind })?;
        match self.to_names.as_deref() {
            Some(names) if !names.is_empty() => Ok((to, names)),
            _ => Err(EnvelopeError::MissingToNames { kind }),
        }
    }

    /// The sender as presented to a message handler.
    #[must_use]
    pub fn origin(&self) -> Origin {
        let name = self.from_name.as_deref().map(strip_prefix).unwrap_or_default();
        Origin::new(self.from, name, self.relayed_from_instance_key)
    }
}
