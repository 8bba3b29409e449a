//! Target addresses of the form `role:name[,name2...][:instanceKey]`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::name::{NAME_WILDCARD, prefix_target};
use crate::{InstanceKey, Role};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("missing target address")]
    Empty,
    #[error("missing role in target address '{address}'")]
    MissingRole { address: String },
    #[error("unknown role '{token}' in target address (supported: background, popup, devtool, content_script)")]
    UnknownRole { token: String },
    #[error("missing connection name in target address '{address}'")]
    MissingName { address: String },
    #[error("empty connection name in target address '{address}'")]
    EmptyName { address: String },
    #[error("invalid target address '{address}': expected role:name[,name][:instanceKey]")]
    Malformed { address: String },
    #[error("instance key '{value}' must be a valid integer")]
    InvalidInstanceKey { value: String },
    #[error("messages from background to {role} must carry an instance key")]
    MissingInstanceKey { role: Role },
}

/// A parsed message destination.
///
/// Names are kept unprefixed; the wildcard `*` may appear among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    role: Role,
    names: Vec<String>,
    instance: Option<InstanceKey>,
}

impl Address {
    pub fn new<I, S>(role: Role, names: I, instance: Option<InstanceKey>) -> Result<Self, AddressError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let rendered = || render(role, &names, instance);
        if names.is_empty() {
            return Err(AddressError::MissingName { address: rendered() });
        }
        if names.iter().any(String::is_empty) {
            return Err(AddressError::EmptyName { address: rendered() });
        }
        if names.iter().any(|n| n.contains([':', ','])) {
            return Err(AddressError::Malformed { address: rendered() });
        }
        Ok(Self {
            role,
            names,
            instance,
        })
    }

    /// Parse `role:name[,name2...][:instanceKey]`.
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        if address.trim().is_empty() {
            return Err(AddressError::Empty);
        }

        let segments: Vec<&str> = address.split(':').collect();
        if segments.len() > 3 {
            return Err(AddressError::Malformed {
                address: address.to_string(),
            });
        }

        let role_token = segments[0];
        if role_token.is_empty() {
            return Err(AddressError::MissingRole {
                address: address.to_string(),
            });
        }
        let role = Role::parse(role_token).ok_or_else(|| AddressError::UnknownRole {
            token: role_token.to_string(),
        })?;

        let names = match segments.get(1) {
            Some(names) if !names.is_empty() => names.split(',').collect::<Vec<_>>(),
            _ => {
                return Err(AddressError::MissingName {
                    address: address.to_string(),
                });
            }
        };
        if names.iter().any(|n| n.is_empty()) {
            return Err(AddressError::EmptyName {
                address: address.to_string(),
            });
        }

        let instance = match segments.get(2) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<i64>()
                    .map(InstanceKey::new)
                    .map_err(|_| AddressError::InvalidInstanceKey {
                        value: (*raw).to_string(),
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            role,
            names: names.into_iter().map(String::from).collect(),
            instance,
        })
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Unprefixed target names, possibly including the wildcard.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn instance(&self) -> Option<InstanceKey> {
        self.instance
    }

    #[must_use]
    pub fn with_instance(mut self, instance: InstanceKey) -> Self {
        self.instance = Some(instance);
        self
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.names.iter().any(|n| n == NAME_WILDCARD)
    }

    /// Target names as they travel on the wire.
    #[must_use]
    pub fn prefixed_names(&self) -> Vec<String> {
        self.names.iter().map(|n| prefix_target(n)).collect()
    }
}

fn render(role: Role, names: &[String], instance: Option<InstanceKey>) -> String {
    let mut out = format!("{role}:{}", names.join(","));
    if let Some(instance) = instance {
        out.push(':');
        out.push_str(&instance.to_string());
    }
    out
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.role, &self.names, self.instance))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
