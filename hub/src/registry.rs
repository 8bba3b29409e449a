//! Live protocol channels grouped by `(role, instance slot)`.
//!
//! A bucket exists only while it holds at least one channel that completed
//! its handshake. Channels keep their registration order within a bucket.

use std::collections::HashMap;

use switchboard_transport::{ChannelId, ChannelSink};
use switchboard_types::{InstanceKey, InstanceSlot, NAME_WILDCARD, Role, strip_prefix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BucketKey {
    pub role: Role,
    pub slot: InstanceSlot,
}

impl BucketKey {
    pub fn new(role: Role, slot: InstanceSlot) -> Self {
        Self { role, slot }
    }
}

#[derive(Debug)]
pub(crate) struct Registration {
    pub sink: ChannelSink,
}

impl Registration {
    pub fn id(&self) -> ChannelId {
        self.sink.id()
    }

    /// Prefixed name, as the channel was opened.
    pub fn name(&self) -> &str {
        self.sink.name()
    }
}

/// A registration as reported by [`crate::HubHandle::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub role: Role,
    /// Unprefixed channel name.
    pub name: String,
    pub instance: Option<InstanceKey>,
    pub channel: ChannelId,
}

/// Outcome of matching `toNames` against one bucket.
#[derive(Debug, Default)]
pub(crate) struct Resolution<'a> {
    /// Matching channels, each at most once, in registration order.
    pub targets: Vec<&'a ChannelSink>,
    /// Requested names that matched nothing.
    pub unmatched: Vec<&'a str>,
    pub bucket_found: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    buckets: HashMap<BucketKey, Vec<Registration>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: BucketKey, sink: ChannelSink) {
        self.buckets
            .entry(key)
            .or_default()
            .push(Registration { sink });
    }

    pub fn find(&self, id: ChannelId) -> Option<(BucketKey, &Registration)> {
        self.buckets.iter().find_map(|(key, regs)| {
            regs.iter()
                .find(|reg| reg.id() == id)
                .map(|reg| (*key, reg))
        })
    }

    #[cfg(test)]
    pub fn contains(&self, id: ChannelId) -> bool {
        self.find(id).is_some()
    }

    pub fn resolve<'a>(&'a self, key: BucketKey, to_names: &'a [String]) -> Resolution<'a> {
        let Some(regs) = self.buckets.get(&key) else {
            return Resolution {
                unmatched: to_names.iter().map(String::as_str).collect(),
                ..Resolution::default()
            };
        };

        let mut unmatched = Vec::new();
        for wanted in to_names {
            let hit = wanted == NAME_WILDCARD || regs.iter().any(|reg| reg.name() == wanted);
            if !hit {
                unmatched.push(wanted.as_str());
            }
        }

        let wildcard = to_names.iter().any(|n| n == NAME_WILDCARD);
        let targets = regs
            .iter()
            .filter(|reg| wildcard || to_names.iter().any(|n| n == reg.name()))
            .map(|reg| &reg.sink)
            .collect();

        Resolution {
            targets,
            unmatched,
            bucket_found: true,
        }
    }

    /// Remove a channel; empty buckets are deleted.
    pub fn remove(&mut self, id: ChannelId) -> Option<(BucketKey, Registration)> {
        let key = self.find(id).map(|(key, _)| key)?;
        let regs = self.buckets.get_mut(&key)?;
        let index = regs.iter().position(|reg| reg.id() == id)?;
        let removed = regs.remove(index);
        if regs.is_empty() {
            self.buckets.remove(&key);
        }
        Some((key, removed))
    }

    #[cfg(test)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn snapshot(&self) -> Vec<RegistrationInfo> {
        let mut out: Vec<RegistrationInfo> = self
            .buckets
            .iter()
            .flat_map(|(key, regs)| {
                regs.iter().map(|reg| RegistrationInfo {
                    role: key.role,
                    name: strip_prefix(reg.name()).to_string(),
                    instance: key.slot.instance(),
                    channel: reg.id(),
                })
            })
            .collect();
        out.sort_by_key(|info| info.channel);
        out
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Registration> + '_ {
        self.buckets.drain().flat_map(|(_, regs)| regs)
    }
}
