//! Discovery of the running context's role and instance key.

use std::future::Future;
use std::pin::Pin;

use switchboard_types::{InstanceKey, Role};

pub type ProbeFut<'a> = Pin<Box<dyn Future<Output = Option<InstanceKey>> + Send + 'a>>;

/// Tells an endpoint where it is running.
///
/// `instance_key` is consulted by roles that declare their instance: once
/// before the first handshake and again before every send, since the
/// instance a popup targets can change while it is open. It may resolve
/// asynchronously and may yield `None` when the host cannot tell.
pub trait ContextProbe: Send + Sync + 'static {
    fn role(&self) -> Role;

    fn instance_key(&self) -> ProbeFut<'_>;
}

/// A probe with fixed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProbe {
    role: Role,
    instance: Option<InstanceKey>,
}

impl StaticProbe {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            instance: None,
        }
    }

    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<InstanceKey>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

impl ContextProbe for StaticProbe {
    fn role(&self) -> Role {
        self.role
    }

    fn instance_key(&self) -> ProbeFut<'_> {
        let instance = self.instance;
        Box::pin(async move { instance })
    }
}
