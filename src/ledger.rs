use std::fmt::{Display, Formatter};

/// Identity of one watch connection: the target it was opened for plus the
/// generation minted for it. Two connections to the same target never share
/// an identity.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ConnectionIdentity {
    target: String,
    generation: u64,
}

impl ConnectionIdentity {
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Display for ConnectionIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.target, self.generation)
    }
}

/// Tracks which connection identity is current and whether it has opened.
///
/// Only the current identity may touch shared state, and only once open.
/// Anything tagged with an older identity is fenced off.
#[derive(Debug, Default)]
pub struct IdentityLedger {
    next_generation: u64,
    current: Option<ConnectionIdentity>,
    opened: bool,
}

impl IdentityLedger {
    pub fn mint(&mut self, target: &str) -> ConnectionIdentity {
        self.next_generation = self.next_generation.wrapping_add(1);
        let identity = ConnectionIdentity {
            target: target.to_string(),
            generation: self.next_generation,
        };
        self.current = Some(identity.clone());
        self.opened = false;
        identity
    }

    pub fn current(&self) -> Option<&ConnectionIdentity> {
        self.current.as_ref()
    }

    pub fn is_current(&self, identity: &ConnectionIdentity) -> bool {
        self.current.as_ref() == Some(identity)
    }

    pub fn live(&self) -> Option<&ConnectionIdentity> {
        self.current.as_ref().filter(|_| self.opened)
    }

    pub fn is_live(&self, identity: &ConnectionIdentity) -> bool {
        self.live() == Some(identity)
    }

    pub fn mark_open(&mut self, identity: &ConnectionIdentity) -> bool {
        if !self.is_current(identity) {
            return false;
        }
        self.opened = true;
        true
    }

    pub fn mark_not_open(&mut self, identity: &ConnectionIdentity) -> bool {
        if !self.is_current(identity) {
            return false;
        }
        self.opened = false;
        true
    }

    pub fn retire(&mut self) -> Option<ConnectionIdentity> {
        self.opened = false;
        self.current.take()
    }
}
