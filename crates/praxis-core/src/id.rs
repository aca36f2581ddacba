use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 128-bit unique identifier. An id of zero is invalid and acts as the
/// "null" handle everywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueId(Uuid);

impl UniqueId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn valid(&self) -> bool {
        !self.0.is_nil()
    }

    /// Short tag used in log output.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named reference to a BDI entity (agent, goal, service, tactic).
/// Handles compare and hash by id only; the name is carried for humans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handle {
    pub name: String,
    pub id: UniqueId,
}

impl Handle {
    pub fn new(name: impl Into<String>, id: UniqueId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    pub fn random(name: impl Into<String>) -> Self {
        Self::new(name, UniqueId::random())
    }

    /// The null handle: carries a name for diagnostics but resolves to
    /// nothing.
    pub fn invalid(name: impl Into<String>) -> Self {
        Self::new(name, UniqueId::nil())
    }

    pub fn valid(&self) -> bool {
        self.id.valid()
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handle {}

impl std::hash::Hash for Handle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_id_is_invalid() {
        assert!(!UniqueId::nil().valid());
        assert!(UniqueId::random().valid());
    }

    #[test]
    fn handles_compare_by_id_only() {
        let id = UniqueId::random();
        let a = Handle::new("alpha", id);
        let b = Handle::new("beta", id);
        assert_eq!(a, b);

        let c = Handle::random("alpha");
        assert_ne!(a, c);
    }

    #[test]
    fn invalid_handle() {
        let h = Handle::invalid("ghost");
        assert!(!h.valid());
        assert_eq!(h.name, "ghost");
    }
}
