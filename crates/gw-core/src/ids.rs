//! Strongly typed identifier wrappers.
//!
//! Entities are created dynamically over the HTTP surface, so identifiers are
//! UUIDs rather than dense indexes.  Each wrapper is a distinct type so a
//! `MemoryId` can never be passed where an `AgentId` is expected.
//!
//! `Ord` on the inner `Uuid` compares the canonical byte sequence, which for
//! hyphenated rendering coincides with lexicographic string order — retrieval
//! tie-breaking relies on this.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Generate a typed ID wrapper around a `Uuid`.
macro_rules! entity_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh random (v4) identifier.
            #[inline]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Plain hyphenated form: IDs appear in URLs and log fields.
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map($name)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

entity_id! {
    /// Identifier of a world.
    pub struct WorldId;
}

entity_id! {
    /// Identifier of an agent.  An agent belongs to exactly one world for
    /// its lifetime.
    pub struct AgentId;
}

entity_id! {
    /// Identifier of a memory in an agent's memory stream.
    pub struct MemoryId;
}

entity_id! {
    /// Identifier of a world event.
    pub struct EventId;
}

entity_id! {
    /// Identifier of an immutable world snapshot.
    pub struct SnapshotId;
}
