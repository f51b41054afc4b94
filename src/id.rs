//! Type-safe snowflake IDs.
//!
//! Discord transmits IDs as decimal strings in JSON but they are 64-bit
//! snowflakes. `Id<M>` keeps the integer representation internally and uses a
//! zero-sized marker type so that, for example, a role ID can never be passed
//! where a channel ID is expected.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::de::{Deserializer, Error as DeError, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Marker for guild IDs.
#[derive(Debug)]
#[non_exhaustive]
pub struct GuildMarker;

/// Marker for channel IDs.
#[derive(Debug)]
#[non_exhaustive]
pub struct ChannelMarker;

/// Marker for role IDs.
#[derive(Debug)]
#[non_exhaustive]
pub struct RoleMarker;

/// Marker for user IDs.
#[derive(Debug)]
#[non_exhaustive]
pub struct UserMarker;

/// Marker for webhook IDs.
#[derive(Debug)]
#[non_exhaustive]
pub struct WebhookMarker;

/// Marker for IDs whose resource type is only known at runtime (e.g. the
/// member-or-role target of a permission overwrite).
#[derive(Debug)]
#[non_exhaustive]
pub struct GenericMarker;

// ---------------------------------------------------------------------------
// Id
// ---------------------------------------------------------------------------

/// A Discord snowflake with a compile-time resource marker.
pub struct Id<M> {
    value: u64,
    phantom: PhantomData<fn(M) -> M>,
}

impl<M> Id<M> {
    /// Create an ID from its raw snowflake value.
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            phantom: PhantomData,
        }
    }

    /// The raw snowflake value.
    pub const fn get(self) -> u64 {
        self.value
    }

    /// Re-tag the ID with a different marker.
    ///
    /// Used when a context-specific ID (say, an overwrite target) needs to be
    /// compared against a concretely-typed one.
    pub const fn cast<N>(self) -> Id<N> {
        Id::new(self.value)
    }

    /// Unix-millisecond creation timestamp embedded in the snowflake.
    pub const fn timestamp_ms(self) -> u64 {
        (self.value >> 22) + 1_420_070_400_000
    }
}

impl<M> Clone for Id<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Id<M> {}

impl<M> PartialEq for Id<M> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<M> Eq for Id<M> {}

impl<M> Hash for Id<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<M> PartialOrd for Id<M> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Id<M> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<M> fmt::Debug for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<M> fmt::Display for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

// ---------------------------------------------------------------------------
// Serde: snowflakes are strings on the wire
// ---------------------------------------------------------------------------

impl<M> Serialize for Id<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.value)
    }
}

struct IdVisitor<M>(PhantomData<fn(M) -> M>);

impl<'de, M> Visitor<'de> for IdVisitor<M> {
    type Value = Id<M>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a snowflake as a string or integer")
    }

    fn visit_u64<E: DeError>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Id::new(v))
    }

    fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<u64>()
            .map(Id::new)
            .map_err(|_| E::custom(format!("invalid snowflake: {v:?}")))
    }
}

impl<'de, M> Deserialize<'de> for Id<M> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor(PhantomData))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
