//! Guild permission bits.
//!
//! The REST API transmits permission sets as stringified 64-bit integers, so
//! the serde impls here go through the string form rather than a plain number.

use std::fmt;

use bitflags::bitflags;
use serde::de::{Deserializer, Error as DeError, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

bitflags! {
    /// A set of guild permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Permissions: u64 {
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS = 1 << 1;
        const BAN_MEMBERS = 1 << 2;
        const ADMINISTRATOR = 1 << 3;
        const MANAGE_CHANNEL = 1 << 4;
        const MANAGE_SERVER = 1 << 5;
        const ADD_REACTIONS = 1 << 6;
        const VIEW_AUDIT_LOG = 1 << 7;
        const VIEW_CHANNEL = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        const MANAGE_MESSAGES = 1 << 13;
        const EMBED_LINKS = 1 << 14;
        const ATTACH_FILES = 1 << 15;
        const READ_MESSAGE_HISTORY = 1 << 16;
        const MENTION_EVERYONE = 1 << 17;
        const CONNECT = 1 << 20;
        const SPEAK = 1 << 21;
        const MUTE_MEMBERS = 1 << 22;
        const DEAFEN_MEMBERS = 1 << 23;
        const MOVE_MEMBERS = 1 << 24;
        const MANAGE_NICKNAMES = 1 << 27;
        const MANAGE_ROLES = 1 << 28;
        const MANAGE_WEBHOOKS = 1 << 29;
    }
}

impl Permissions {
    /// The first permission bit in `required` that is missing from `self`,
    /// or `None` if every required bit is held.
    ///
    /// Iteration order is ascending bit position, which gives a stable
    /// "first missing permission" for error reporting.
    pub fn first_missing(self, required: Permissions) -> Option<Permissions> {
        let missing = required & !self;
        missing.iter().next()
    }

    /// A short human name for a single-bit permission set, used in errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::CREATE_INSTANT_INVITE => "CREATE_INSTANT_INVITE",
            Self::KICK_MEMBERS => "KICK_MEMBERS",
            Self::BAN_MEMBERS => "BAN_MEMBERS",
            Self::ADMINISTRATOR => "ADMINISTRATOR",
            Self::MANAGE_CHANNEL => "MANAGE_CHANNEL",
            Self::MANAGE_SERVER => "MANAGE_SERVER",
            Self::ADD_REACTIONS => "ADD_REACTIONS",
            Self::VIEW_AUDIT_LOG => "VIEW_AUDIT_LOG",
            Self::VIEW_CHANNEL => "VIEW_CHANNEL",
            Self::SEND_MESSAGES => "SEND_MESSAGES",
            Self::MANAGE_MESSAGES => "MANAGE_MESSAGES",
            Self::EMBED_LINKS => "EMBED_LINKS",
            Self::ATTACH_FILES => "ATTACH_FILES",
            Self::READ_MESSAGE_HISTORY => "READ_MESSAGE_HISTORY",
            Self::MENTION_EVERYONE => "MENTION_EVERYONE",
            Self::CONNECT => "CONNECT",
            Self::SPEAK => "SPEAK",
            Self::MUTE_MEMBERS => "MUTE_MEMBERS",
            Self::DEAFEN_MEMBERS => "DEAFEN_MEMBERS",
            Self::MOVE_MEMBERS => "MOVE_MEMBERS",
            Self::MANAGE_NICKNAMES => "MANAGE_NICKNAMES",
            Self::MANAGE_ROLES => "MANAGE_ROLES",
            Self::MANAGE_WEBHOOKS => "MANAGE_WEBHOOKS",
            _ => "PERMISSIONS",
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Serde: stringified u64 on the wire
// ---------------------------------------------------------------------------

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.bits())
    }
}

struct PermissionsVisitor;

impl<'de> Visitor<'de> for PermissionsVisitor {
    type Value = Permissions;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a permission bit set as a string or integer")
    }

    fn visit_u64<E: DeError>(self, v: u64) -> Result<Self::Value, E> {
        // Unknown bits from newer API versions are dropped, not rejected.
        Ok(Permissions::from_bits_truncate(v))
    }

    fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<u64>()
            .map(Permissions::from_bits_truncate)
            .map_err(|_| E::custom(format!("invalid permission bits: {v:?}")))
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PermissionsVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
