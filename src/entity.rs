//! Typed representations of the Discord entities the managers edit.
//!
//! These mirror the Discord API docs so manager code never touches
//! `serde_json::Value` for inbound data. Only the fields the managers read
//! (names, positions, permission sets, parentage) are modelled; everything
//! else passes through the cache untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::id::{ChannelMarker, GenericMarker, GuildMarker, Id, RoleMarker, UserMarker, WebhookMarker};
use crate::permissions::Permissions;

// ---------------------------------------------------------------------------
// Guild
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Guild {
    pub id: Id<GuildMarker>,
    pub name: String,
    pub icon: Option<String>,
    pub splash: Option<String>,
    pub owner_id: Id<UserMarker>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub members: Vec<Member>,
    pub afk_channel_id: Option<Id<ChannelMarker>>,
    #[serde(default = "default_afk_timeout")]
    pub afk_timeout: u32,
    pub system_channel_id: Option<Id<ChannelMarker>>,
    #[serde(default)]
    pub verification_level: VerificationLevel,
    #[serde(default)]
    pub default_message_notifications: NotificationLevel,
    #[serde(default)]
    pub explicit_content_filter: ExplicitContentLevel,
}

fn default_afk_timeout() -> u32 {
    300
}

impl Guild {
    /// Look up a role by ID.
    pub fn role(&self, id: Id<RoleMarker>) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Look up a channel by ID.
    pub fn channel(&self, id: Id<ChannelMarker>) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Look up a member by user ID.
    pub fn member(&self, id: Id<UserMarker>) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == id)
    }

    /// The `@everyone` role, which shares the guild's ID.
    pub fn everyone_role(&self) -> Option<&Role> {
        self.role(Id::new(self.id.get()))
    }

    /// Effective guild-level permissions for a member.
    ///
    /// The owner and administrators implicitly hold every permission.
    pub fn member_permissions(&self, member: &Member) -> Permissions {
        if member.user_id == self.owner_id {
            return Permissions::all();
        }
        let mut perms = self
            .everyone_role()
            .map(|r| r.permissions)
            .unwrap_or_else(Permissions::empty);
        for role_id in &member.roles {
            if let Some(role) = self.role(*role_id) {
                perms |= role.permissions;
            }
        }
        if perms.contains(Permissions::ADMINISTRATOR) {
            Permissions::all()
        } else {
            perms
        }
    }

    /// Effective permissions for a member in a specific channel, after
    /// applying the channel's permission overwrites.
    ///
    /// Overwrites apply in the usual order: `@everyone` first, then role
    /// overwrites, then the member-specific overwrite. Administrators and the
    /// owner bypass overwrites entirely.
    pub fn channel_permissions(&self, member: &Member, channel: &Channel) -> Permissions {
        let base = self.member_permissions(member);
        if base.contains(Permissions::ADMINISTRATOR) {
            return Permissions::all();
        }

        let mut perms = base;
        let everyone_id: Id<GenericMarker> = Id::new(self.id.get());

        if let Some(ow) = channel.overwrite(everyone_id) {
            perms &= !ow.deny;
            perms |= ow.allow;
        }

        let mut role_allow = Permissions::empty();
        let mut role_deny = Permissions::empty();
        for role_id in &member.roles {
            if let Some(ow) = channel.overwrite(role_id.cast()) {
                role_allow |= ow.allow;
                role_deny |= ow.deny;
            }
        }
        perms &= !role_deny;
        perms |= role_allow;

        if let Some(ow) = channel.overwrite(member.user_id.cast()) {
            perms &= !ow.deny;
            perms |= ow.allow;
        }

        perms
    }

    /// The position of a member's highest role, or -1 if the member has no
    /// roles beyond `@everyone`. The owner ranks above every role.
    pub fn member_rank(&self, member: &Member) -> i64 {
        if member.user_id == self.owner_id {
            return i64::MAX;
        }
        member
            .roles
            .iter()
            .filter_map(|id| self.role(*id))
            .map(|r| i64::from(r.position))
            .max()
            .unwrap_or(-1)
    }

    /// Whether `actor` ranks strictly above `target` in the role hierarchy.
    pub fn can_interact_with_member(&self, actor: &Member, target: &Member) -> bool {
        if target.user_id == self.owner_id {
            return false;
        }
        self.member_rank(actor) > self.member_rank(target)
    }

    /// Whether `actor` ranks strictly above `role`.
    pub fn can_interact_with_role(&self, actor: &Member, role: &Role) -> bool {
        self.member_rank(actor) > i64::from(role.position)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Role {
    pub id: Id<RoleMarker>,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Member {
    pub user_id: Id<UserMarker>,
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Id<RoleMarker>>,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum ChannelType {
    GuildText = 0,
    GuildVoice = 2,
    GuildCategory = 4,
    GuildAnnouncement = 5,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Channel {
    pub id: Id<ChannelMarker>,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    pub guild_id: Id<GuildMarker>,
    pub name: String,
    pub topic: Option<String>,
    #[serde(default)]
    pub position: i32,
    pub parent_id: Option<Id<ChannelMarker>>,
    #[serde(default)]
    pub nsfw: bool,
    pub bitrate: Option<u32>,
    pub user_limit: Option<u16>,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

impl Channel {
    /// Look up the permission overwrite targeting `id`.
    pub fn overwrite(&self, id: Id<GenericMarker>) -> Option<&PermissionOverwrite> {
        self.permission_overwrites.iter().find(|o| o.id == id)
    }

    /// Whether this channel carries voice-only settings (bitrate, user limit).
    pub fn is_voice(&self) -> bool {
        self.kind == ChannelType::GuildVoice
    }
}

// ---------------------------------------------------------------------------
// Permission overwrites
// ---------------------------------------------------------------------------

/// Whether an overwrite targets a role or a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum OverwriteType {
    Role = 0,
    Member = 1,
}

/// A channel permission overwrite: `{id, type, allow, deny}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PermissionOverwrite {
    pub id: Id<GenericMarker>,
    #[serde(rename = "type")]
    pub kind: OverwriteType,
    #[serde(default)]
    pub allow: Permissions,
    #[serde(default)]
    pub deny: Permissions,
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Webhook {
    pub id: Id<WebhookMarker>,
    pub guild_id: Id<GuildMarker>,
    pub channel_id: Id<ChannelMarker>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Current user (account)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CurrentUser {
    pub id: Id<UserMarker>,
    pub username: String,
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

// ---------------------------------------------------------------------------
// Enum-valued guild settings
// ---------------------------------------------------------------------------
// Each carries an `Unknown` sentinel for forward compatibility with values
// newer than this crate. The sentinel deserializes fine but is rejected when
// staged as an edit.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize_repr, Serialize_repr)]
#[repr(i8)]
pub enum VerificationLevel {
    #[default]
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    VeryHigh = 4,
    #[serde(other)]
    Unknown = -1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize_repr, Serialize_repr)]
#[repr(i8)]
pub enum NotificationLevel {
    #[default]
    AllMessages = 0,
    MentionsOnly = 1,
    #[serde(other)]
    Unknown = -1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize_repr, Serialize_repr)]
#[repr(i8)]
pub enum ExplicitContentLevel {
    #[default]
    Off = 0,
    NoRole = 1,
    All = 2,
    #[serde(other)]
    Unknown = -1,
}

// ---------------------------------------------------------------------------
// Entity resolution
// ---------------------------------------------------------------------------

/// Read access to the live entity cache.
///
/// Managers hold IDs plus a resolver rather than direct references, because a
/// gateway-driven cache may replace the live entity between manager
/// construction and dispatch. Every lookup returns the *current* version.
pub trait EntityResolver {
    fn guild(&self, id: Id<GuildMarker>) -> Option<Guild>;
    fn channel(&self, id: Id<ChannelMarker>) -> Option<Channel>;
    fn webhook(&self, id: Id<WebhookMarker>) -> Option<Webhook>;
    fn current_user(&self) -> Option<CurrentUser>;
}

/// A plain in-memory cache.
///
/// The crate's own tests use this; a real client would back the trait with
/// its gateway-fed store.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    guilds: HashMap<Id<GuildMarker>, Guild>,
    channels: HashMap<Id<ChannelMarker>, Channel>,
    webhooks: HashMap<Id<WebhookMarker>, Webhook>,
    current_user: Option<CurrentUser>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_guild(&mut self, guild: Guild) {
        self.guilds.insert(guild.id, guild);
    }

    pub fn put_channel(&mut self, channel: Channel) {
        self.channels.insert(channel.id, channel);
    }

    pub fn put_webhook(&mut self, webhook: Webhook) {
        self.webhooks.insert(webhook.id, webhook);
    }

    pub fn put_current_user(&mut self, user: CurrentUser) {
        self.current_user = Some(user);
    }

    pub fn guild_mut(&mut self, id: Id<GuildMarker>) -> Option<&mut Guild> {
        self.guilds.get_mut(&id)
    }
}

impl EntityResolver for InMemoryCache {
    fn guild(&self, id: Id<GuildMarker>) -> Option<Guild> {
        self.guilds.get(&id).cloned()
    }

    fn channel(&self, id: Id<ChannelMarker>) -> Option<Channel> {
        self.channels.get(&id).cloned()
    }

    fn webhook(&self, id: Id<WebhookMarker>) -> Option<Webhook> {
        self.webhooks.get(&id).cloned()
    }

    fn current_user(&self) -> Option<CurrentUser> {
        self.current_user.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: u64, position: i32, permissions: Permissions) -> Role {
        Role {
            id: Id::new(id),
            name: format!("role-{id}"),
            color: 0,
            hoist: false,
            position,
            permissions,
            managed: false,
            mentionable: false,
        }
    }

    fn member(user: u64, roles: &[u64]) -> Member {
        Member {
            user_id: Id::new(user),
            nick: None,
            roles: roles.iter().copied().map(Id::new).collect(),
            deaf: false,
            mute: false,
        }
    }

    fn guild() -> Guild {
        Guild {
            id: Id::new(100),
            name: "testguild".into(),
            icon: None,
            splash: None,
            owner_id: Id::new(1),
            roles: vec![
                role(100, 0, Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES),
                role(200, 5, Permissions::KICK_MEMBERS),
                role(300, 10, Permissions::ADMINISTRATOR),
            ],
            channels: Vec::new(),
            members: vec![member(1, &[]), member(2, &[200]), member(3, &[300])],
            afk_channel_id: None,
            afk_timeout: 300,
            system_channel_id: None,
            verification_level: VerificationLevel::None,
            default_message_notifications: NotificationLevel::AllMessages,
            explicit_content_filter: ExplicitContentLevel::Off,
        }
    }

    #[test]
    fn owner_has_all_permissions() {
        let g = guild();
        let owner = g.member(Id::new(1)).unwrap();
        assert_eq!(g.member_permissions(owner), Permissions::all());
    }

    #[test]
    fn permissions_accumulate_from_roles() {
        let g = guild();
        let m = g.member(Id::new(2)).unwrap();
        let perms = g.member_permissions(m);
        assert!(perms.contains(Permissions::KICK_MEMBERS));
        assert!(perms.contains(Permissions::VIEW_CHANNEL));
        assert!(!perms.contains(Permissions::BAN_MEMBERS));
    }

    #[test]
    fn administrator_implies_everything() {
        let g = guild();
        let m = g.member(Id::new(3)).unwrap();
        assert_eq!(g.member_permissions(m), Permissions::all());
    }

    #[test]
    fn owner_outranks_everyone() {
        let g = guild();
        let owner = g.member(Id::new(1)).unwrap();
        let admin = g.member(Id::new(3)).unwrap();
        assert!(g.can_interact_with_member(owner, admin));
        assert!(!g.can_interact_with_member(admin, owner));
    }

    #[test]
    fn hierarchy_is_strict() {
        let g = guild();
        let a = g.member(Id::new(2)).unwrap();
        let b = g.member(Id::new(2)).unwrap();
        // Equal rank: neither side may act on the other.
        assert!(!g.can_interact_with_member(a, b));
    }

    #[test]
    fn channel_overwrites_deny_then_allow() {
        let mut g = guild();
        let channel = Channel {
            id: Id::new(555),
            kind: ChannelType::GuildText,
            guild_id: g.id,
            name: "general".into(),
            topic: None,
            position: 0,
            parent_id: None,
            nsfw: false,
            bitrate: None,
            user_limit: None,
            permission_overwrites: vec![
                // @everyone overwrite: deny sending.
                PermissionOverwrite {
                    id: Id::new(100),
                    kind: OverwriteType::Role,
                    allow: Permissions::empty(),
                    deny: Permissions::SEND_MESSAGES,
                },
                // Member-specific overwrite: allow it back.
                PermissionOverwrite {
                    id: Id::new(2),
                    kind: OverwriteType::Member,
                    allow: Permissions::SEND_MESSAGES,
                    deny: Permissions::empty(),
                },
            ],
        };
        g.channels.push(channel);
        let m = g.member(Id::new(2)).unwrap().clone();
        let c = g.channel(Id::new(555)).unwrap();
        let perms = g.channel_permissions(&m, c);
        assert!(perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn unknown_enum_values_hit_sentinel() {
        let level: VerificationLevel = serde_json::from_str("99").unwrap();
        assert_eq!(level, VerificationLevel::Unknown);
    }
}
