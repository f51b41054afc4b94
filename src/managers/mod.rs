//! Per-entity managers.
//!
//! A manager is a builder accumulating sparse edits for one remote entity.
//! Setters validate eagerly and stage into a [`PendingChangeBuffer`]; calling
//! [`Updatable::update`] runs the authorization pre-flight and dispatches the
//! minimal diff (or skips the round-trip entirely if nothing is dirty).
//!
//! Managers hold IDs plus an [`EntityResolver`], never direct entity
//! references — the live entity is re-fetched at dispatch time, so edits
//! always diff against the current cache state.
//!
//! [`PendingChangeBuffer`]: crate::buffer::PendingChangeBuffer
//! [`EntityResolver`]: crate::entity::EntityResolver

mod account;
mod channel;
mod guild;
mod member;
mod perm_override;
mod role;
mod webhook;

pub use account::AccountManager;
pub use channel::ChannelManager;
pub use guild::GuildManager;
pub use member::MemberManager;
pub use perm_override::PermOverrideManager;
pub use role::RoleManager;
pub use webhook::WebhookManager;

use crate::error::UpdateError;
use crate::executor::Outcome;
use crate::transport::Transport;

/// The dispatch surface shared by every manager.
pub trait Updatable {
    /// Authorize, serialize, and dispatch the pending batch, blocking until
    /// the transport answers (or the deadline elapses).
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError>;

    /// Callback-style dispatch: success and failure are delivered through
    /// the same completion channel the transport errors use.
    fn queue<S, F>(&mut self, transport: &dyn Transport, on_success: S, on_failure: F)
    where
        S: FnOnce(Outcome),
        F: FnOnce(UpdateError),
        Self: Sized,
    {
        match self.update(transport) {
            Ok(outcome) => on_success(outcome),
            Err(err) => on_failure(err),
        }
    }
}

/// Resolve the guild and the acting member (the current user's membership).
///
/// Called at dispatch time so the authorization snapshot reflects the cache
/// as it is *now*, not as it was when the manager was created.
pub(crate) fn resolve_actor(
    resolver: &dyn crate::entity::EntityResolver,
    guild_id: crate::id::Id<crate::id::GuildMarker>,
) -> Result<(crate::entity::Guild, crate::entity::Member), UpdateError> {
    let guild = resolver
        .guild(guild_id)
        .ok_or(UpdateError::MissingEntity("guild"))?;
    let user = resolver
        .current_user()
        .ok_or(UpdateError::MissingEntity("current user"))?;
    let actor = guild
        .member(user.id)
        .cloned()
        .ok_or(UpdateError::MissingEntity("current member"))?;
    Ok((guild, actor))
}

// ---------------------------------------------------------------------------
// Shared validation rules
// ---------------------------------------------------------------------------
// Field-descriptor tables take plain `fn` pointers, so the common bounds
// checks live here as free functions.

pub(crate) mod validate {
    use crate::buffer::StagedValue;

    fn text_len(v: &StagedValue, min: usize, max: usize) -> Result<(), String> {
        match v.as_text() {
            Some(s) if (min..=max).contains(&s.chars().count()) => Ok(()),
            Some(_) => Err(format!("must be {min}-{max} characters")),
            None => Err("expected text".into()),
        }
    }

    pub fn name(v: &StagedValue) -> Result<(), String> {
        text_len(v, 2, 100)
    }

    pub fn nick(v: &StagedValue) -> Result<(), String> {
        // `None` removes the nickname.
        match v {
            StagedValue::MaybeText(None) => Ok(()),
            _ => text_len(v, 1, 32),
        }
    }

    pub fn username(v: &StagedValue) -> Result<(), String> {
        text_len(v, 2, 32)
    }

    pub fn topic(v: &StagedValue) -> Result<(), String> {
        match v {
            StagedValue::MaybeText(None) => Ok(()),
            _ => text_len(v, 0, 1024),
        }
    }

    pub fn color(v: &StagedValue) -> Result<(), String> {
        match v {
            StagedValue::UInt(c) if *c <= 0xFF_FF_FF => Ok(()),
            StagedValue::UInt(_) => Err("must be a 24-bit RGB value".into()),
            _ => Err("expected an integer".into()),
        }
    }

    pub fn bitrate(v: &StagedValue) -> Result<(), String> {
        match v {
            StagedValue::UInt(b) if (8_000..=96_000).contains(b) => Ok(()),
            StagedValue::UInt(_) => Err("must be 8000-96000".into()),
            _ => Err("expected an integer".into()),
        }
    }

    pub fn user_limit(v: &StagedValue) -> Result<(), String> {
        match v {
            StagedValue::UInt(l) if *l <= 99 => Ok(()),
            StagedValue::UInt(_) => Err("must be 0-99 (0 = unlimited)".into()),
            _ => Err("expected an integer".into()),
        }
    }

    pub fn afk_timeout(v: &StagedValue) -> Result<(), String> {
        match v {
            StagedValue::UInt(t) if matches!(t, 60 | 300 | 900 | 1800 | 3600) => Ok(()),
            StagedValue::UInt(_) => Err("must be one of 60, 300, 900, 1800, 3600 seconds".into()),
            _ => Err("expected an integer".into()),
        }
    }

    /// Enum-valued settings stage their discriminant; the `Unknown` sentinel
    /// (negative) must never go out on the wire.
    pub fn known_level(v: &StagedValue) -> Result<(), String> {
        match v {
            StagedValue::Int(l) if *l >= 0 => Ok(()),
            StagedValue::Int(_) => Err("cannot stage the UNKNOWN sentinel".into()),
            _ => Err("expected an integer".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Test fixtures shared by the manager tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testkit {
    use std::cell::RefCell;
    use std::time::Duration;

    use crate::entity::{
        Channel, ChannelType, CurrentUser, ExplicitContentLevel, Guild, InMemoryCache, Member,
        NotificationLevel, Role, VerificationLevel, Webhook,
    };
    use crate::id::Id;
    use crate::permissions::Permissions;
    use crate::transport::{RawResponse, Route, Transport, TransportError};

    pub const GUILD: u64 = 100;
    pub const OWNER: u64 = 1;
    pub const STAFF: u64 = 2;
    pub const PEON: u64 = 3;
    pub const STAFF_ROLE: u64 = 500;
    pub const PEON_ROLE: u64 = 501;
    pub const TEXT_CHANNEL: u64 = 555;
    pub const VOICE_CHANNEL: u64 = 556;
    pub const CATEGORY: u64 = 557;
    pub const WEBHOOK: u64 = 700;

    /// Records every dispatch and answers 200 (or a network failure).
    pub struct RecordingTransport {
        pub calls: RefCell<Vec<(Route, serde_json::Value)>>,
        fail: bool,
    }

    impl RecordingTransport {
        pub fn ok() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: true,
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        pub fn last_payload(&self) -> serde_json::Value {
            self.calls
                .borrow()
                .last()
                .map(|(_, p)| p.clone())
                .unwrap_or(serde_json::Value::Null)
        }

        pub fn last_route(&self) -> Route {
            self.calls
                .borrow()
                .last()
                .map(|(r, _)| r.clone())
                .unwrap_or_else(Route::modify_current_user)
        }
    }

    impl Transport for RecordingTransport {
        fn dispatch(
            &self,
            route: &Route,
            payload: Option<&serde_json::Value>,
            _deadline: Option<Duration>,
        ) -> Result<RawResponse, TransportError> {
            self.calls.borrow_mut().push((
                route.clone(),
                payload.cloned().unwrap_or(serde_json::Value::Null),
            ));
            if self.fail {
                Err(TransportError::Network("connection reset".into()))
            } else {
                Ok(RawResponse {
                    status: 200,
                    body: b"{}".to_vec(),
                })
            }
        }
    }

    pub fn staff_permissions() -> Permissions {
        Permissions::VIEW_CHANNEL
            | Permissions::SEND_MESSAGES
            | Permissions::CONNECT
            | Permissions::SPEAK
            | Permissions::KICK_MEMBERS
            | Permissions::MANAGE_CHANNEL
            | Permissions::MANAGE_SERVER
            | Permissions::MANAGE_ROLES
            | Permissions::MANAGE_WEBHOOKS
            | Permissions::MANAGE_NICKNAMES
            | Permissions::MUTE_MEMBERS
            | Permissions::DEAFEN_MEMBERS
    }

    fn role(id: u64, name: &str, position: i32, permissions: Permissions) -> Role {
        Role {
            id: Id::new(id),
            name: name.into(),
            color: 0x33_66_99,
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

    pub fn guild() -> Guild {
        Guild {
            id: Id::new(GUILD),
            name: "fixture".into(),
            icon: None,
            splash: None,
            owner_id: Id::new(OWNER),
            roles: vec![
                role(GUILD, "@everyone", 0, Permissions::VIEW_CHANNEL),
                role(STAFF_ROLE, "staff", 5, staff_permissions()),
                role(PEON_ROLE, "peon", 1, Permissions::empty()),
            ],
            channels: vec![
                Channel {
                    id: Id::new(TEXT_CHANNEL),
                    kind: ChannelType::GuildText,
                    guild_id: Id::new(GUILD),
                    name: "general".into(),
                    topic: Some("chatter".into()),
                    position: 0,
                    parent_id: None,
                    nsfw: false,
                    bitrate: None,
                    user_limit: None,
                    permission_overwrites: Vec::new(),
                },
                Channel {
                    id: Id::new(VOICE_CHANNEL),
                    kind: ChannelType::GuildVoice,
                    guild_id: Id::new(GUILD),
                    name: "lounge".into(),
                    topic: None,
                    position: 1,
                    parent_id: None,
                    nsfw: false,
                    bitrate: Some(64_000),
                    user_limit: Some(0),
                    permission_overwrites: Vec::new(),
                },
                Channel {
                    id: Id::new(CATEGORY),
                    kind: ChannelType::GuildCategory,
                    guild_id: Id::new(GUILD),
                    name: "category".into(),
                    topic: None,
                    position: 2,
                    parent_id: None,
                    nsfw: false,
                    bitrate: None,
                    user_limit: None,
                    permission_overwrites: Vec::new(),
                },
            ],
            members: vec![
                member(OWNER, &[]),
                member(STAFF, &[STAFF_ROLE]),
                member(PEON, &[PEON_ROLE]),
            ],
            afk_channel_id: None,
            afk_timeout: 300,
            system_channel_id: None,
            verification_level: VerificationLevel::None,
            default_message_notifications: NotificationLevel::AllMessages,
            explicit_content_filter: ExplicitContentLevel::Off,
        }
    }

    /// A cache with the fixture guild, its channels, a webhook, and the staff
    /// member as the current user.
    pub fn cache() -> InMemoryCache {
        let mut cache = InMemoryCache::new();
        let g = guild();
        for channel in &g.channels {
            cache.put_channel(channel.clone());
        }
        cache.put_guild(g);
        cache.put_webhook(Webhook {
            id: Id::new(WEBHOOK),
            guild_id: Id::new(GUILD),
            channel_id: Id::new(TEXT_CHANNEL),
            name: Some("hook".into()),
            avatar: None,
        });
        cache.put_current_user(CurrentUser {
            id: Id::new(STAFF),
            username: "staffbot".into(),
            avatar: None,
            bot: true,
        });
        cache
    }
}
