//! Guild settings edits.
//!
//! Icon and splash are upload-only: the cache stores the server-computed
//! image hash, not the bytes, so a clean icon field cannot be read back.
//! Channel-valued settings (AFK channel, system channel) are validated
//! against the live guild in the setter, since the constraint depends on
//! which guild the channel belongs to.

use std::fmt;
use std::time::Duration;

use serde_json::json;

use crate::auth::{check_capability, AuthorizationSnapshot};
use crate::buffer::{PendingChangeBuffer, StagedIcon, StagedValue};
use crate::entity::{
    ChannelType, EntityResolver, ExplicitContentLevel, NotificationLevel, VerificationLevel,
};
use crate::error::UpdateError;
use crate::executor::{execute, ChangeSet, Outcome};
use crate::fields::{Encoding, FieldDescriptor, FieldKey, FieldMask};
use crate::id::{ChannelMarker, GuildMarker, Id};
use crate::permissions::Permissions;
use crate::transport::{Route, Transport};

use super::{validate, Updatable};

pub const NAME: FieldKey = FieldKey::new(0, "name");
pub const ICON: FieldKey = FieldKey::new(1, "icon");
pub const SPLASH: FieldKey = FieldKey::new(2, "splash");
pub const AFK_CHANNEL: FieldKey = FieldKey::new(3, "afk_channel");
pub const AFK_TIMEOUT: FieldKey = FieldKey::new(4, "afk_timeout");
pub const SYSTEM_CHANNEL: FieldKey = FieldKey::new(5, "system_channel");
pub const VERIFICATION_LEVEL: FieldKey = FieldKey::new(6, "verification_level");
pub const NOTIFICATION_LEVEL: FieldKey = FieldKey::new(7, "notification_level");
pub const EXPLICIT_CONTENT_LEVEL: FieldKey = FieldKey::new(8, "explicit_content_level");

const DESCRIPTORS: [FieldDescriptor; 9] = [
    FieldDescriptor {
        key: NAME,
        wire_name: "name",
        required: true,
        readback: true,
        validate: validate::name,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: ICON,
        wire_name: "icon",
        required: false,
        readback: false,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::IconData,
    },
    FieldDescriptor {
        key: SPLASH,
        wire_name: "splash",
        required: false,
        readback: false,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::IconData,
    },
    FieldDescriptor {
        key: AFK_CHANNEL,
        wire_name: "afk_channel_id",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::NullableText,
    },
    FieldDescriptor {
        key: AFK_TIMEOUT,
        wire_name: "afk_timeout",
        required: false,
        readback: true,
        validate: validate::afk_timeout,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: SYSTEM_CHANNEL,
        wire_name: "system_channel_id",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::NullableText,
    },
    FieldDescriptor {
        key: VERIFICATION_LEVEL,
        wire_name: "verification_level",
        required: false,
        readback: true,
        validate: validate::known_level,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: NOTIFICATION_LEVEL,
        wire_name: "default_message_notifications",
        required: false,
        readback: true,
        validate: validate::known_level,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: EXPLICIT_CONTENT_LEVEL,
        wire_name: "explicit_content_filter",
        required: false,
        readback: true,
        validate: validate::known_level,
        encoding: Encoding::Scalar,
    },
];

fn descriptor(key: FieldKey) -> &'static FieldDescriptor {
    &DESCRIPTORS[key.bit() as usize]
}

/// Batched edits for one guild's settings.
pub struct GuildManager<'a> {
    resolver: &'a dyn EntityResolver,
    guild_id: Id<GuildMarker>,
    buffer: PendingChangeBuffer,
    deadline: Option<Duration>,
}

impl<'a> GuildManager<'a> {
    pub fn new(resolver: &'a dyn EntityResolver, guild_id: Id<GuildMarker>) -> Self {
        Self {
            resolver,
            guild_id,
            buffer: PendingChangeBuffer::new(),
            deadline: None,
        }
    }

    pub fn name(&mut self, name: impl Into<String>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(NAME), StagedValue::Text(name.into()))?;
        Ok(self)
    }

    /// Upload a new icon, or `None` to remove the current one.
    pub fn icon(&mut self, icon: Option<StagedIcon>) -> Result<&mut Self, UpdateError> {
        self.buffer.stage(descriptor(ICON), StagedValue::Icon(icon))?;
        Ok(self)
    }

    pub fn splash(&mut self, splash: Option<StagedIcon>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(SPLASH), StagedValue::Icon(splash))?;
        Ok(self)
    }

    /// The staged icon upload.
    ///
    /// The cache only holds the server-computed hash of the live icon, so a
    /// clean icon field cannot be read back and this fails with
    /// [`UpdateError::UnsupportedOperation`].
    pub fn staged_icon(&self) -> Result<StagedValue, UpdateError> {
        // The fallback is unreachable for an upload-only field.
        self.buffer
            .read_back(descriptor(ICON), || StagedValue::Icon(None))
    }

    /// Set the AFK voice channel, or `None` to disable the AFK move.
    pub fn afk_channel(
        &mut self,
        channel: Option<Id<ChannelMarker>>,
    ) -> Result<&mut Self, UpdateError> {
        if let Some(id) = channel {
            self.require_channel(id, ChannelType::GuildVoice, "afk_channel")?;
        }
        self.buffer.stage(
            descriptor(AFK_CHANNEL),
            StagedValue::MaybeText(channel.map(|id| id.to_string())),
        )?;
        Ok(self)
    }

    /// Seconds of inactivity before the AFK move kicks in.
    pub fn afk_timeout(&mut self, seconds: u32) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(AFK_TIMEOUT), StagedValue::UInt(u64::from(seconds)))?;
        Ok(self)
    }

    /// Set the system-message text channel, or `None` to disable it.
    pub fn system_channel(
        &mut self,
        channel: Option<Id<ChannelMarker>>,
    ) -> Result<&mut Self, UpdateError> {
        if let Some(id) = channel {
            self.require_channel(id, ChannelType::GuildText, "system_channel")?;
        }
        self.buffer.stage(
            descriptor(SYSTEM_CHANNEL),
            StagedValue::MaybeText(channel.map(|id| id.to_string())),
        )?;
        Ok(self)
    }

    pub fn verification_level(
        &mut self,
        level: VerificationLevel,
    ) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(VERIFICATION_LEVEL), StagedValue::Int(level as i64))?;
        Ok(self)
    }

    pub fn default_message_notifications(
        &mut self,
        level: NotificationLevel,
    ) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(NOTIFICATION_LEVEL), StagedValue::Int(level as i64))?;
        Ok(self)
    }

    pub fn explicit_content_filter(
        &mut self,
        level: ExplicitContentLevel,
    ) -> Result<&mut Self, UpdateError> {
        self.buffer.stage(
            descriptor(EXPLICIT_CONTENT_LEVEL),
            StagedValue::Int(level as i64),
        )?;
        Ok(self)
    }

    fn require_channel(
        &self,
        id: Id<ChannelMarker>,
        kind: ChannelType,
        field: &'static str,
    ) -> Result<(), UpdateError> {
        let guild = self
            .resolver
            .guild(self.guild_id)
            .ok_or(UpdateError::MissingEntity("guild"))?;
        match guild.channel(id) {
            Some(channel) if channel.kind == kind => Ok(()),
            Some(_) => Err(UpdateError::Validation {
                field,
                reason: "channel has the wrong type".into(),
            }),
            None => Err(UpdateError::Validation {
                field,
                reason: "channel does not belong to this guild".into(),
            }),
        }
    }

    pub fn deadline(&mut self, deadline: Duration) -> &mut Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn reset(&mut self, fields: FieldMask) -> &mut Self {
        self.buffer.reset(fields);
        self
    }

    pub fn reset_all(&mut self) -> &mut Self {
        self.buffer.reset_all();
        self
    }

    pub fn is_dirty(&self, key: FieldKey) -> bool {
        self.buffer.is_dirty(key)
    }
}

// Manual impl: the resolver is a plain trait object with no Debug bound.
impl fmt::Debug for GuildManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildManager")
            .field("guild_id", &self.guild_id)
            .field("buffer", &self.buffer)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Updatable for GuildManager<'_> {
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError> {
        let (guild, actor) = super::resolve_actor(self.resolver, self.guild_id)?;
        let snapshot = AuthorizationSnapshot::capture(&guild, &actor);

        let authorize = || check_capability(&snapshot, Permissions::MANAGE_SERVER);

        let live = |desc: &FieldDescriptor| match desc.wire_name {
            "name" => Some(json!(guild.name)),
            _ => None,
        };

        execute(
            ChangeSet {
                route: Route::modify_guild(self.guild_id.get()),
                descriptors: &DESCRIPTORS,
                buffer: &mut self.buffer,
                deadline: self.deadline,
            },
            transport,
            authorize,
            live,
            || {},
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::CurrentUser;
    use crate::managers::testkit::{self, RecordingTransport};

    fn manager(cache: &crate::entity::InMemoryCache) -> GuildManager<'_> {
        GuildManager::new(cache, Id::new(testkit::GUILD))
    }

    #[test]
    fn afk_channel_must_be_a_voice_channel() {
        let cache = testkit::cache();
        let mut mgr = manager(&cache);
        mgr.afk_channel(Some(Id::new(testkit::VOICE_CHANNEL))).unwrap();
        let err = mgr
            .afk_channel(Some(Id::new(testkit::TEXT_CHANNEL)))
            .unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Validation { field: "afk_channel", .. }
        ));
        // The earlier valid staging survives.
        assert!(mgr.is_dirty(AFK_CHANNEL));
    }

    #[test]
    fn afk_timeout_accepts_only_the_fixed_steps() {
        let cache = testkit::cache();
        let mut mgr = manager(&cache);
        mgr.afk_timeout(900).unwrap();
        let err = mgr.afk_timeout(1000).unwrap_err();
        assert!(matches!(err, UpdateError::Validation { .. }));
    }

    #[test]
    fn unknown_level_sentinel_is_rejected() {
        let cache = testkit::cache();
        let mut mgr = manager(&cache);
        let err = mgr.verification_level(VerificationLevel::Unknown).unwrap_err();
        assert!(matches!(err, UpdateError::Validation { .. }));
        mgr.verification_level(VerificationLevel::High).unwrap();
    }

    #[test]
    fn icon_goes_out_as_a_data_uri() {
        let cache = testkit::cache();
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache);
        mgr.icon(Some(StagedIcon::png(vec![0x89, 0x50]))).unwrap();
        mgr.update(&transport).unwrap();

        let payload = transport.last_payload();
        assert!(payload["icon"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        // Name rides along as a required field.
        assert_eq!(payload["name"], "fixture");
    }

    #[test]
    fn clean_icon_cannot_be_read_back() {
        let cache = testkit::cache();
        let mut mgr = manager(&cache);
        let err = mgr.staged_icon().unwrap_err();
        assert!(matches!(err, UpdateError::UnsupportedOperation("icon")));
        mgr.icon(None).unwrap();
        assert_eq!(mgr.staged_icon().unwrap(), StagedValue::Icon(None));
    }

    #[test]
    fn system_channel_removal_encodes_null() {
        let cache = testkit::cache();
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache);
        mgr.system_channel(None).unwrap();
        mgr.update(&transport).unwrap();
        let payload = transport.last_payload();
        assert!(payload["system_channel_id"].is_null());
    }

    #[test]
    fn missing_capability_blocks_the_whole_batch() {
        let _guard = crate::auth::checks_lock();
        let mut cache = testkit::cache();
        cache.put_current_user(CurrentUser {
            id: Id::new(testkit::PEON),
            username: "peon".into(),
            avatar: None,
            bot: true,
        });
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache);
        mgr.name("renamed").unwrap();
        let err = mgr.update(&transport).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::InsufficientCapability(p) if p == Permissions::MANAGE_SERVER
        ));
        assert_eq!(transport.call_count(), 0);
    }
}
