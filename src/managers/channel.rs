//! Channel edits.
//!
//! Which fields are editable depends on the channel type, so the setters
//! check the live channel: topic is text-only, bitrate and user limit are
//! voice-only, and the parent must be a category in the same guild.
//!
//! Permission overwrites are staged separately in a [`StagedOverwrites`] list
//! and folded into the diff at dispatch time: the wire field carries the
//! complete post-edit overwrite list, computed against the *current* live
//! list rather than the one from staging time.

use std::fmt;
use std::time::Duration;

use serde_json::json;

use crate::auth::{check_capability, AuthorizationSnapshot};
use crate::buffer::{PendingChangeBuffer, StagedValue};
use crate::entity::{Channel, ChannelType, EntityResolver, OverwriteType};
use crate::error::UpdateError;
use crate::executor::{execute, ChangeSet, Outcome};
use crate::fields::{Encoding, FieldDescriptor, FieldKey, FieldMask};
use crate::id::{ChannelMarker, GenericMarker, Id};
use crate::overwrites::{OverwriteBatch, StagedOverwrites};
use crate::permissions::Permissions;
use crate::transport::{Route, Transport};

use super::{validate, Updatable};

pub const NAME: FieldKey = FieldKey::new(0, "name");
pub const TOPIC: FieldKey = FieldKey::new(1, "topic");
pub const POSITION: FieldKey = FieldKey::new(2, "position");
pub const NSFW: FieldKey = FieldKey::new(3, "nsfw");
pub const PARENT: FieldKey = FieldKey::new(4, "parent");
pub const BITRATE: FieldKey = FieldKey::new(5, "bitrate");
pub const USER_LIMIT: FieldKey = FieldKey::new(6, "user_limit");
pub const OVERWRITES: FieldKey = FieldKey::new(7, "permission_overwrites");

const DESCRIPTORS: [FieldDescriptor; 8] = [
    FieldDescriptor {
        key: NAME,
        wire_name: "name",
        required: true,
        readback: true,
        validate: validate::name,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: TOPIC,
        wire_name: "topic",
        required: false,
        readback: true,
        validate: validate::topic,
        encoding: Encoding::NullableText,
    },
    FieldDescriptor {
        key: POSITION,
        wire_name: "position",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: NSFW,
        wire_name: "nsfw",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: PARENT,
        wire_name: "parent_id",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::NullableText,
    },
    FieldDescriptor {
        key: BITRATE,
        wire_name: "bitrate",
        required: false,
        readback: true,
        validate: validate::bitrate,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: USER_LIMIT,
        wire_name: "user_limit",
        required: false,
        readback: true,
        validate: validate::user_limit,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: OVERWRITES,
        wire_name: "permission_overwrites",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Overwrites,
    },
];

fn descriptor(key: FieldKey) -> &'static FieldDescriptor {
    &DESCRIPTORS[key.bit() as usize]
}

/// Batched edits for one channel.
pub struct ChannelManager<'a> {
    resolver: &'a dyn EntityResolver,
    channel_id: Id<ChannelMarker>,
    buffer: PendingChangeBuffer,
    overwrites: StagedOverwrites,
    deadline: Option<Duration>,
}

impl<'a> ChannelManager<'a> {
    pub fn new(resolver: &'a dyn EntityResolver, channel_id: Id<ChannelMarker>) -> Self {
        Self {
            resolver,
            channel_id,
            buffer: PendingChangeBuffer::new(),
            overwrites: StagedOverwrites::new(),
            deadline: None,
        }
    }

    fn channel(&self) -> Result<Channel, UpdateError> {
        self.resolver
            .channel(self.channel_id)
            .ok_or(UpdateError::MissingEntity("channel"))
    }

    pub fn name(&mut self, name: impl Into<String>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(NAME), StagedValue::Text(name.into()))?;
        Ok(self)
    }

    /// Set the topic, or `None` to remove it. Text channels only.
    pub fn topic(&mut self, topic: Option<String>) -> Result<&mut Self, UpdateError> {
        if self.channel()?.kind != ChannelType::GuildText {
            return Err(UpdateError::UnsupportedOperation("topic"));
        }
        self.buffer
            .stage(descriptor(TOPIC), StagedValue::MaybeText(topic))?;
        Ok(self)
    }

    pub fn position(&mut self, position: i32) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(POSITION), StagedValue::Int(i64::from(position)))?;
        Ok(self)
    }

    pub fn nsfw(&mut self, nsfw: bool) -> Result<&mut Self, UpdateError> {
        self.buffer.stage(descriptor(NSFW), StagedValue::Bool(nsfw))?;
        Ok(self)
    }

    /// Move the channel under a category, or `None` to detach it.
    pub fn parent(&mut self, parent: Option<Id<ChannelMarker>>) -> Result<&mut Self, UpdateError> {
        if let Some(parent_id) = parent {
            let channel = self.channel()?;
            match self.resolver.channel(parent_id) {
                Some(p) if p.guild_id == channel.guild_id && p.kind == ChannelType::GuildCategory => {}
                Some(_) => {
                    return Err(UpdateError::Validation {
                        field: "parent",
                        reason: "parent must be a category in the same guild".into(),
                    })
                }
                None => return Err(UpdateError::MissingEntity("parent channel")),
            }
        }
        self.buffer.stage(
            descriptor(PARENT),
            StagedValue::MaybeText(parent.map(|id| id.to_string())),
        )?;
        Ok(self)
    }

    /// Voice channels only.
    pub fn bitrate(&mut self, bitrate: u32) -> Result<&mut Self, UpdateError> {
        if !self.channel()?.is_voice() {
            return Err(UpdateError::UnsupportedOperation("bitrate"));
        }
        self.buffer
            .stage(descriptor(BITRATE), StagedValue::UInt(u64::from(bitrate)))?;
        Ok(self)
    }

    /// Voice channels only; `0` lifts the limit.
    pub fn user_limit(&mut self, limit: u16) -> Result<&mut Self, UpdateError> {
        if !self.channel()?.is_voice() {
            return Err(UpdateError::UnsupportedOperation("user_limit"));
        }
        self.buffer
            .stage(descriptor(USER_LIMIT), StagedValue::UInt(u64::from(limit)))?;
        Ok(self)
    }

    /// Stage an overwrite for `target`, replacing any staged one for the
    /// same target.
    pub fn put_overwrite(
        &mut self,
        target: Id<GenericMarker>,
        kind: OverwriteType,
        batch: OverwriteBatch,
    ) -> &mut Self {
        self.overwrites.put(target, kind, batch);
        self
    }

    /// Stage the removal of `target`'s overwrite.
    pub fn remove_overwrite(&mut self, target: Id<GenericMarker>) -> &mut Self {
        self.overwrites.remove(target);
        self
    }

    pub fn deadline(&mut self, deadline: Duration) -> &mut Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn reset(&mut self, fields: FieldMask) -> &mut Self {
        self.buffer.reset(fields);
        if fields.contains(OVERWRITES) {
            self.overwrites.reset();
        }
        self
    }

    pub fn reset_all(&mut self) -> &mut Self {
        self.buffer.reset_all();
        self.overwrites.reset();
        self
    }

    pub fn is_dirty(&self, key: FieldKey) -> bool {
        if key == OVERWRITES {
            self.buffer.is_dirty(key) || self.overwrites.any()
        } else {
            self.buffer.is_dirty(key)
        }
    }
}

// Manual impl: the resolver is a plain trait object with no Debug bound.
impl fmt::Debug for ChannelManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channel_id", &self.channel_id)
            .field("buffer", &self.buffer)
            .field("overwrites", &self.overwrites)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Updatable for ChannelManager<'_> {
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError> {
        let channel = self.channel()?;
        let (guild, actor) = super::resolve_actor(self.resolver, channel.guild_id)?;
        let snapshot = AuthorizationSnapshot::capture_for_channel(&guild, &actor, &channel);

        // Authorization runs before the overwrite fold below mutates the
        // buffer, so a rejection leaves the staged state exactly as it was.
        check_capability(&snapshot, Permissions::MANAGE_CHANNEL)?;
        if self.buffer.is_dirty(OVERWRITES) || self.overwrites.any() {
            check_capability(&snapshot, Permissions::MANAGE_ROLES)?;
        }

        // Fold the staged overwrite list into the buffer against the current
        // live list. Recomputed on every attempt, so a retry after a failed
        // dispatch still diffs against fresh data.
        if self.overwrites.any() {
            let merged = self.overwrites.apply_to(&channel.permission_overwrites);
            self.buffer
                .stage(descriptor(OVERWRITES), StagedValue::Overwrites(merged))?;
        }

        let live = |desc: &FieldDescriptor| match desc.wire_name {
            "name" => Some(json!(channel.name)),
            _ => None,
        };

        let staged_overwrites = &self.overwrites;
        execute(
            ChangeSet {
                route: Route::modify_channel(self.channel_id.get()),
                descriptors: &DESCRIPTORS,
                buffer: &mut self.buffer,
                deadline: self.deadline,
            },
            transport,
            || Ok(()),
            live,
            || staged_overwrites.reset(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
