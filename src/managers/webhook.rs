//! Webhook edits.

use std::fmt;
use std::time::Duration;

use serde_json::json;

use crate::auth::{check_capability, AuthorizationSnapshot};
use crate::buffer::{PendingChangeBuffer, StagedIcon, StagedValue};
use crate::entity::{ChannelType, EntityResolver, Webhook};
use crate::error::UpdateError;
use crate::executor::{execute, ChangeSet, Outcome};
use crate::fields::{Encoding, FieldDescriptor, FieldKey, FieldMask};
use crate::id::{ChannelMarker, Id, WebhookMarker};
use crate::permissions::Permissions;
use crate::transport::{Route, Transport};

use super::{validate, Updatable};

pub const NAME: FieldKey = FieldKey::new(0, "name");
pub const AVATAR: FieldKey = FieldKey::new(1, "avatar");
pub const CHANNEL: FieldKey = FieldKey::new(2, "channel");

const DESCRIPTORS: [FieldDescriptor; 3] = [
    FieldDescriptor {
        key: NAME,
        wire_name: "name",
        required: true,
        readback: true,
        validate: validate::name,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: AVATAR,
        wire_name: "avatar",
        required: false,
        readback: false,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::IconData,
    },
    FieldDescriptor {
        key: CHANNEL,
        wire_name: "channel_id",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
];

fn descriptor(key: FieldKey) -> &'static FieldDescriptor {
    &DESCRIPTORS[key.bit() as usize]
}

/// Batched edits for one webhook.
pub struct WebhookManager<'a> {
    resolver: &'a dyn EntityResolver,
    webhook_id: Id<WebhookMarker>,
    buffer: PendingChangeBuffer,
    deadline: Option<Duration>,
}

impl<'a> WebhookManager<'a> {
    pub fn new(resolver: &'a dyn EntityResolver, webhook_id: Id<WebhookMarker>) -> Self {
        Self {
            resolver,
            webhook_id,
            buffer: PendingChangeBuffer::new(),
            deadline: None,
        }
    }

    fn webhook(&self) -> Result<Webhook, UpdateError> {
        self.resolver
            .webhook(self.webhook_id)
            .ok_or(UpdateError::MissingEntity("webhook"))
    }

    pub fn name(&mut self, name: impl Into<String>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(NAME), StagedValue::Text(name.into()))?;
        Ok(self)
    }

    /// Upload a new avatar, or `None` to remove the current one.
    pub fn avatar(&mut self, avatar: Option<StagedIcon>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(AVATAR), StagedValue::Icon(avatar))?;
        Ok(self)
    }

    /// Move the webhook to another text channel in the same guild.
    pub fn channel(&mut self, channel: Id<ChannelMarker>) -> Result<&mut Self, UpdateError> {
        let webhook = self.webhook()?;
        match self.resolver.channel(channel) {
            Some(c) if c.guild_id == webhook.guild_id && c.kind == ChannelType::GuildText => {}
            Some(_) => {
                return Err(UpdateError::Validation {
                    field: "channel",
                    reason: "webhooks can only live in a text channel of their guild".into(),
                })
            }
            None => return Err(UpdateError::MissingEntity("channel")),
        }
        self.buffer
            .stage(descriptor(CHANNEL), StagedValue::Text(channel.to_string()))?;
        Ok(self)
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
impl fmt::Debug for WebhookManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookManager")
            .field("webhook_id", &self.webhook_id)
            .field("buffer", &self.buffer)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Updatable for WebhookManager<'_> {
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError> {
        let webhook = self.webhook()?;
        let (guild, actor) = super::resolve_actor(self.resolver, webhook.guild_id)?;
        let snapshot = AuthorizationSnapshot::capture(&guild, &actor);

        let authorize = || check_capability(&snapshot, Permissions::MANAGE_WEBHOOKS);

        let live = |desc: &FieldDescriptor| match desc.wire_name {
            "name" => webhook.name.as_ref().map(|n| json!(n)),
            _ => None,
        };

        execute(
            ChangeSet {
                route: Route::modify_webhook(self.webhook_id.get()),
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
