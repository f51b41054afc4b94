//! Single-target permission overwrite edits.
//!
//! Unlike the other managers this one PUTs the complete overwrite (allow,
//! deny, type) rather than PATCHing a diff: the endpoint replaces the
//! overwrite wholesale. Edits still accumulate locally in an
//! [`OverwriteBatch`], seeded from the live overwrite on the first edit so
//! untouched bits survive the replacement.

use std::fmt;
use std::time::Duration;

use serde_json::json;

use crate::auth::{check_capability, check_grant, AuthorizationSnapshot};
use crate::buffer::{PendingChangeBuffer, StagedValue};
use crate::entity::{Channel, EntityResolver, OverwriteType};
use crate::error::UpdateError;
use crate::executor::{execute, ChangeSet, Outcome};
use crate::fields::{Encoding, FieldDescriptor, FieldKey, FieldMask};
use crate::id::{ChannelMarker, GenericMarker, Id};
use crate::overwrites::OverwriteBatch;
use crate::permissions::Permissions;
use crate::transport::{Route, Transport};

use super::Updatable;

pub const ALLOW: FieldKey = FieldKey::new(0, "allow");
pub const DENY: FieldKey = FieldKey::new(1, "deny");
pub const TYPE: FieldKey = FieldKey::new(2, "type");

// TYPE is never staged; it always rides along from the manager's target kind
// so the PUT body is complete.
const DESCRIPTORS: [FieldDescriptor; 3] = [
    FieldDescriptor {
        key: ALLOW,
        wire_name: "allow",
        required: true,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: DENY,
        wire_name: "deny",
        required: true,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: TYPE,
        wire_name: "type",
        required: true,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
];

fn descriptor(key: FieldKey) -> &'static FieldDescriptor {
    &DESCRIPTORS[key.bit() as usize]
}

/// Accumulated allow/deny edits for one overwrite target on one channel.
pub struct PermOverrideManager<'a> {
    resolver: &'a dyn EntityResolver,
    channel_id: Id<ChannelMarker>,
    target: Id<GenericMarker>,
    kind: OverwriteType,
    batch: Option<OverwriteBatch>,
    buffer: PendingChangeBuffer,
    deadline: Option<Duration>,
}

impl<'a> PermOverrideManager<'a> {
    pub fn new(
        resolver: &'a dyn EntityResolver,
        channel_id: Id<ChannelMarker>,
        target: Id<GenericMarker>,
        kind: OverwriteType,
    ) -> Self {
        Self {
            resolver,
            channel_id,
            target,
            kind,
            batch: None,
            buffer: PendingChangeBuffer::new(),
            deadline: None,
        }
    }

    fn channel(&self) -> Result<Channel, UpdateError> {
        self.resolver
            .channel(self.channel_id)
            .ok_or(UpdateError::MissingEntity("channel"))
    }

    /// The working batch, seeded from the live overwrite on first use.
    fn working_batch(&mut self) -> Result<OverwriteBatch, UpdateError> {
        if let Some(batch) = self.batch {
            return Ok(batch);
        }
        let channel = self.channel()?;
        Ok(channel
            .overwrite(self.target)
            .map(OverwriteBatch::from_existing)
            .unwrap_or_default())
    }

    fn store(&mut self, batch: OverwriteBatch) -> Result<(), UpdateError> {
        self.buffer
            .stage(descriptor(ALLOW), StagedValue::Permissions(batch.allowed()))?;
        self.buffer
            .stage(descriptor(DENY), StagedValue::Permissions(batch.denied()))?;
        self.batch = Some(batch);
        Ok(())
    }

    pub fn grant(&mut self, permissions: Permissions) -> Result<&mut Self, UpdateError> {
        let mut batch = self.working_batch()?;
        batch.grant(permissions);
        self.store(batch)?;
        Ok(self)
    }

    pub fn deny(&mut self, permissions: Permissions) -> Result<&mut Self, UpdateError> {
        let mut batch = self.working_batch()?;
        batch.deny(permissions);
        self.store(batch)?;
        Ok(self)
    }

    /// Return the bits to the inherited state, removing them from both sides.
    pub fn clear(&mut self, permissions: Permissions) -> Result<&mut Self, UpdateError> {
        let mut batch = self.working_batch()?;
        batch.clear(permissions);
        self.store(batch)?;
        Ok(self)
    }

    pub fn allowed(&self) -> Permissions {
        self.batch.map(OverwriteBatch::allowed).unwrap_or_default()
    }

    pub fn denied(&self) -> Permissions {
        self.batch.map(OverwriteBatch::denied).unwrap_or_default()
    }

    pub fn deadline(&mut self, deadline: Duration) -> &mut Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn reset(&mut self, fields: FieldMask) -> &mut Self {
        self.buffer.reset(fields);
        if !self.buffer.any() {
            self.batch = None;
        }
        self
    }

    pub fn reset_all(&mut self) -> &mut Self {
        self.buffer.reset_all();
        self.batch = None;
        self
    }

    pub fn is_dirty(&self, key: FieldKey) -> bool {
        self.buffer.is_dirty(key)
    }
}

// Manual impl: the resolver is a plain trait object with no Debug bound.
impl fmt::Debug for PermOverrideManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermOverrideManager")
            .field("channel_id", &self.channel_id)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("batch", &self.batch)
            .field("buffer", &self.buffer)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Updatable for PermOverrideManager<'_> {
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError> {
        let channel = self.channel()?;
        let (guild, actor) = super::resolve_actor(self.resolver, channel.guild_id)?;
        let snapshot = AuthorizationSnapshot::capture_for_channel(&guild, &actor, &channel);

        let staged_allow = match self.buffer.staged(ALLOW) {
            Some(StagedValue::Permissions(p)) => *p,
            _ => Permissions::empty(),
        };

        let authorize = || {
            check_capability(&snapshot, Permissions::MANAGE_ROLES)?;
            check_grant(&snapshot, staged_allow)?;
            Ok(())
        };

        let live_overwrite = channel.overwrite(self.target).cloned();
        let kind = self.kind;
        let live = move |desc: &FieldDescriptor| match desc.wire_name {
            "type" => Some(json!(kind as u8)),
            "allow" => Some(json!(live_overwrite
                .as_ref()
                .map(|o| o.allow)
                .unwrap_or_default()
                .bits()
                .to_string())),
            "deny" => Some(json!(live_overwrite
                .as_ref()
                .map(|o| o.deny)
                .unwrap_or_default()
                .bits()
                .to_string())),
            _ => None,
        };

        let batch_slot = &mut self.batch;
        execute(
            ChangeSet {
                route: Route::modify_channel_permissions(self.channel_id.get(), self.target.get()),
                descriptors: &DESCRIPTORS,
                buffer: &mut self.buffer,
                deadline: self.deadline,
            },
            transport,
            authorize,
            live,
            || *batch_slot = None,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
