//! Role edits.
//!
//! The modify-role endpoint expects the full role shape, so name, color,
//! hoist, and permissions are pre-populated from the live role when they are
//! not themselves dirty. A permission edit additionally runs the escalation
//! check: the actor can only hand out bits it currently holds.

use std::fmt;
use std::time::Duration;

use serde_json::json;

use crate::auth::{check_capability, check_grant, check_hierarchy, AuthorizationSnapshot, HierarchyTarget};
use crate::buffer::{PendingChangeBuffer, StagedValue};
use crate::entity::EntityResolver;
use crate::error::UpdateError;
use crate::executor::{execute, ChangeSet, Outcome};
use crate::fields::{Encoding, FieldDescriptor, FieldKey, FieldMask};
use crate::id::{GuildMarker, Id, RoleMarker};
use crate::permissions::Permissions;
use crate::transport::{Route, Transport};

use super::{validate, Updatable};

pub const NAME: FieldKey = FieldKey::new(0, "name");
pub const COLOR: FieldKey = FieldKey::new(1, "color");
pub const HOIST: FieldKey = FieldKey::new(2, "hoist");
pub const MENTIONABLE: FieldKey = FieldKey::new(3, "mentionable");
pub const PERMISSIONS: FieldKey = FieldKey::new(4, "permissions");
pub const POSITION: FieldKey = FieldKey::new(5, "position");

const DESCRIPTORS: [FieldDescriptor; 6] = [
    FieldDescriptor {
        key: NAME,
        wire_name: "name",
        required: true,
        readback: true,
        validate: validate::name,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: COLOR,
        wire_name: "color",
        required: true,
        readback: true,
        validate: validate::color,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: HOIST,
        wire_name: "hoist",
        required: true,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: MENTIONABLE,
        wire_name: "mentionable",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: PERMISSIONS,
        wire_name: "permissions",
        required: true,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: POSITION,
        wire_name: "position",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
];

fn descriptor(key: FieldKey) -> &'static FieldDescriptor {
    &DESCRIPTORS[key.bit() as usize]
}

/// Batched edits for one role.
pub struct RoleManager<'a> {
    resolver: &'a dyn EntityResolver,
    guild_id: Id<GuildMarker>,
    role_id: Id<RoleMarker>,
    buffer: PendingChangeBuffer,
    deadline: Option<Duration>,
}

impl<'a> RoleManager<'a> {
    pub fn new(
        resolver: &'a dyn EntityResolver,
        guild_id: Id<GuildMarker>,
        role_id: Id<RoleMarker>,
    ) -> Self {
        Self {
            resolver,
            guild_id,
            role_id,
            buffer: PendingChangeBuffer::new(),
            deadline: None,
        }
    }

    pub fn name(&mut self, name: impl Into<String>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(NAME), StagedValue::Text(name.into()))?;
        Ok(self)
    }

    /// RGB color, `0` for the colorless default.
    pub fn color(&mut self, rgb: u32) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(COLOR), StagedValue::UInt(u64::from(rgb)))?;
        Ok(self)
    }

    pub fn hoisted(&mut self, hoisted: bool) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(HOIST), StagedValue::Bool(hoisted))?;
        Ok(self)
    }

    pub fn mentionable(&mut self, mentionable: bool) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(MENTIONABLE), StagedValue::Bool(mentionable))?;
        Ok(self)
    }

    /// Replace the role's permission set wholesale.
    pub fn permissions(&mut self, permissions: Permissions) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(PERMISSIONS), StagedValue::Permissions(permissions))?;
        Ok(self)
    }

    /// Grant permissions on top of whatever is already staged (or live).
    pub fn grant(&mut self, permissions: Permissions) -> Result<&mut Self, UpdateError> {
        let current = self.effective_permissions()?;
        self.permissions(current | permissions)
    }

    /// Revoke permissions from whatever is already staged (or live).
    pub fn revoke(&mut self, permissions: Permissions) -> Result<&mut Self, UpdateError> {
        let current = self.effective_permissions()?;
        self.permissions(current & !permissions)
    }

    fn effective_permissions(&self) -> Result<Permissions, UpdateError> {
        if let Some(StagedValue::Permissions(p)) = self.buffer.staged(PERMISSIONS) {
            return Ok(*p);
        }
        let guild = self
            .resolver
            .guild(self.guild_id)
            .ok_or(UpdateError::MissingEntity("guild"))?;
        let role = guild
            .role(self.role_id)
            .ok_or(UpdateError::MissingEntity("role"))?;
        Ok(role.permissions)
    }

    pub fn position(&mut self, position: i32) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(POSITION), StagedValue::Int(i64::from(position)))?;
        Ok(self)
    }

    /// Abort after this long; the transport discards any late response.
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
impl fmt::Debug for RoleManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleManager")
            .field("guild_id", &self.guild_id)
            .field("role_id", &self.role_id)
            .field("buffer", &self.buffer)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Updatable for RoleManager<'_> {
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError> {
        let (guild, actor) = super::resolve_actor(self.resolver, self.guild_id)?;
        let role = guild
            .role(self.role_id)
            .cloned()
            .ok_or(UpdateError::MissingEntity("role"))?;
        let snapshot = AuthorizationSnapshot::capture(&guild, &actor);

        let staged_perms = match self.buffer.staged(PERMISSIONS) {
            Some(StagedValue::Permissions(p)) => Some(*p),
            _ => None,
        };

        let authorize = || {
            if role.managed {
                return Err(UpdateError::UnsupportedOperation("managed role"));
            }
            check_capability(&snapshot, Permissions::MANAGE_ROLES)?;
            check_hierarchy(&guild, &actor, HierarchyTarget::Role(&role))?;
            if let Some(granted) = staged_perms {
                check_grant(&snapshot, granted)?;
            }
            Ok(())
        };

        let live = |desc: &FieldDescriptor| match desc.wire_name {
            "name" => Some(json!(role.name)),
            "color" => Some(json!(role.color)),
            "hoist" => Some(json!(role.hoist)),
            "permissions" => Some(json!(role.permissions.bits().to_string())),
            _ => None,
        };

        execute(
            ChangeSet {
                route: Route::modify_role(self.guild_id.get(), self.role_id.get()),
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
