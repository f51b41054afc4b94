//! Current-user (account) edits.
//!
//! User accounts must supply their current password alongside a username
//! change; bot accounts never do. The password is staged like any other
//! field, so it is scoped to one batch: a successful dispatch clears it and
//! the next username change must supply it again.

use std::fmt;
use std::time::Duration;

use serde_json::json;

use crate::buffer::{PendingChangeBuffer, StagedIcon, StagedValue};
use crate::entity::{CurrentUser, EntityResolver};
use crate::error::UpdateError;
use crate::executor::{execute, ChangeSet, Outcome};
use crate::fields::{Encoding, FieldDescriptor, FieldKey, FieldMask};
use crate::transport::{Route, Transport};

use super::{validate, Updatable};

pub const USERNAME: FieldKey = FieldKey::new(0, "username");
pub const AVATAR: FieldKey = FieldKey::new(1, "avatar");
pub const PASSWORD: FieldKey = FieldKey::new(2, "password");

const DESCRIPTORS: [FieldDescriptor; 3] = [
    FieldDescriptor {
        key: USERNAME,
        wire_name: "username",
        required: false,
        readback: true,
        validate: validate::username,
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
        key: PASSWORD,
        wire_name: "password",
        required: false,
        readback: false,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
];

fn descriptor(key: FieldKey) -> &'static FieldDescriptor {
    &DESCRIPTORS[key.bit() as usize]
}

/// Batched edits for the account the client is logged in as.
pub struct AccountManager<'a> {
    resolver: &'a dyn EntityResolver,
    buffer: PendingChangeBuffer,
    deadline: Option<Duration>,
}

impl<'a> AccountManager<'a> {
    pub fn new(resolver: &'a dyn EntityResolver) -> Self {
        Self {
            resolver,
            buffer: PendingChangeBuffer::new(),
            deadline: None,
        }
    }

    fn current_user(&self) -> Result<CurrentUser, UpdateError> {
        self.resolver
            .current_user()
            .ok_or(UpdateError::MissingEntity("current user"))
    }

    pub fn username(&mut self, username: impl Into<String>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(USERNAME), StagedValue::Text(username.into()))?;
        Ok(self)
    }

    /// Upload a new avatar, or `None` to remove the current one.
    pub fn avatar(&mut self, avatar: Option<StagedIcon>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(AVATAR), StagedValue::Icon(avatar))?;
        Ok(self)
    }

    /// Supply the account's current password for this batch. Required for
    /// username changes on user accounts; ignored for bots.
    pub fn current_password(&mut self, password: impl Into<String>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(PASSWORD), StagedValue::Text(password.into()))?;
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

// Manual impl: the resolver is a plain trait object with no Debug bound, and
// the buffer may hold the current password, so only dirty bits are printed.
impl fmt::Debug for AccountManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountManager")
            .field("username_dirty", &self.buffer.is_dirty(USERNAME))
            .field("avatar_dirty", &self.buffer.is_dirty(AVATAR))
            .field("password_supplied", &self.buffer.is_dirty(PASSWORD))
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Updatable for AccountManager<'_> {
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError> {
        let user = self.current_user()?;
        let password_needed =
            !user.bot && self.buffer.is_dirty(USERNAME) && !self.buffer.is_dirty(PASSWORD);

        let authorize = || {
            if password_needed {
                return Err(UpdateError::Validation {
                    field: "password",
                    reason: "current password required to change the username".into(),
                });
            }
            Ok(())
        };

        let live = |desc: &FieldDescriptor| match desc.wire_name {
            "username" => Some(json!(user.username)),
            _ => None,
        };

        execute(
            ChangeSet {
                route: Route::modify_current_user(),
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
