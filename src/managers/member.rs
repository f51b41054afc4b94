//! Member edits.
//!
//! The required capability is the union over the dirty fields: a batch that
//! touches the nickname and the voice mute needs both MANAGE_NICKNAMES and
//! MUTE_MEMBERS, and the whole batch is rejected if any one bit is missing.
//! Deafen and mute may never target the guild owner, not even by an actor
//! who outranks everyone else.

use std::fmt;
use std::time::Duration;

use crate::auth::{check_capability, check_hierarchy, AuthorizationSnapshot, HierarchyTarget};
use crate::buffer::{PendingChangeBuffer, StagedValue};
use crate::entity::EntityResolver;
use crate::error::UpdateError;
use crate::executor::{execute, ChangeSet, Outcome};
use crate::fields::{Encoding, FieldDescriptor, FieldKey, FieldMask};
use crate::id::{GuildMarker, Id, RoleMarker, UserMarker};
use crate::permissions::Permissions;
use crate::transport::{Route, Transport};

use super::{validate, Updatable};

pub const NICK: FieldKey = FieldKey::new(0, "nick");
pub const ROLES: FieldKey = FieldKey::new(1, "roles");
pub const DEAF: FieldKey = FieldKey::new(2, "deaf");
pub const MUTE: FieldKey = FieldKey::new(3, "mute");

const DESCRIPTORS: [FieldDescriptor; 4] = [
    FieldDescriptor {
        key: NICK,
        wire_name: "nick",
        required: false,
        readback: true,
        validate: validate::nick,
        encoding: Encoding::NullableText,
    },
    FieldDescriptor {
        key: ROLES,
        wire_name: "roles",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::IdList,
    },
    FieldDescriptor {
        key: DEAF,
        wire_name: "deaf",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
    FieldDescriptor {
        key: MUTE,
        wire_name: "mute",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    },
];

fn descriptor(key: FieldKey) -> &'static FieldDescriptor {
    &DESCRIPTORS[key.bit() as usize]
}

/// Batched edits for one guild member.
pub struct MemberManager<'a> {
    resolver: &'a dyn EntityResolver,
    guild_id: Id<GuildMarker>,
    user_id: Id<UserMarker>,
    buffer: PendingChangeBuffer,
    deadline: Option<Duration>,
}

impl<'a> MemberManager<'a> {
    pub fn new(
        resolver: &'a dyn EntityResolver,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
    ) -> Self {
        Self {
            resolver,
            guild_id,
            user_id,
            buffer: PendingChangeBuffer::new(),
            deadline: None,
        }
    }

    /// Set the nickname, or `None` to remove it.
    pub fn nick(&mut self, nick: Option<String>) -> Result<&mut Self, UpdateError> {
        self.buffer
            .stage(descriptor(NICK), StagedValue::MaybeText(nick))?;
        Ok(self)
    }

    /// Replace the member's role list wholesale. Every role must belong to
    /// this guild.
    pub fn roles(&mut self, roles: Vec<Id<RoleMarker>>) -> Result<&mut Self, UpdateError> {
        let guild = self
            .resolver
            .guild(self.guild_id)
            .ok_or(UpdateError::MissingEntity("guild"))?;
        for role_id in &roles {
            if guild.role(*role_id).is_none() {
                return Err(UpdateError::Validation {
                    field: "roles",
                    reason: format!("role {role_id} does not belong to this guild"),
                });
            }
        }
        self.buffer.stage(
            descriptor(ROLES),
            StagedValue::Ids(roles.iter().map(|id| id.get()).collect()),
        )?;
        Ok(self)
    }

    /// Server-deafen (voice).
    pub fn deafen(&mut self, deaf: bool) -> Result<&mut Self, UpdateError> {
        self.buffer.stage(descriptor(DEAF), StagedValue::Bool(deaf))?;
        Ok(self)
    }

    /// Server-mute (voice).
    pub fn mute(&mut self, mute: bool) -> Result<&mut Self, UpdateError> {
        self.buffer.stage(descriptor(MUTE), StagedValue::Bool(mute))?;
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

    /// The capability union the pending batch needs.
    fn required_capabilities(&self) -> Permissions {
        let mut required = Permissions::empty();
        if self.buffer.is_dirty(NICK) {
            required |= Permissions::MANAGE_NICKNAMES;
        }
        if self.buffer.is_dirty(ROLES) {
            required |= Permissions::MANAGE_ROLES;
        }
        if self.buffer.is_dirty(DEAF) {
            required |= Permissions::DEAFEN_MEMBERS;
        }
        if self.buffer.is_dirty(MUTE) {
            required |= Permissions::MUTE_MEMBERS;
        }
        required
    }
}

// Manual impl: the resolver is a plain trait object with no Debug bound.
impl fmt::Debug for MemberManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberManager")
            .field("guild_id", &self.guild_id)
            .field("user_id", &self.user_id)
            .field("buffer", &self.buffer)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Updatable for MemberManager<'_> {
    fn update(&mut self, transport: &dyn Transport) -> Result<Outcome, UpdateError> {
        let (guild, actor) = super::resolve_actor(self.resolver, self.guild_id)?;
        let target = guild
            .member(self.user_id)
            .cloned()
            .ok_or(UpdateError::MissingEntity("member"))?;
        let snapshot = AuthorizationSnapshot::capture(&guild, &actor);
        let required = self.required_capabilities();
        let voice_state_dirty = self.buffer.is_dirty(DEAF) || self.buffer.is_dirty(MUTE);

        // Every role being assigned or removed must sit strictly below the
        // actor, in both directions of the diff.
        let changed_roles: Vec<Id<RoleMarker>> = match self.buffer.staged(ROLES) {
            Some(StagedValue::Ids(ids)) => {
                let staged: Vec<Id<RoleMarker>> = ids.iter().map(|id| Id::new(*id)).collect();
                let mut changed: Vec<Id<RoleMarker>> = staged
                    .iter()
                    .copied()
                    .filter(|id| !target.roles.contains(id))
                    .collect();
                changed.extend(
                    target
                        .roles
                        .iter()
                        .copied()
                        .filter(|id| !staged.contains(id)),
                );
                changed
            }
            _ => Vec::new(),
        };

        let authorize = || {
            check_capability(&snapshot, required)?;
            if voice_state_dirty {
                check_hierarchy(&guild, &actor, HierarchyTarget::OwnerProtected(&target))?;
            } else {
                check_hierarchy(&guild, &actor, HierarchyTarget::Member(&target))?;
            }
            for role_id in &changed_roles {
                // A stale reference to a since-deleted role has no hierarchy
                // position left to violate.
                if let Some(role) = guild.role(*role_id) {
                    check_hierarchy(&guild, &actor, HierarchyTarget::Role(role))?;
                }
            }
            Ok(())
        };

        execute(
            ChangeSet {
                route: Route::modify_member(self.guild_id.get(), self.user_id.get()),
                descriptors: &DESCRIPTORS,
                buffer: &mut self.buffer,
                deadline: self.deadline,
            },
            transport,
            authorize,
            |_| None,
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

    fn manager(cache: &crate::entity::InMemoryCache, user: u64) -> MemberManager<'_> {
        MemberManager::new(cache, Id::new(testkit::GUILD), Id::new(user))
    }

    #[test]
    fn capability_union_covers_every_dirty_field() {
        let cache = testkit::cache();
        let mut mgr = manager(&cache, testkit::PEON);
        mgr.nick(Some("newbie".into())).unwrap();
        mgr.mute(true).unwrap();
        assert_eq!(
            mgr.required_capabilities(),
            Permissions::MANAGE_NICKNAMES | Permissions::MUTE_MEMBERS
        );
    }

    #[test]
    fn one_missing_bit_rejects_the_whole_batch() {
        let _guard = crate::auth::checks_lock();
        let mut cache = testkit::cache();
        // The peon holds no moderation permissions at all.
        cache.put_current_user(CurrentUser {
            id: Id::new(testkit::PEON),
            username: "peon".into(),
            avatar: None,
            bot: true,
        });
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache, testkit::PEON);
        mgr.nick(Some("self-nick".into())).unwrap();
        mgr.deafen(true).unwrap();
        let err = mgr.update(&transport).unwrap_err();
        assert!(matches!(err, UpdateError::InsufficientCapability(_)));
        assert_eq!(transport.call_count(), 0);
        assert!(mgr.is_dirty(NICK));
        assert!(mgr.is_dirty(DEAF));
    }

    #[test]
    fn owner_cannot_be_deafened() {
        let _guard = crate::auth::checks_lock();
        let cache = testkit::cache();
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache, testkit::OWNER);
        mgr.deafen(true).unwrap();
        let err = mgr.update(&transport).unwrap_err();
        assert!(matches!(err, UpdateError::HierarchyViolation(_)));
    }

    #[test]
    fn nick_removal_dispatches_null() {
        let cache = testkit::cache();
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache, testkit::PEON);
        mgr.nick(None).unwrap();
        mgr.update(&transport).unwrap();
        let payload = transport.last_payload();
        assert!(payload["nick"].is_null());
        assert_eq!(payload.as_object().unwrap().len(), 1);
    }

    #[test]
    fn nick_length_is_bounded() {
        let cache = testkit::cache();
        let mut mgr = manager(&cache, testkit::PEON);
        let err = mgr.nick(Some("x".repeat(33))).unwrap_err();
        assert!(matches!(err, UpdateError::Validation { field: "nick", .. }));
    }

    #[test]
    fn foreign_roles_are_rejected_in_the_setter() {
        let cache = testkit::cache();
        let mut mgr = manager(&cache, testkit::PEON);
        let err = mgr.roles(vec![Id::new(99999)]).unwrap_err();
        assert!(matches!(err, UpdateError::Validation { field: "roles", .. }));
        assert!(!mgr.is_dirty(ROLES));
    }

    #[test]
    fn assigning_a_role_at_your_own_rank_is_rejected() {
        let _guard = crate::auth::checks_lock();
        let cache = testkit::cache();
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache, testkit::PEON);
        // The staff role sits at the actor's own highest position.
        mgr.roles(vec![Id::new(testkit::PEON_ROLE), Id::new(testkit::STAFF_ROLE)])
            .unwrap();
        let err = mgr.update(&transport).unwrap_err();
        assert!(matches!(err, UpdateError::HierarchyViolation(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn removing_a_role_at_your_own_rank_is_rejected() {
        let _guard = crate::auth::checks_lock();
        let cache = testkit::cache();
        let transport = RecordingTransport::ok();
        // The actor strips their own staff role; the role sits at their own
        // highest position, so the hierarchy gate applies to the removal too.
        let mut mgr = manager(&cache, testkit::STAFF);
        mgr.roles(Vec::new()).unwrap();
        let err = mgr.update(&transport).unwrap_err();
        assert!(matches!(err, UpdateError::HierarchyViolation(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn role_list_projects_to_snowflake_strings() {
        let cache = testkit::cache();
        let transport = RecordingTransport::ok();
        let mut mgr = manager(&cache, testkit::PEON);
        mgr.roles(vec![Id::new(testkit::PEON_ROLE)]).unwrap();
        mgr.update(&transport).unwrap();
        let payload = transport.last_payload();
        assert_eq!(
            payload["roles"],
            serde_json::json!([testkit::PEON_ROLE.to_string()])
        );
    }
}
