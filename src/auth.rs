//! Pre-flight authorization checks.
//!
//! Every mutation runs through the gate before any network dispatch: first
//! the capability check (does the actor hold the permission the mutation
//! requires), then the hierarchy check (does the actor rank strictly above
//! the target). Both are evaluated against a snapshot captured at dispatch
//! time, never cached from manager construction — the actor's roles may have
//! changed since.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::entity::{Guild, Member, Role};
use crate::error::UpdateError;
use crate::permissions::Permissions;

// ---------------------------------------------------------------------------
// Global check toggle
// ---------------------------------------------------------------------------

static CHECKS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disable (or re-enable) every client-side permission and hierarchy check.
///
/// With checks disabled the gate always passes and validation is left to the
/// remote service. Meant for tests and trusted contexts.
pub fn set_permission_checks_enabled(enabled: bool) {
    CHECKS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether client-side checks are currently active.
pub fn permission_checks_enabled() -> bool {
    CHECKS_ENABLED.load(Ordering::Relaxed)
}

/// Serializes tests around the process-wide toggle: tests that flip it, and
/// tests that assert a check *fails*, take this lock so a concurrent flip
/// cannot let a should-fail check slip through.
#[cfg(test)]
pub(crate) fn checks_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The actor's effective capabilities and rank, captured at pre-flight time.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationSnapshot {
    pub permissions: Permissions,
    pub rank: i64,
    pub is_owner: bool,
}

impl AuthorizationSnapshot {
    /// Capture the actor's current guild-level standing.
    pub fn capture(guild: &Guild, actor: &Member) -> Self {
        Self {
            permissions: guild.member_permissions(actor),
            rank: guild.member_rank(actor),
            is_owner: actor.user_id == guild.owner_id,
        }
    }

    /// Capture with channel-specific permissions (overwrites applied).
    pub fn capture_for_channel(
        guild: &Guild,
        actor: &Member,
        channel: &crate::entity::Channel,
    ) -> Self {
        Self {
            permissions: guild.channel_permissions(actor, channel),
            rank: guild.member_rank(actor),
            is_owner: actor.user_id == guild.owner_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// The hierarchy-relevant target of a mutation, if it has one.
#[derive(Debug, Clone, Copy)]
pub enum HierarchyTarget<'a> {
    Role(&'a Role),
    Member(&'a Member),
    /// A member-targeting mutation the guild owner is exempt from (deafen,
    /// mute): even an actor who outranks everyone may not apply it to the
    /// owner.
    OwnerProtected(&'a Member),
}

/// Capability check: the actor must hold every bit in `required`.
pub fn check_capability(
    snapshot: &AuthorizationSnapshot,
    required: Permissions,
) -> Result<(), UpdateError> {
    if !permission_checks_enabled() {
        return Ok(());
    }
    if let Some(missing) = snapshot.permissions.first_missing(required) {
        warn!(missing = missing.name(), "dispatch aborted: missing capability");
        return Err(UpdateError::InsufficientCapability(missing));
    }
    Ok(())
}

/// Hierarchy check: the actor must rank strictly above the target.
pub fn check_hierarchy(
    guild: &Guild,
    actor: &Member,
    target: HierarchyTarget<'_>,
) -> Result<(), UpdateError> {
    if !permission_checks_enabled() {
        return Ok(());
    }
    let ok = match target {
        HierarchyTarget::Role(role) => guild.can_interact_with_role(actor, role),
        HierarchyTarget::Member(member) => {
            actor.user_id == member.user_id || guild.can_interact_with_member(actor, member)
        }
        HierarchyTarget::OwnerProtected(member) => {
            member.user_id != guild.owner_id
                && (actor.user_id == member.user_id
                    || guild.can_interact_with_member(actor, member))
        }
    };
    if ok {
        Ok(())
    } else {
        let what = match target {
            HierarchyTarget::Role(role) => format!("role '{}' is not below you", role.name),
            HierarchyTarget::Member(m) => format!("member {} is not below you", m.user_id),
            HierarchyTarget::OwnerProtected(m) => {
                if m.user_id == guild.owner_id {
                    "cannot apply this to the guild owner".to_string()
                } else {
                    format!("member {} is not below you", m.user_id)
                }
            }
        };
        warn!(reason = %what, "dispatch aborted: hierarchy violation");
        Err(UpdateError::HierarchyViolation(what))
    }
}

/// Escalation check for permission-granting mutations: the actor may only
/// grant bits it currently holds. Checked bit-by-bit; the first missing bit
/// is reported.
pub fn check_grant(
    snapshot: &AuthorizationSnapshot,
    granted: Permissions,
) -> Result<(), UpdateError> {
    if !permission_checks_enabled() {
        return Ok(());
    }
    if snapshot.permissions.contains(Permissions::ADMINISTRATOR) {
        return Ok(());
    }
    if let Some(missing) = snapshot.permissions.first_missing(granted) {
        warn!(missing = missing.name(), "dispatch aborted: cannot grant unheld permission");
        return Err(UpdateError::InsufficientCapability(missing));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
