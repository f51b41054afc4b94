//! Allow/deny permission overwrite batches.
//!
//! A permission bit can never be simultaneously allowed and denied: granting
//! removes the bit from the deny mask and vice versa, and clearing removes it
//! from both. The last writer within one batch wins.

use std::sync::Mutex;

use crate::entity::{OverwriteType, PermissionOverwrite};
use crate::id::{GenericMarker, Id};
use crate::permissions::Permissions;

// ---------------------------------------------------------------------------
// OverwriteBatch
// ---------------------------------------------------------------------------

/// The allow/deny masks being built for one overwrite target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverwriteBatch {
    allow: Permissions,
    deny: Permissions,
}

impl OverwriteBatch {
    pub const fn new() -> Self {
        Self {
            allow: Permissions::empty(),
            deny: Permissions::empty(),
        }
    }

    /// Start from an existing overwrite's live masks.
    pub fn from_existing(existing: &PermissionOverwrite) -> Self {
        Self {
            allow: existing.allow,
            deny: existing.deny,
        }
    }

    /// Allow `perms`, removing them from the deny mask.
    pub fn grant(&mut self, perms: Permissions) -> &mut Self {
        self.allow |= perms;
        self.deny &= !perms;
        self
    }

    /// Deny `perms`, removing them from the allow mask.
    pub fn deny(&mut self, perms: Permissions) -> &mut Self {
        self.deny |= perms;
        self.allow &= !perms;
        self
    }

    /// Clear `perms` from both masks (inherit from the parent).
    pub fn clear(&mut self, perms: Permissions) -> &mut Self {
        self.allow &= !perms;
        self.deny &= !perms;
        self
    }

    pub const fn allowed(self) -> Permissions {
        self.allow
    }

    pub const fn denied(self) -> Permissions {
        self.deny
    }
}

// ---------------------------------------------------------------------------
// StagedOverwrites
// ---------------------------------------------------------------------------

/// Overwrite additions and removals staged on a channel manager.
///
/// The lists are read-modify-written from several call sites (setters, diff
/// build, reset), so they sit behind a mutex even though a manager is not
/// meant to be shared across threads.
#[derive(Debug, Default)]
pub struct StagedOverwrites {
    inner: Mutex<StagedOverwritesInner>,
}

#[derive(Debug, Default)]
struct StagedOverwritesInner {
    added: Vec<PermissionOverwrite>,
    removed: Vec<Id<GenericMarker>>,
}

impl StagedOverwrites {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StagedOverwritesInner> {
        // A poisoned lock means a panic mid-mutation; the staged lists are
        // plain Vecs, so the data is still coherent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stage an overwrite for `target`, replacing any previously staged one
    /// for the same target and cancelling a staged removal.
    pub fn put(&self, target: Id<GenericMarker>, kind: OverwriteType, batch: OverwriteBatch) {
        let mut inner = self.lock();
        inner.removed.retain(|id| *id != target);
        inner.added.retain(|o| o.id != target);
        inner.added.push(PermissionOverwrite {
            id: target,
            kind,
            allow: batch.allowed(),
            deny: batch.denied(),
        });
    }

    /// Stage the removal of `target`'s overwrite, cancelling a staged add.
    pub fn remove(&self, target: Id<GenericMarker>) {
        let mut inner = self.lock();
        inner.added.retain(|o| o.id != target);
        if !inner.removed.contains(&target) {
            inner.removed.push(target);
        }
    }

    /// Whether anything is staged.
    pub fn any(&self) -> bool {
        let inner = self.lock();
        !inner.added.is_empty() || !inner.removed.is_empty()
    }

    /// Apply the staged changes on top of the live overwrite list.
    pub fn apply_to(&self, live: &[PermissionOverwrite]) -> Vec<PermissionOverwrite> {
        let inner = self.lock();
        let mut result: Vec<PermissionOverwrite> = live
            .iter()
            .filter(|o| !inner.removed.contains(&o.id))
            .filter(|o| inner.added.iter().all(|a| a.id != o.id))
            .cloned()
            .collect();
        result.extend(inner.added.iter().cloned());
        result
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.added.clear();
        inner.removed.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
