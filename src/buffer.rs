//! The pending-change buffer: staged values keyed by field bit.
//!
//! A value lives in the buffer if and only if its dirty bit is set. Resets
//! remove the stored value as well as the bit, so a stale value from a
//! previous edit cycle can never leak into a later payload.

use std::collections::HashMap;

use tracing::debug;

use crate::entity::PermissionOverwrite;
use crate::error::UpdateError;
use crate::fields::{DirtyFieldSet, FieldDescriptor, FieldKey, FieldMask};
use crate::permissions::Permissions;

// ---------------------------------------------------------------------------
// Staged values
// ---------------------------------------------------------------------------

/// A binary icon staged for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedIcon {
    pub mime: &'static str,
    pub data: Vec<u8>,
}

impl StagedIcon {
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            mime: "image/png",
            data,
        }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            mime: "image/jpeg",
            data,
        }
    }
}

/// A staged new value for one field.
///
/// The type varies per field; the field's descriptor decides which variants
/// its validation accepts and how the value is encoded on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedValue {
    Text(String),
    /// Optional text where `None` means "explicitly remove" (wire `null`).
    MaybeText(Option<String>),
    Int(i64),
    UInt(u64),
    Bool(bool),
    /// `None` removes the icon.
    Icon(Option<StagedIcon>),
    Ids(Vec<u64>),
    Permissions(Permissions),
    Overwrites(Vec<PermissionOverwrite>),
}

impl StagedValue {
    /// The staged text, if this is a text variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StagedValue::Text(s) => Some(s),
            StagedValue::MaybeText(Some(s)) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PendingChangeBuffer
// ---------------------------------------------------------------------------

/// Staged edits for one entity, with bitmask dirty tracking.
#[derive(Debug, Default)]
pub struct PendingChangeBuffer {
    dirty: DirtyFieldSet,
    values: HashMap<u8, StagedValue>,
}

impl PendingChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and stage a value for `descriptor`'s field.
    ///
    /// On a validation failure nothing is staged: the dirty bit stays clear
    /// and any previously staged value for the field is untouched.
    pub fn stage(
        &mut self,
        descriptor: &FieldDescriptor,
        value: StagedValue,
    ) -> Result<(), UpdateError> {
        (descriptor.validate)(&value).map_err(|reason| UpdateError::Validation {
            field: descriptor.key.name(),
            reason,
        })?;
        debug!(field = descriptor.key.name(), "staged field edit");
        self.values.insert(descriptor.key.bit(), value);
        self.dirty.mark(descriptor.key);
        Ok(())
    }

    /// The staged value, if the field is dirty.
    pub fn staged(&self, key: FieldKey) -> Option<&StagedValue> {
        if self.dirty.is_dirty(key) {
            self.values.get(&key.bit())
        } else {
            None
        }
    }

    /// The staged value if dirty, otherwise the lazily-computed live value.
    ///
    /// The fallback is only invoked when the field is clean, which matters
    /// for fields whose live value is expensive to materialize.
    pub fn value_or_default<F>(&self, key: FieldKey, fallback: F) -> StagedValue
    where
        F: FnOnce() -> StagedValue,
    {
        match self.staged(key) {
            Some(v) => v.clone(),
            None => fallback(),
        }
    }

    /// Read the field's effective value: staged if dirty, otherwise the live
    /// value — but only when the descriptor declares the live value cheaply
    /// readable. Without `readback`, reading a clean field is a contract
    /// violation: callers must not mistake "not editing" for "explicit null".
    pub fn read_back<F>(
        &self,
        descriptor: &FieldDescriptor,
        live: F,
    ) -> Result<StagedValue, UpdateError>
    where
        F: FnOnce() -> StagedValue,
    {
        if let Some(v) = self.staged(descriptor.key) {
            return Ok(v.clone());
        }
        if descriptor.readback {
            Ok(live())
        } else {
            Err(UpdateError::UnsupportedOperation(descriptor.key.name()))
        }
    }

    /// Clear one field: both the dirty bit and the stored value.
    pub fn reset_field(&mut self, key: FieldKey) {
        self.dirty.clear(key);
        self.values.remove(&key.bit());
    }

    /// Clear every field in `mask`.
    pub fn reset(&mut self, mask: FieldMask) {
        self.dirty.reset(mask);
        // A value survives only while its dirty bit does.
        let dirty = self.dirty;
        self.values
            .retain(|bit, _| dirty.is_dirty(FieldKey::new(*bit, "")));
    }

    /// Revert to "nothing staged".
    pub fn reset_all(&mut self) {
        self.dirty.clear_all();
        self.values.clear();
    }

    pub fn is_dirty(&self, key: FieldKey) -> bool {
        self.dirty.is_dirty(key)
    }

    /// Whether any edit is pending.
    pub fn any(&self) -> bool {
        self.dirty.any()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
