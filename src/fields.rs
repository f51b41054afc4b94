//! Field keys, dirty tracking, and the declarative field-descriptor table.
//!
//! Every mutable property of an entity gets one [`FieldKey`]: a bit position
//! (unique within the entity type, at most 64 per type) plus a wire name.
//! A manager's behaviour is then data: a static slice of [`FieldDescriptor`]s
//! drives validation, dirty tracking, and diff encoding, instead of a
//! subclass per field.

use std::ops::BitOr;

use crate::buffer::StagedValue;

// ---------------------------------------------------------------------------
// FieldKey / FieldMask
// ---------------------------------------------------------------------------

/// A named bit position identifying one mutable field of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKey {
    bit: u8,
    name: &'static str,
}

impl FieldKey {
    /// `bit` must be unique within the entity type and below 64.
    pub const fn new(bit: u8, name: &'static str) -> Self {
        assert!(bit < 64, "field bit out of range");
        Self { bit, name }
    }

    pub const fn bit(self) -> u8 {
        self.bit
    }

    pub const fn name(self) -> &'static str {
        self.name
    }

    const fn mask_bits(self) -> u64 {
        1 << self.bit
    }
}

/// A combination of field keys, built with `|`, for batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMask(u64);

impl FieldMask {
    pub const EMPTY: FieldMask = FieldMask(0);

    pub const fn contains(self, key: FieldKey) -> bool {
        self.0 & key.mask_bits() != 0
    }
}

impl From<FieldKey> for FieldMask {
    fn from(key: FieldKey) -> Self {
        FieldMask(key.mask_bits())
    }
}

impl BitOr for FieldKey {
    type Output = FieldMask;

    fn bitor(self, rhs: FieldKey) -> FieldMask {
        FieldMask(self.mask_bits() | rhs.mask_bits())
    }
}

impl BitOr<FieldKey> for FieldMask {
    type Output = FieldMask;

    fn bitor(self, rhs: FieldKey) -> FieldMask {
        FieldMask(self.0 | rhs.mask_bits())
    }
}

impl BitOr for FieldMask {
    type Output = FieldMask;

    fn bitor(self, rhs: FieldMask) -> FieldMask {
        FieldMask(self.0 | rhs.0)
    }
}

// ---------------------------------------------------------------------------
// DirtyFieldSet
// ---------------------------------------------------------------------------

/// Tracks which fields have staged edits.
///
/// Pure bit arithmetic: marking is idempotent, clearing bits that are not
/// set (or that fall outside the entity's declared fields) is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFieldSet {
    bits: u64,
}

impl DirtyFieldSet {
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    pub fn mark(&mut self, key: FieldKey) {
        self.bits |= key.mask_bits();
    }

    pub fn clear(&mut self, key: FieldKey) {
        self.bits &= !key.mask_bits();
    }

    /// Clear every field in `mask` in one call.
    pub fn reset(&mut self, mask: FieldMask) {
        self.bits &= !mask.0;
    }

    pub fn clear_all(&mut self) {
        self.bits = 0;
    }

    pub const fn is_dirty(self, key: FieldKey) -> bool {
        self.bits & key.mask_bits() != 0
    }

    /// Whether any field is dirty — drives the no-op short-circuit.
    pub const fn any(self) -> bool {
        self.bits != 0
    }
}

// ---------------------------------------------------------------------------
// Field descriptors
// ---------------------------------------------------------------------------

/// How a staged value is rendered into the wire payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Plain scalar (string, integer, boolean).
    Scalar,
    /// Optional string where an absent staged value encodes as JSON `null`
    /// (the removal sentinel).
    NullableText,
    /// Binary image encoded as a base64 data URI, `null` to remove.
    IconData,
    /// Collection projected to a list of snowflake strings.
    IdList,
    /// Permission overwrites as `{id, type, allow, deny}` objects.
    Overwrites,
}

/// Static metadata for one mutable field.
pub struct FieldDescriptor {
    pub key: FieldKey,
    /// JSON key in the PATCH body.
    pub wire_name: &'static str,
    /// Whether the remote API expects this field even when unchanged. The
    /// diff pre-populates required fields from the live entity before dirty
    /// values overwrite them.
    pub required: bool,
    /// Whether the original live value can be cheaply read back. Reading an
    /// un-staged field without this fails with `UnsupportedOperation` rather
    /// than returning a misleading `None`.
    pub readback: bool,
    pub validate: fn(&StagedValue) -> Result<(), String>,
    pub encoding: Encoding,
}

impl FieldDescriptor {
    /// Accept anything; for fields whose constraints need context a setter
    /// cannot encode in a plain value check.
    pub fn accept_any(_: &StagedValue) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
