//! Type-safe identifiers.
//!
//! Newtype wrappers keep browser tab ids, protocol request ids and
//! operation ids from being mixed up.
//!
//! | Type | Inner | Source |
//! |------|-------|--------|
//! | [`TabId`] | `NonZeroU32` | Browser tab API |
//! | [`RequestId`] | `Uuid` | Generated per request |
//! | [`OperationId`] | `Uuid` | Generated per refresh operation |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ============================================================================
// TabId
// ============================================================================

/// Identifier of a browser tab.
///
/// Browsers use `-1` (`TAB_ID_NONE`) or omit the id for tabs that cannot be
/// addressed, so only positive ids are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(NonZeroU32);

impl TabId {
    /// Creates a tab id, returning `None` for zero.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Option<Self> {
        match NonZeroU32::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Creates a tab id from a raw wire value.
    ///
    /// Returns `None` for zero, negative or out-of-range values.
    #[inline]
    #[must_use]
    pub fn from_wire(id: i64) -> Option<Self> {
        u32::try_from(id).ok().and_then(Self::new)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TabId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.get())
    }
}

impl<'de> Deserialize<'de> for TabId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::from_wire(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid tab id: {raw}")))
    }
}

// ============================================================================
// RequestId
// ============================================================================

/// Correlates a protocol request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The id carried by the extension's handshake message.
    #[inline]
    #[must_use]
    pub const fn handshake() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the handshake id.
    #[inline]
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// OperationId
// ============================================================================

/// Identifies one refresh operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
