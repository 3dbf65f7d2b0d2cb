//! Wire constants shared by every socket role.

/// Default routing tag width in bytes.
pub const DEFAULT_TAG_WIDTH: usize = 8;

/// Tags are derived from a 64-bit hash, so nothing wider carries information.
pub const MAX_TAG_WIDTH: usize = 8;

/// FNV-1a 64-bit offset basis.
pub(crate) const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub(crate) const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
