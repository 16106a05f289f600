use std::borrow::Borrow;
use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Suffix of an item's in-flight content, before it is published.
pub const TEMPORARY_SUFFIX: &str = ".tmp";

/// Suffix of an item's metadata file.
pub const METADATA_SUFFIX: &str = ".json";

/// Number of random bytes in a generated identifier.
const ID_BYTES: usize = 16;

/// Identifier of a stored item.
///
/// Generated ids are 16 random bytes, hex-encoded (128 bits of entropy).
/// Ids read back from storage are taken verbatim, so an `ItemId` is otherwise
/// an opaque string.
///
/// For an id `X` up to three artifacts exist in storage:
///
/// ```text
/// X        published content
/// X.tmp    in-flight content, before publish
/// X.json   metadata (UTF-8 JSON object)
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the published content artifact.
    pub fn content_name(&self) -> String {
        self.0.clone()
    }

    /// Name of the in-flight content artifact.
    pub fn temporary_name(&self) -> String {
        format!("{}{TEMPORARY_SUFFIX}", self.0)
    }

    /// Name of the metadata artifact.
    pub fn metadata_name(&self) -> String {
        format!("{}{METADATA_SUFFIX}", self.0)
    }

    /// Consume the id, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Returns `true` if a storage listing entry names published content.
///
/// Any name containing one of the reserved suffixes is an in-flight or
/// metadata artifact and does not count as a committed item.
pub fn is_committed_name(name: &str) -> bool {
    !name.contains(TEMPORARY_SUFFIX) && !name.contains(METADATA_SUFFIX)
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ItemId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ItemId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
