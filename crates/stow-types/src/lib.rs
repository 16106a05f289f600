//! Foundation types for Stow.
//!
//! Stow is an embedded document store: callers stream bytes into a pending
//! change, the bytes pass through a middleware chain, and the result is
//! published atomically under a freshly generated identifier. This crate holds
//! the types every other Stow crate shares.
//!
//! # Key Types
//!
//! - [`ItemId`] -- Random 128-bit identifier, hex-encoded, plus the artifact
//!   names derived from it
//! - [`Metadata`] -- Open-ended JSON object attached to every item
//! - [`TransformOptions`] -- Caller-supplied options forwarded to middleware

pub mod id;
pub mod metadata;

pub use id::{is_committed_name, ItemId, METADATA_SUFFIX, TEMPORARY_SUFFIX};
pub use metadata::{Metadata, TransformOptions};
