//! Item metadata and middleware options.
//!
//! Both are open-ended JSON objects. No schema is enforced: middleware may
//! read and rewrite metadata freely, and options are forwarded to middleware
//! untouched.

use serde_json::{Map, Value};

/// Metadata attached to an item, persisted as `<id>.json`.
pub type Metadata = Map<String, Value>;

/// Caller-supplied options passed through to every middleware transform.
pub type TransformOptions = Map<String, Value>;
