//! Named-blob storage adapters for Stow.
//!
//! An adapter is the only collaborator that touches real storage. It knows
//! nothing about items, metadata or middleware: it stores opaque bytes under
//! flat names and offers streaming and whole-file access to them.
//!
//! # Storage Backends
//!
//! All backends implement the [`StorageAdapter`] trait:
//!
//! - [`MemoryAdapter`] -- volatile map-based store for tests and embedding
//! - [`DirectoryAdapter`] -- one directory on the local file system
//!
//! # Design Rules
//!
//! 1. Names are flat: no path separators, no `.` or `..`.
//! 2. Opening a write stream creates the file immediately.
//! 3. Deleting or reading a missing name is a distinguishable not-found error.
//! 4. `init` is idempotent and `list_files` on uninitialized storage is empty.

pub mod directory;
pub mod error;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use directory::DirectoryAdapter;
pub use error::{AdapterError, AdapterResult};
pub use memory::MemoryAdapter;
pub use traits::{ByteReader, ByteWriter, StorageAdapter};
