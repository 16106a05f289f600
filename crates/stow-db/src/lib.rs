//! Embedded document store.
//!
//! [`Stow`] ties together a storage adapter, a middleware chain and an
//! in-memory index of committed item ids. New items are written through a
//! [`Change`] and published atomically on [`Change::commit`]:
//!
//! ```text
//! create()  ->  <id>.tmp + <id>.json   (write stream passes through middleware)
//! commit()  ->  <id>.tmp renamed to <id>, id added to the index
//! destroy() ->  <id>.tmp and <id>.json deleted
//! ```
//!
//! Committed items are looked up with [`Stow::get`], which returns an
//! [`Item`] handle carrying the item's metadata.

pub mod change;
pub mod config;
pub mod error;
pub mod idset;
pub mod iomanager;
pub mod item;
pub mod store;

pub use change::{Change, ChangeState};
pub use config::{StorageSource, StowConfig};
pub use error::{DbError, DbResult};
pub use idset::{IdCursor, IdSet};
pub use iomanager::IoManager;
pub use item::Item;
pub use store::Stow;

pub use stow_adapter::{ByteReader, ByteWriter, DirectoryAdapter, MemoryAdapter, StorageAdapter};
pub use stow_middleware::{Middleware, MiddlewareError, StreamTransform, Transformed};
pub use stow_types::{ItemId, Metadata, TransformOptions};
