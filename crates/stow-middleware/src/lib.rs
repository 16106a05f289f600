//! Middleware chain for Stow.
//!
//! Middleware sits between an item's raw storage stream and the caller. On
//! every read or write access the [`MiddlewareManager`] hands the stream and
//! the item's metadata to each registered middleware in turn; each one may
//! swap the stream for a wrapped version and may replace the metadata.
//!
//! A middleware opts into the read side, the write side, both or neither by
//! returning a [`StreamTransform`] from [`Middleware::readable`] and
//! [`Middleware::writable`].

pub mod error;
pub mod manager;
pub mod middleware;
pub mod transform;

pub use error::{MiddlewareError, MiddlewareResult};
pub use manager::MiddlewareManager;
pub use middleware::{Middleware, StreamTransform, Transformed};
pub use transform::TransformResult;
