//! Domain model for Depot: checksums, date windows, version records, the
//! session wire format, and the storage and fetch seams the engine is
//! written against.
//!
//! Nothing here touches HTTP or the filesystem; backends and front ends plug
//! in from the other crates.

pub mod catalog;
pub mod checksum;
pub mod dataset;
pub mod error;
pub mod event;
pub mod fetch;
pub mod store;
pub mod window;

pub use checksum::Checksum;
pub use error::{Error, ErrorKind, Result};
