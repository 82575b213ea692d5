//! Filesystem backend for the Depot dataset cache.
//!
//! Everything lives under one data directory:
//!
//! ```text
//! <data_dir>
//! ├── archived/<checksum>.zip
//! ├── extracted/<checksum>.csv
//! ├── metadata/<remote_id>.json
//! └── tmp/                       staging for atomic promotion
//! ```

mod content;
mod layout;
mod ledger;

pub mod error;

pub use content::{FsContentStore, Staged};
pub use error::{Error, Result};
pub use layout::Layout;
pub use ledger::JsonLedger;

#[cfg(test)]
mod tests;
