//! Provisioning engine for the Depot dataset cache.
//!
//! Generic over the [`ContentStore`](depot_core::store::ContentStore),
//! [`MetadataLedger`](depot_core::store::MetadataLedger) and
//! [`DatasetFetcher`](depot_core::fetch::DatasetFetcher) it runs against, so
//! the same engine serves the filesystem backend in production and fakes in
//! tests.

pub mod archive;
pub mod engine;
pub mod maintenance;
pub mod progress;
pub mod session;
pub mod tabular;

pub use engine::{
  Engine, Flight, Origin, Outcome, ProvisionFailure, Provisioned, RetryPolicy, Stage,
};
pub use maintenance::Maintenance;
pub use progress::{ProgressChannel, SessionId, Subscription};
pub use session::{Coordinator, SessionSummary};
