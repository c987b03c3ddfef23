//! Lenticular Sync - job state synchronization for Lenticular Lens
//!
//! Keeps a locally edited alignment job consistent with the server copy:
//! - Domain stores for entity type selections, linkset specs, lens specs
//!   and views, with the views kept in step with the other three
//! - A three-way merge that folds server pushes into unsaved local edits
//! - Two-phase save with rollback on failure
//! - Socket.IO channels for the open job and for global dataset events,
//!   backed by a query cache for the read-only status collections

pub mod api;
pub mod cache;
pub mod config;
pub mod identity;
pub mod model;
pub mod session;
pub mod specs;
pub mod store;
pub mod sync;
pub mod transport;

pub use api::{ApiError, JobApi, JobSource, ReferenceSource, SaveOutcome};
pub use cache::{QueryCache, ReferenceData};
pub use config::{CacheConfig, ClientConfig};
pub use session::JobSession;
pub use store::{JobStores, SpecStore};
pub use sync::{merge_specs, SyncEngine, SyncError, SyncOutcome};
pub use transport::{ActiveJob, TransportError};
