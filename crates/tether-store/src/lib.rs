pub mod error;
pub mod snapshot;
pub mod store;

pub use error::StoreError;
pub use snapshot::SessionSnapshot;
pub use store::{CleanupReport, SnapshotStore};
