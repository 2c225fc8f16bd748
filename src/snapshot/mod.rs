//! Snapshot aggregation.
//!
//! The [`SnapshotCoordinator`] runs the watchers, merges their latest slices
//! with [`assemble`] and publishes the result to a [`SnapshotStore`]. The
//! store swap is the only write readers ever contend with.

mod coordinator;
mod store;

pub use coordinator::{
    CoordinatorState, RefreshTrigger, SnapshotCoordinator, Slices, assemble, build_once,
};
pub use store::{Revision, SnapshotStore};
