//! Storage node bookkeeping and replica placement.
//!
//! [`NodeDirectory`] tracks the nodes that contribute storage, their
//! capacity and the blocks each one holds. The placer picks which nodes hold
//! a mined block and repairs placements when a node leaves. Both live behind
//! one lock in [`ReplicationRegistry`] so a node's held set and the
//! placement table never disagree.

pub mod directory;
pub mod placer;
pub mod registry;

pub use directory::{NodeDirectory, StorageNode, StorageSummary};
pub use placer::{place, redistribute, PlacementTable};
pub use registry::{ReplicationRegistry, DEFAULT_REPLICATION_FACTOR};
