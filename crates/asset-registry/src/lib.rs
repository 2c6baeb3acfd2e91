//! Append-only registry of seller assets.
//!
//! Registrations never mutate existing entries: every upload produces a new
//! [`asset::Asset`] under a fresh id, and the registry publishes immutable
//! [`registry::Snapshot`]s with a monotonically increasing version. An
//! in-flight auction holds one snapshot for its whole lifetime and is
//! therefore never affected by concurrent registrations.

pub mod asset;
pub mod registry;

pub use {
    asset::{Asset, AssetData, AssetId, Digest, SellerId, TaskType},
    registry::{Registry, Snapshot, UnknownAsset},
};
