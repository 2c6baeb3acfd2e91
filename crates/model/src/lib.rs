//! Serializable types exchanged between the settlement engine and the
//! request-handling layer that fronts it. The field names of
//! [`settlement::SettlementRecord`] are the public API surface and must not
//! change without coordinating with API consumers.

pub mod auction;
pub mod settlement;

pub use {
    auction::AuctionRequest,
    settlement::{AllocationReport, ExcludedAsset, SellerPayout, SettlementRecord},
};
