//! scrip-core: shared entity model for the withdrawal key redemption engine
//!
//! one canonical typed record per entity; duck-typed payloads from the
//! issuance service or imported files pass through [`normalize`] exactly
//! once at the boundary

pub mod canonical;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod types;

pub use canonical::canonical_json;
pub use error::{RedeemError, Result};
pub use registry::{ChainEntry, ChainRegistry};
pub use types::*;

/// seconds since unix epoch
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
