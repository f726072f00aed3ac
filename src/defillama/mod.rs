//! DefiLlama Integration
//!
//! Total-value-locked data for DeFi protocols and chains. No credentials.
//!
//! # API Endpoints Used
//!
//! - `GET /protocols` - All protocols with current TVL
//! - `GET /protocol/{slug}` - Historical TVL of one protocol
//! - `GET /tvl/{slug}` - Current TVL as a bare number
//! - `GET /charts` - Total DeFi TVL history
//! - `GET /charts/{chain}` - TVL history of one chain
//! - `GET /chains` - Current TVL of every chain

pub mod client;
pub mod models;

pub use client::{protocol_history, tvl_table, DefiLlamaClient};
pub use models::{ProtocolHistory, TvlPoint};
