//! Conviction oracle - tiered token scoring and API orchestration
//!
//! Scores newly discovered Solana tokens from free data sources, spends the
//! paid analysis budget only on the tokens that earn it, and tracks
//! bonding-curve progress toward graduation.

pub mod types;
pub mod oracle;

// Re-export main types for convenience
pub use types::{Pubkey, Timeframe, TokenCandidate};
