//! State types

use solana_program::clock::{DEFAULT_TICKS_PER_SECOND, DEFAULT_TICKS_PER_SLOT, SECONDS_PER_DAY};

pub mod amount;
pub mod bid;
pub mod last_update;
pub mod market;
pub mod obligation;
pub mod price_feed;
pub mod reserve;

pub const SLOTS_PER_DAY: u64 = DEFAULT_TICKS_PER_SECOND / DEFAULT_TICKS_PER_SLOT * SECONDS_PER_DAY;

pub const SLOTS_PER_YEAR: u64 = SLOTS_PER_DAY * 365;

/// Longest period one RefreshReserve accrues interest for. Reserve which was not refreshed for
/// longer needs several refreshes to become current.
pub const MAX_ACCRUAL_SLOTS: u64 = SLOTS_PER_DAY * 7;

pub const MARKET_DISCRIMINATOR: &[u8; 8] = b"MARKET__";
pub const RESERVE_DISCRIMINATOR: &[u8; 8] = b"RESERVE_";
pub const OBLIGATION_DISCRIMINATOR: &[u8; 8] = b"OBLIGATN";
pub const BID_DISCRIMINATOR: &[u8; 8] = b"BID_____";
pub const PRICE_FEED_DISCRIMINATOR: &[u8; 8] = b"PRICEFD_";
