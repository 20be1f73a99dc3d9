use bytemuck::{Pod, Zeroable};
use solana_program::clock::Slot;
use solana_program::pubkey::Pubkey;

use crate::account::PodAccount;
use crate::collaborators::OraclePrice;
use crate::math::Decimal;
use crate::state::PRICE_FEED_DISCRIMINATOR;
use crate::LendyResult;

static_assertions::const_assert_eq!(PriceFeed::SIZE, std::mem::size_of::<PriceFeed>());
static_assertions::const_assert_eq!(0, std::mem::size_of::<PriceFeed>() % 16);

/// Price written by the price proxy program. Reserves read their token price and collection
/// floor price from such accounts.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct PriceFeed {
    pub discriminator: [u8; 8],
    pub version: u8,
    pub _flags: [u8; 7],

    /// Publisher allowed to write the price
    pub authority: Pubkey,

    /// Price in quote currency. WAD
    pub price: i128,
    /// Confidence interval of `price`. WAD
    pub confidence: i128,

    pub update_slot: Slot,
    pub update_timestamp: i64,

    pub _padding: [u8; 64],
}

#[derive(Debug, Clone, Copy)]
pub struct PriceFeedParams {
    pub authority: Pubkey,
    pub price: Decimal,
    pub confidence: Decimal,
    pub update_slot: Slot,
    pub update_timestamp: i64,
}

impl PodAccount for PriceFeed {
    const DISCRIMINATOR: &'static [u8; 8] = PRICE_FEED_DISCRIMINATOR;

    const VERSION: u8 = 1;

    type InitParams = PriceFeedParams;

    fn discriminator(&self) -> &[u8] {
        &self.discriminator
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn init_unchecked(&mut self, params: Self::InitParams) {
        self.discriminator = *PRICE_FEED_DISCRIMINATOR;
        self.version = Self::VERSION;
        self.authority = params.authority;
        // Values out of i128 range are stored as zero price which no reserve accepts
        self.price = params.price.into_bits().unwrap_or_default();
        self.confidence = params.confidence.into_bits().unwrap_or_default();
        self.update_slot = params.update_slot;
        self.update_timestamp = params.update_timestamp;
    }
}

impl PriceFeed {
    pub fn oracle_price(&self) -> LendyResult<OraclePrice> {
        Ok(OraclePrice {
            price: Decimal::from_bits(self.price)?,
            confidence: Decimal::from_bits(self.confidence)?,
            publish_slot: self.update_slot,
        })
    }
}
