use bitflags::bitflags;
use borsh::{BorshDeserialize, BorshSerialize};
use bytemuck::{Pod, Zeroable};
use solana_program::msg;
use solana_program::pubkey::Pubkey;

use crate::account::PodAccount;
use crate::error::NftLendyError;
use crate::state::MARKET_DISCRIMINATOR;
use crate::LendyResult;

pub const MAX_RESERVES: usize = 32;
pub const QUOTE_CURRENCY_MAX_LEN: usize = 16;

static_assertions::const_assert_eq!(Market::SIZE, std::mem::size_of::<Market>());
static_assertions::const_assert_eq!(0, std::mem::size_of::<Market>() % 8);
static_assertions::const_assert!(MAX_RESERVES <= u64::BITS as usize);

bitflags! {
    /// Per instruction family halt switches
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MarketFlags: u64 {
        const HALT_DEPOSITS     = 0b0000_0001;
        const HALT_WITHDRAWALS  = 0b0000_0010;
        const HALT_BORROWS      = 0b0000_0100;
        const HALT_REPAYS       = 0b0000_1000;
        const HALT_LIQUIDATIONS = 0b0001_0000;
        const HALT_BIDS         = 0b0010_0000;
    }
}

/// Lending market for one NFT collection. Groups Reserves which lend against NFTs of that collection.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Market {
    pub discriminator: [u8; 8],
    pub version: u8,

    /// Decimal exponent of the quote currency prices are expressed in
    pub quote_exponent: i8,

    /// Vacant to store mode/status flags
    pub _flags: [u8; 6],

    /// `MarketFlags` bits
    pub flags: u64,

    /// Bitmap of occupied `reserves` slots
    pub reserves_used: u64,

    /// Authority which can change the market and its reserves
    pub owner: Pubkey,

    /// Authority allowed to execute liquidations, both via bids and directly from reserve liquidity
    pub executor: Pubkey,

    /// Verified creator all collateral NFTs must be signed by
    pub nft_collection_creator: Pubkey,

    /// Human-readable symbol of the currency used to express prices and values
    pub quote_currency: [u8; QUOTE_CURRENCY_MAX_LEN],

    /// Reserve addresses by their index
    pub reserves: [Pubkey; MAX_RESERVES],

    pub _padding: [u8; 30 * 8],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq)]
pub struct MarketParams {
    pub quote_currency: [u8; QUOTE_CURRENCY_MAX_LEN],
    pub quote_exponent: i8,
    pub nft_collection_creator: Pubkey,
    pub executor: Pubkey,
    pub flags: u64,
}

impl MarketParams {
    pub fn validate(&self) -> LendyResult<()> {
        if MarketFlags::from_bits(self.flags).is_none() {
            msg!("unknown market flags {:#b}", self.flags);
            return Err(NftLendyError::InvalidConfig);
        }

        if self.nft_collection_creator == Pubkey::default() {
            msg!("nft_collection_creator must be set");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.executor == Pubkey::default() {
            msg!("executor must be set");
            return Err(NftLendyError::InvalidConfig);
        }

        Ok(())
    }
}

impl PodAccount for Market {
    const DISCRIMINATOR: &'static [u8; 8] = MARKET_DISCRIMINATOR;

    const VERSION: u8 = 1;

    type InitParams = (/*params:*/ MarketParams, /*owner:*/ Pubkey);

    fn discriminator(&self) -> &[u8] {
        &self.discriminator
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn init_unchecked(&mut self, (params, owner): Self::InitParams) {
        self.discriminator = *MARKET_DISCRIMINATOR;
        self.version = Self::VERSION;
        self.owner = owner;
        self.apply_params(&params);
    }
}

impl Market {
    pub fn apply_params(&mut self, params: &MarketParams) {
        self.quote_currency = params.quote_currency;
        self.quote_exponent = params.quote_exponent;
        self.nft_collection_creator = params.nft_collection_creator;
        self.executor = params.executor;
        self.flags = params.flags;
    }

    pub fn flags(&self) -> MarketFlags {
        MarketFlags::from_bits_truncate(self.flags)
    }

    pub fn ensure_not_halted(&self, flag: MarketFlags) -> LendyResult<()> {
        if self.flags().intersects(flag) {
            msg!("market operations {:?} are halted", flag);
            return Err(NftLendyError::MarketHalted);
        }
        Ok(())
    }

    /// Occupies first free reserve slot and returns its index
    pub fn register_reserve(&mut self, reserve: Pubkey) -> LendyResult<u8> {
        let index = (0..MAX_RESERVES)
            .find(|index| self.reserves_used & (1 << index) == 0)
            .ok_or_else(|| {
                msg!("all {} reserve slots are taken", MAX_RESERVES);
                NftLendyError::NoFreeReserves
            })?;

        self.reserves_used |= 1 << index;
        self.reserves[index] = reserve;

        Ok(index as u8)
    }

    /// Checks that the `reserve` occupies slot `index` of this market
    pub fn is_registered(&self, reserve: &Pubkey, index: u8) -> bool {
        let index = index as usize;
        index < MAX_RESERVES
            && self.reserves_used & (1 << index) != 0
            && self.reserves[index] == *reserve
    }

    pub fn reserves_count(&self) -> u32 {
        self.reserves_used.count_ones()
    }
}
