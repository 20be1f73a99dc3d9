use bytemuck::{Pod, Zeroable};
use solana_program::clock::Slot;
use solana_program::msg;
use solana_program::pubkey::Pubkey;

use crate::account::PodAccount;
use crate::error::NftLendyError;
use crate::state::BID_DISCRIMINATOR;
use crate::LendyResult;

static_assertions::const_assert_eq!(Bid::SIZE, std::mem::size_of::<Bid>());
static_assertions::const_assert_eq!(0, std::mem::size_of::<Bid>() % 8);

/// Standing offer to buy liquidated NFT collateral for tokens locked in escrow
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Bid {
    pub discriminator: [u8; 8],
    pub version: u8,

    /// Vacant to store mode/status flags
    pub _flags: [u8; 7],

    pub market: Pubkey,
    pub bidder: Pubkey,
    /// Token the bid pays with. Must be the token of the liquidated loan's reserve.
    pub bid_mint: Pubkey,
    /// Token account holding escrowed funds
    pub bid_escrow: Pubkey,
    /// PDA owning `bid_escrow`
    pub bid_escrow_authority: Pubkey,

    /// Max total amount which can still be drawn from the escrow
    pub bid_limit: u64,
    /// Tokens in the escrow as accounted by the program
    pub escrow_balance: u64,
    pub last_updated: Slot,

    pub authority_bump: u8,
    pub _padding0: [u8; 7],

    pub _padding: [u8; 48],
}

#[derive(Debug, Clone, Copy)]
pub struct BidParams {
    pub market: Pubkey,
    pub bidder: Pubkey,
    pub bid_mint: Pubkey,
    pub bid_escrow: Pubkey,
    pub bid_escrow_authority: Pubkey,
    pub authority_bump: u8,
    pub bid_limit: u64,
    pub escrow_balance: u64,
}

impl PodAccount for Bid {
    const DISCRIMINATOR: &'static [u8; 8] = BID_DISCRIMINATOR;

    const VERSION: u8 = 1;

    type InitParams = (BidParams, /*slot:*/ Slot);

    fn discriminator(&self) -> &[u8] {
        &self.discriminator
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn init_unchecked(&mut self, (params, slot): Self::InitParams) {
        self.discriminator = *BID_DISCRIMINATOR;
        self.version = Self::VERSION;
        self.market = params.market;
        self.bidder = params.bidder;
        self.bid_mint = params.bid_mint;
        self.bid_escrow = params.bid_escrow;
        self.bid_escrow_authority = params.bid_escrow_authority;
        self.authority_bump = params.authority_bump;
        self.bid_limit = params.bid_limit;
        self.escrow_balance = params.escrow_balance;
        self.last_updated = slot;
    }
}

impl BidParams {
    pub fn validate(&self) -> LendyResult<()> {
        if self.escrow_balance == 0 || self.escrow_balance > self.bid_limit {
            msg!(
                "escrow deposit {} must be in range (0, bid_limit {}]",
                self.escrow_balance,
                self.bid_limit
            );
            return Err(NftLendyError::InvalidAmount);
        }
        Ok(())
    }
}

impl Bid {
    /// Most the bid can pay right now
    pub fn available(&self) -> u64 {
        self.bid_limit.min(self.escrow_balance)
    }

    pub fn is_drained(&self) -> bool {
        self.escrow_balance == 0
    }

    pub fn verify_bidder(&self, signer: &Pubkey) -> LendyResult<()> {
        if self.bidder != *signer {
            msg!("{} is not the bidder {}", signer, self.bidder);
            return Err(NftLendyError::InvalidAuthority);
        }
        Ok(())
    }

    /// Adds funds to the escrow raising the limit by the same amount
    pub fn increase(&mut self, amount: u64, slot: Slot) -> LendyResult<()> {
        if amount == 0 {
            msg!("bid increase can not be zero");
            return Err(NftLendyError::InvalidAmount);
        }

        self.escrow_balance = self.escrow_balance.checked_add(amount).ok_or_else(|| {
            NftLendyError::ArithmeticError(format!(
                "increase(): escrow_balance {} + {}",
                self.escrow_balance, amount
            ))
        })?;
        self.bid_limit = self.bid_limit.checked_add(amount).ok_or_else(|| {
            NftLendyError::ArithmeticError(format!(
                "increase(): bid_limit {} + {}",
                self.bid_limit, amount
            ))
        })?;
        self.last_updated = slot;

        Ok(())
    }

    /// Takes `amount` out of the escrow for a liquidation
    pub fn draw(&mut self, amount: u64, slot: Slot) -> LendyResult<()> {
        if amount > self.available() {
            msg!(
                "can't draw {} from bid. Limit {}, escrow {}",
                amount,
                self.bid_limit,
                self.escrow_balance
            );
            return Err(NftLendyError::LiquidationLowCollateral);
        }

        self.escrow_balance -= amount;
        self.bid_limit -= amount;
        self.last_updated = slot;

        Ok(())
    }
}
