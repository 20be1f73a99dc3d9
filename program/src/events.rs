//! Events emitted by the program into transaction log as base64 encoded borsh data.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::log::sol_log_data;
use solana_program::pubkey::Pubkey;

use crate::LendyResult;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum NftLendyEvent {
    ReserveRefreshed {
        reserve: Pubkey,
        slot: u64,
        /// `AccrualState` value
        accrual_state: u8,
        fee_notes: u64,
    },
    TokensDeposited {
        reserve: Pubkey,
        depositor: Pubkey,
        tokens: u64,
        notes: u64,
    },
    TokensWithdrawn {
        reserve: Pubkey,
        owner: Pubkey,
        tokens: u64,
        notes: u64,
    },
    CollateralDeposited {
        obligation: Pubkey,
        reserve: Pubkey,
        notes: u64,
    },
    CollateralWithdrawn {
        obligation: Pubkey,
        reserve: Pubkey,
        notes: u64,
    },
    NftDeposited {
        obligation: Pubkey,
        nft_mint: Pubkey,
    },
    NftWithdrawn {
        obligation: Pubkey,
        nft_mint: Pubkey,
    },
    Borrowed {
        obligation: Pubkey,
        reserve: Pubkey,
        tokens: u64,
        fee: u64,
        notes: u64,
    },
    Repaid {
        obligation: Pubkey,
        reserve: Pubkey,
        tokens: u64,
        notes: u64,
    },
    BidPlaced {
        bid: Pubkey,
        bidder: Pubkey,
        bid_limit: u64,
        escrow_balance: u64,
    },
    BidIncreased {
        bid: Pubkey,
        amount: u64,
    },
    BidRevoked {
        bid: Pubkey,
        returned: u64,
    },
    LiquidatedByBid {
        obligation: Pubkey,
        bid: Pubkey,
        nft_mint: Pubkey,
        drawn: u64,
        repaid: u64,
        fee: u64,
        leftover: u64,
        settled_notes: u64,
    },
    LiquidatedSolvent {
        obligation: Pubkey,
        reserve: Pubkey,
        nft_mint: Pubkey,
        written_off_notes: u64,
    },
    NftClaimedSolvent {
        obligation: Pubkey,
        nft_mint: Pubkey,
    },
}

impl NftLendyEvent {
    pub fn log(&self) -> LendyResult<()> {
        let data = borsh::to_vec(self)?;
        sol_log_data(&[&data]);
        Ok(())
    }
}
