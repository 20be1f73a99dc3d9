//! Helper functions for finding derived addresses to entities.
use solana_program::pubkey::Pubkey;

use crate::NFT_LENDY_ID;

pub const MARKET_AUTHORITY_SEED: &[u8] = b"MARKET_AUTHORITY";
pub const OBLIGATION_SEED: &[u8] = b"OBLIGATION";
pub const NFT_COLLATERAL_SEED: &[u8] = b"NFT_COLLATERAL";
pub const NOTE_COLLATERAL_SEED: &[u8] = b"NOTE_COLLATERAL";
pub const LOAN_SEED: &[u8] = b"LOAN";
pub const BID_SEED: &[u8] = b"BID";
pub const BID_ESCROW_SEED: &[u8] = b"BID_ESCROW";
pub const BID_ESCROW_AUTHORITY_SEED: &[u8] = b"BID_ESCROW_AUTHORITY";

pub const METADATA_SEED: &[u8] = b"metadata";
pub const EDITION_SEED: &[u8] = b"edition";
pub const TOKEN_RECORD_SEED: &[u8] = b"token_record";

/// Market authority owns every token wallet the market custodies: reserve vaults, fee vaults,
/// NFT collateral vaults, collateral and loan note accounts.
pub fn find_market_authority(market: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[market.as_ref(), MARKET_AUTHORITY_SEED], &NFT_LENDY_ID)
}

/// One obligation per borrower per market
pub fn find_obligation(market: &Pubkey, owner: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[market.as_ref(), owner.as_ref(), OBLIGATION_SEED],
        &NFT_LENDY_ID,
    )
}

/// Token wallet which locks one deposited NFT
pub fn find_nft_collateral_vault(obligation: &Pubkey, nft_mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[obligation.as_ref(), nft_mint.as_ref(), NFT_COLLATERAL_SEED],
        &NFT_LENDY_ID,
    )
}

/// Token wallet which locks deposit notes of the `reserve` used as collateral
pub fn find_note_collateral_account(reserve: &Pubkey, obligation: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[reserve.as_ref(), obligation.as_ref(), NOTE_COLLATERAL_SEED],
        &NFT_LENDY_ID,
    )
}

/// Token wallet which holds loan notes of the obligation's loan
pub fn find_loan_account(reserve: &Pubkey, obligation: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[reserve.as_ref(), obligation.as_ref(), LOAN_SEED],
        &NFT_LENDY_ID,
    )
}

pub fn find_bid(market: &Pubkey, bidder: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[market.as_ref(), bidder.as_ref(), BID_SEED],
        &NFT_LENDY_ID,
    )
}

pub fn find_bid_escrow(bid: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[bid.as_ref(), BID_ESCROW_SEED], &NFT_LENDY_ID)
}

pub fn find_bid_escrow_authority(bid: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[bid.as_ref(), BID_ESCROW_AUTHORITY_SEED], &NFT_LENDY_ID)
}

/// Metaplex metadata account of the `mint`
pub fn find_metadata(mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            METADATA_SEED,
            mpl_token_metadata::ID.as_ref(),
            mint.as_ref(),
        ],
        &mpl_token_metadata::ID,
    )
}

/// Master edition of the NFT `mint`
pub fn find_master_edition(mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            METADATA_SEED,
            mpl_token_metadata::ID.as_ref(),
            mint.as_ref(),
            EDITION_SEED,
        ],
        &mpl_token_metadata::ID,
    )
}

/// Token record keeping the state of programmable NFT in `token_account`
pub fn find_token_record(mint: &Pubkey, token_account: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            METADATA_SEED,
            mpl_token_metadata::ID.as_ref(),
            mint.as_ref(),
            TOKEN_RECORD_SEED,
            token_account.as_ref(),
        ],
        &mpl_token_metadata::ID,
    )
}
