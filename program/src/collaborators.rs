//! Interfaces of the components the program relies on but does not implement: price oracles,
//! NFT metadata, programmable NFT transfers, token movements and account storage.
//! Runtime implementations are in `remote`.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::clock::Slot;
use solana_program::pubkey::Pubkey;

use crate::math::Decimal;
use crate::LendyResult;

/// Price as published by an oracle feed. Validated by the Reserve before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePrice {
    /// Price in Market's quote currency
    pub price: Decimal,
    /// Confidence interval, same units as `price`
    pub confidence: Decimal,
    pub publish_slot: Slot,
}

pub trait PriceOracle {
    /// Latest price of the `feed`. Unknown feeds fail with `InvalidOracle`.
    fn price(&self, feed: &Pubkey) -> LendyResult<OraclePrice>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NftInfo {
    /// NFT follows the programmable standard and its transfers are checked by a rule set
    pub programmable: bool,
    /// Rule set configured for programmable NFT
    pub rule_set: Option<Pubkey>,
}

pub trait NftVerifier {
    /// Checks that `mint` is an NFT signed by verified `collection_creator`.
    /// Fails with `VerifiedCreatorMismatch`, `InvalidMetadata` or `BadMetadata`.
    fn verify(&self, mint: &Pubkey, collection_creator: &Pubkey) -> LendyResult<NftInfo>;
}

/// Payload value passed to programmable NFT rule set
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum PayloadType {
    Pubkey(Pubkey),
    Seeds(Vec<Vec<u8>>),
    MerkleProof(Vec<[u8; 32]>),
    Number(u64),
}

/// Named payload values evaluated by the rule set of a programmable NFT
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorizationData {
    pub payload: BTreeMap<String, PayloadType>,
}

/// Move of one programmable NFT between token accounts
#[derive(Debug, Clone, Copy)]
pub struct PnftMove<'a> {
    pub mint: Pubkey,
    pub metadata: Pubkey,
    pub edition: Pubkey,
    pub source: Pubkey,
    /// Owner of `source`. Signs the transfer.
    pub source_owner: Pubkey,
    pub source_token_record: Pubkey,
    pub destination: Pubkey,
    pub destination_owner: Pubkey,
    pub destination_token_record: Pubkey,
    /// Funds token records created by the transfer
    pub payer: Pubkey,
    pub sysvar_instructions: Pubkey,
    /// Rule set evaluated on the transfer
    pub rule_set: Option<Pubkey>,
    pub authorization_data: Option<&'a AuthorizationData>,
}

/// Programmable NFTs are frozen in their token accounts and move only through the token
/// metadata program which runs their rule sets.
pub trait ProgrammableNfts {
    /// `authority_seeds` are seeds of the source owner when it is a program address.
    /// Rejections by the rule set fail with `ProgramCall`.
    fn transfer(&mut self, nft: &PnftMove<'_>, authority_seeds: &[&[u8]]) -> LendyResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMint {
    pub decimals: u8,
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
}

/// Token program operations. `authority_seeds` are seeds of the program derived authority
/// and are empty when the authority is a transaction signer.
pub trait TokenTransfer {
    fn transfer(
        &mut self,
        source: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        amount: u64,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()>;

    fn mint_to(
        &mut self,
        mint: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        amount: u64,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()>;

    fn burn(
        &mut self,
        source: &Pubkey,
        mint: &Pubkey,
        authority: &Pubkey,
        amount: u64,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()>;

    /// Creates token account at program address `account` derived with `account_seeds`.
    /// Existing account of the same mint and owner is left as is.
    fn init_token_account(
        &mut self,
        account: &Pubkey,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &Pubkey,
        account_seeds: &[&[u8]],
    ) -> LendyResult<()>;

    /// Closes empty token account returning its funds to `destination`
    fn close_token_account(
        &mut self,
        account: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()>;

    fn token_account(&self, account: &Pubkey) -> LendyResult<TokenAccount>;

    fn mint(&self, mint: &Pubkey) -> LendyResult<TokenMint>;

    fn balance(&self, account: &Pubkey) -> LendyResult<u64> {
        Ok(self.token_account(account)?.amount)
    }
}

/// Storage of program owned accounts
pub trait AccountStore {
    /// Copy of account's data. Missing accounts fail with `AccountNotFound`.
    fn data(&self, key: &Pubkey) -> LendyResult<Vec<u8>>;

    /// Overwrites account's data. Length must not change.
    fn write(&mut self, key: &Pubkey, data: &[u8]) -> LendyResult<()>;

    /// Creates zeroed program owned account of `space` bytes funded by `payer`. `seeds` are
    /// derivation seeds when `key` is a program address.
    fn allocate(
        &mut self,
        key: &Pubkey,
        space: usize,
        payer: &Pubkey,
        seeds: &[&[u8]],
    ) -> LendyResult<()>;

    /// Deletes the account returning its funds to `destination`
    fn close(&mut self, key: &Pubkey, destination: &Pubkey) -> LendyResult<()>;
}
