//! Collaborators backed by the Solana runtime: program accounts, SPL Token (classic and 2022)
//! CPIs, price proxy feeds and Metaplex token metadata.

use std::collections::HashMap;

use mpl_token_metadata::accounts::Metadata;
use mpl_token_metadata::instructions::{TransferV1, TransferV1InstructionArgs};
use mpl_token_metadata::types::{Creator, ProgrammableConfig, TokenStandard};
use solana_program::account_info::AccountInfo;
use solana_program::instruction::Instruction;
use solana_program::msg;
use solana_program::program::invoke_signed;
use solana_program::program_option::COption;
use solana_program::program_pack::Pack;
use solana_program::pubkey::Pubkey;
use solana_program::rent::Rent;
use solana_program::system_instruction;
use solana_program::sysvar::Sysvar;
use spl_token_2022::extension::{BaseStateWithExtensions, ExtensionType, StateWithExtensions};

use crate::account::PodAccount;
use crate::collaborators::{
    AccountStore, AuthorizationData, NftInfo, NftVerifier, OraclePrice, PayloadType, PnftMove,
    PriceOracle, ProgrammableNfts, TokenAccount, TokenMint, TokenTransfer,
};
use crate::error::{self, NftLendyError};
use crate::pda::find_metadata;
use crate::processor::verify_key;
use crate::state::price_feed::PriceFeed;
use crate::{LendyResult, MPL_TOKEN_AUTH_RULES_ID, NFT_LENDY_ID, PRICE_PROXY_ID};

/// Accounts of the running instruction
#[derive(Clone, Copy)]
pub struct Accounts<'a, 'b> {
    accounts: &'a [AccountInfo<'b>],
}

impl<'a, 'b> Accounts<'a, 'b> {
    pub fn new(accounts: &'a [AccountInfo<'b>]) -> Self {
        Self { accounts }
    }

    pub fn get(&self, key: &Pubkey) -> LendyResult<&'a AccountInfo<'b>> {
        self.accounts
            .iter()
            .find(|account| account.key == key)
            .ok_or(NftLendyError::AccountNotFound(*key))
    }

    /// Keys the processor works with. Program accounts are only needed for CPIs.
    pub fn keys(&self) -> Vec<Pubkey> {
        self.accounts
            .iter()
            .filter(|account| !account.executable)
            .map(|account| *account.key)
            .collect()
    }

    pub fn signers(&self) -> Vec<Pubkey> {
        self.accounts
            .iter()
            .filter(|account| account.is_signer)
            .map(|account| *account.key)
            .collect()
    }

    fn invoke(&self, instruction: &Instruction, seeds: &[&[u8]]) -> LendyResult<()> {
        let mut infos = Vec::with_capacity(instruction.accounts.len() + 1);
        for meta in &instruction.accounts {
            infos.push(self.get(&meta.pubkey)?.clone());
        }
        infos.push(self.get(&instruction.program_id)?.clone());

        if seeds.is_empty() {
            invoke_signed(instruction, &infos, &[])
        } else {
            invoke_signed(instruction, &infos, &[seeds])
        }
        .map_err(NftLendyError::ProgramCall)
    }

    fn create_account(
        &self,
        key: &Pubkey,
        space: usize,
        owner: &Pubkey,
        payer: &Pubkey,
        seeds: &[&[u8]],
    ) -> LendyResult<()> {
        let rent = Rent::get().map_err(NftLendyError::ProgramCall)?;
        let instruction = system_instruction::create_account(
            payer,
            key,
            rent.minimum_balance(space),
            space as u64,
            owner,
        );
        self.invoke(&instruction, seeds)
    }
}

/// Program owned accounts
pub struct AccountInfoStore<'a, 'b> {
    accounts: Accounts<'a, 'b>,
}

impl<'a, 'b> AccountInfoStore<'a, 'b> {
    pub fn new(accounts: Accounts<'a, 'b>) -> Self {
        Self { accounts }
    }

    fn program_account(&self, key: &Pubkey) -> LendyResult<&'a AccountInfo<'b>> {
        let account = self.accounts.get(key)?;
        verify_key(account.owner, &NFT_LENDY_ID, "account owner")?;
        Ok(account)
    }
}

impl AccountStore for AccountInfoStore<'_, '_> {
    fn data(&self, key: &Pubkey) -> LendyResult<Vec<u8>> {
        let account = self.program_account(key)?;
        let data = account
            .try_borrow_data()
            .map_err(NftLendyError::ProgramCall)?;
        Ok(data.to_vec())
    }

    fn write(&mut self, key: &Pubkey, data: &[u8]) -> LendyResult<()> {
        let account = self.program_account(key)?;
        if !account.is_writable {
            msg!("account {} is not writable", key);
            return Err(NftLendyError::Internal(format!("{} is read only", key)));
        }

        let mut account_data = account
            .try_borrow_mut_data()
            .map_err(NftLendyError::ProgramCall)?;
        if account_data.len() != data.len() {
            return Err(NftLendyError::Internal(format!(
                "write(): data length {} != {}",
                data.len(),
                account_data.len()
            )));
        }
        account_data.copy_from_slice(data);

        Ok(())
    }

    fn allocate(
        &mut self,
        key: &Pubkey,
        space: usize,
        payer: &Pubkey,
        seeds: &[&[u8]],
    ) -> LendyResult<()> {
        self.accounts
            .create_account(key, space, &NFT_LENDY_ID, payer, seeds)
    }

    fn close(&mut self, key: &Pubkey, destination: &Pubkey) -> LendyResult<()> {
        let account = self.program_account(key)?;
        let destination = self.accounts.get(destination)?;

        let lamports = account.lamports();
        **destination
            .try_borrow_mut_lamports()
            .map_err(NftLendyError::ProgramCall)? += lamports;
        **account
            .try_borrow_mut_lamports()
            .map_err(NftLendyError::ProgramCall)? = 0;
        account
            .try_borrow_mut_data()
            .map_err(NftLendyError::ProgramCall)?
            .fill(0);

        msg!("account {} closed, {} lamports to {}", key, lamports, destination.key);

        Ok(())
    }
}

/// SPL Token and Token-2022 via CPI. Token program is picked by the owner of the account.
pub struct SplTokenCpi<'a, 'b> {
    accounts: Accounts<'a, 'b>,
}

impl<'a, 'b> SplTokenCpi<'a, 'b> {
    pub fn new(accounts: Accounts<'a, 'b>) -> Self {
        Self { accounts }
    }

    fn token_program(&self, account: &Pubkey) -> LendyResult<Pubkey> {
        let owner = *self.accounts.get(account)?.owner;
        verify_token_program(&owner)?;
        Ok(owner)
    }
}

impl TokenTransfer for SplTokenCpi<'_, '_> {
    fn transfer(
        &mut self,
        source: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        amount: u64,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        let token_program = self.token_program(source)?;
        #[allow(deprecated)]
        let instruction = spl_token_2022::instruction::transfer(
            &token_program,
            source,
            destination,
            authority,
            &[],
            amount,
        )
        .map_err(NftLendyError::ProgramCall)?;
        self.accounts.invoke(&instruction, authority_seeds)
    }

    fn mint_to(
        &mut self,
        mint: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        amount: u64,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        let token_program = self.token_program(mint)?;
        let instruction = spl_token_2022::instruction::mint_to(
            &token_program,
            mint,
            destination,
            authority,
            &[],
            amount,
        )
        .map_err(NftLendyError::ProgramCall)?;
        self.accounts.invoke(&instruction, authority_seeds)
    }

    fn burn(
        &mut self,
        source: &Pubkey,
        mint: &Pubkey,
        authority: &Pubkey,
        amount: u64,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        let token_program = self.token_program(mint)?;
        let instruction = spl_token_2022::instruction::burn(
            &token_program,
            source,
            mint,
            authority,
            &[],
            amount,
        )
        .map_err(NftLendyError::ProgramCall)?;
        self.accounts.invoke(&instruction, authority_seeds)
    }

    fn init_token_account(
        &mut self,
        account: &Pubkey,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &Pubkey,
        account_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        let account_info = self.accounts.get(account)?;
        if !account_info.data_is_empty() {
            let existing = self.token_account(account)?;
            verify_key(&existing.mint, mint, "token account mint")?;
            return verify_key(&existing.owner, owner, "token account owner");
        }

        let token_program = self.token_program(mint)?;
        let space = token_account_len(self.accounts.get(mint)?)?;
        self.accounts
            .create_account(account, space, &token_program, payer, account_seeds)?;

        let instruction =
            spl_token_2022::instruction::initialize_account3(&token_program, account, mint, owner)
                .map_err(NftLendyError::ProgramCall)?;
        self.accounts.invoke(&instruction, &[])
    }

    fn close_token_account(
        &mut self,
        account: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        let token_program = self.token_program(account)?;
        let instruction = spl_token_2022::instruction::close_account(
            &token_program,
            account,
            destination,
            authority,
            &[],
        )
        .map_err(NftLendyError::ProgramCall)?;
        self.accounts.invoke(&instruction, authority_seeds)
    }

    fn token_account(&self, account: &Pubkey) -> LendyResult<TokenAccount> {
        let info = self.accounts.get(account)?;
        let data = info.try_borrow_data().map_err(NftLendyError::ProgramCall)?;
        let unpack_error = |err| NftLendyError::AccountUnpackError(*account, err);

        let unpacked = if info.owner == &spl_token::id() {
            spl_token_2022::state::Account::unpack(&data).map_err(unpack_error)?
        } else if info.owner == &spl_token_2022::id() {
            StateWithExtensions::<spl_token_2022::state::Account>::unpack(&data)
                .map_err(unpack_error)?
                .base
        } else {
            return Err(invalid_token_program(info.owner));
        };

        Ok(TokenAccount {
            mint: unpacked.mint,
            owner: unpacked.owner,
            amount: unpacked.amount,
        })
    }

    fn mint(&self, mint: &Pubkey) -> LendyResult<TokenMint> {
        let unpacked = unpack_mint(self.accounts.get(mint)?)?;
        Ok(TokenMint {
            decimals: unpacked.decimals,
            mint_authority: match unpacked.mint_authority {
                COption::Some(authority) => Some(authority),
                COption::None => None,
            },
            supply: unpacked.supply,
        })
    }
}

/// Only classic Token and Token-2022 programs are supported
pub fn verify_token_program(token_program: &Pubkey) -> LendyResult<()> {
    if token_program != &spl_token::id() && token_program != &spl_token_2022::id() {
        Err(invalid_token_program(token_program))
    } else {
        Ok(())
    }
}

fn invalid_token_program(actual: &Pubkey) -> NftLendyError {
    NftLendyError::InvalidKey(error::InvalidKey {
        key_type: "Token program",
        actual: *actual,
        expected: spl_token::id(),
    })
}

/// Unpacks Mint of either Token or Token2022
fn unpack_mint(mint: &AccountInfo<'_>) -> LendyResult<spl_token_2022::state::Mint> {
    let data = mint.try_borrow_data().map_err(NftLendyError::ProgramCall)?;
    if mint.owner == &spl_token::id() {
        spl_token_2022::state::Mint::unpack(&data)
            .map_err(|err| NftLendyError::AccountUnpackError(*mint.key, err))
    } else if mint.owner == &spl_token_2022::id() {
        Ok(StateWithExtensions::<spl_token_2022::state::Mint>::unpack(&data)
            .map_err(|err| NftLendyError::AccountUnpackError(*mint.key, err))?
            .base)
    } else {
        Err(invalid_token_program(mint.owner))
    }
}

/// Size of token account for the `mint` including extensions the mint requires
fn token_account_len(mint: &AccountInfo<'_>) -> LendyResult<usize> {
    if mint.owner == &spl_token::id() {
        return Ok(spl_token::state::Account::LEN);
    }

    let data = mint.try_borrow_data().map_err(NftLendyError::ProgramCall)?;
    let unpacked = StateWithExtensions::<spl_token_2022::state::Mint>::unpack(&data)
        .map_err(|err| NftLendyError::AccountUnpackError(*mint.key, err))?;
    let mint_extensions = unpacked
        .get_extension_types()
        .map_err(|err| NftLendyError::AccountUnpackError(*mint.key, err))?;
    let account_extensions = ExtensionType::get_required_init_account_extensions(&mint_extensions);

    ExtensionType::try_calculate_account_len::<spl_token_2022::state::Account>(&account_extensions)
        .map_err(|err| NftLendyError::AccountUnpackError(*mint.key, err))
}

/// Reads Metaplex metadata of collateral NFTs
pub struct MetaplexNftVerifier<'a, 'b> {
    accounts: Accounts<'a, 'b>,
}

impl<'a, 'b> MetaplexNftVerifier<'a, 'b> {
    pub fn new(accounts: Accounts<'a, 'b>) -> Self {
        Self { accounts }
    }
}

/// Metadata account of the `mint`
pub fn load_metadata(accounts: &Accounts<'_, '_>, mint: &Pubkey) -> LendyResult<Metadata> {
    let (metadata_key, _) = find_metadata(mint);
    let metadata_account = accounts.get(&metadata_key).map_err(|_| {
        msg!("metadata {} of NFT {} is not provided", metadata_key, mint);
        NftLendyError::InvalidMetadata
    })?;

    if metadata_account.owner != &mpl_token_metadata::ID {
        msg!(
            "metadata {} is owned by {} instead of Metaplex",
            metadata_key,
            metadata_account.owner
        );
        return Err(NftLendyError::InvalidMetadata);
    }

    let data = metadata_account
        .try_borrow_data()
        .map_err(NftLendyError::ProgramCall)?;
    let metadata = Metadata::safe_deserialize(&data).map_err(|err| {
        msg!("can't decode metadata {}: {}", metadata_key, err);
        NftLendyError::BadMetadata
    })?;

    if metadata.mint != *mint {
        msg!("metadata {} describes mint {}", metadata_key, metadata.mint);
        return Err(NftLendyError::InvalidMetadata);
    }

    Ok(metadata)
}

impl NftVerifier for MetaplexNftVerifier<'_, '_> {
    fn verify(&self, mint: &Pubkey, collection_creator: &Pubkey) -> LendyResult<NftInfo> {
        let metadata = load_metadata(&self.accounts, mint)?;

        verify_creators(metadata.creators.as_deref().unwrap_or_default(), collection_creator)?;

        let rule_set = match metadata.programmable_config {
            Some(ProgrammableConfig::V1 { rule_set }) => rule_set,
            None => None,
        };

        Ok(NftInfo {
            programmable: is_programmable(metadata.token_standard.as_ref()),
            rule_set,
        })
    }
}

/// Collection creator must be among verified creators
pub fn verify_creators(creators: &[Creator], collection_creator: &Pubkey) -> LendyResult<()> {
    if creators
        .iter()
        .any(|creator| creator.verified && creator.address == *collection_creator)
    {
        Ok(())
    } else {
        msg!("{} is not a verified creator of the NFT", collection_creator);
        Err(NftLendyError::VerifiedCreatorMismatch)
    }
}

pub fn is_programmable(token_standard: Option<&TokenStandard>) -> bool {
    matches!(
        token_standard,
        Some(TokenStandard::ProgrammableNonFungible)
            | Some(TokenStandard::ProgrammableNonFungibleEdition)
    )
}

/// Moves programmable NFTs with TransferV1 of the token metadata program
pub struct MetaplexPnfts<'a, 'b> {
    accounts: Accounts<'a, 'b>,
}

impl<'a, 'b> MetaplexPnfts<'a, 'b> {
    pub fn new(accounts: Accounts<'a, 'b>) -> Self {
        Self { accounts }
    }
}

impl ProgrammableNfts for MetaplexPnfts<'_, '_> {
    fn transfer(&mut self, nft: &PnftMove<'_>, authority_seeds: &[&[u8]]) -> LendyResult<()> {
        let spl_token_program = *self.accounts.get(&nft.source)?.owner;
        verify_token_program(&spl_token_program)?;

        let instruction = TransferV1 {
            token: nft.source,
            token_owner: nft.source_owner,
            destination_token: nft.destination,
            destination_owner: nft.destination_owner,
            mint: nft.mint,
            metadata: nft.metadata,
            edition: Some(nft.edition),
            token_record: Some(nft.source_token_record),
            destination_token_record: Some(nft.destination_token_record),
            authority: nft.source_owner,
            payer: nft.payer,
            system_program: solana_program::system_program::ID,
            sysvar_instructions: nft.sysvar_instructions,
            spl_token_program,
            spl_ata_program: spl_associated_token_account::ID,
            authorization_rules_program: nft.rule_set.map(|_| MPL_TOKEN_AUTH_RULES_ID),
            authorization_rules: nft.rule_set,
        }
        .instruction(TransferV1InstructionArgs {
            amount: 1,
            authorization_data: nft.authorization_data.map(mpl_authorization_data),
        });

        msg!(
            "transfer pNFT {} from {} to {} under rule set {:?}",
            nft.mint,
            nft.source,
            nft.destination,
            nft.rule_set
        );

        self.accounts.invoke(&instruction, authority_seeds)
    }
}

/// Prices from feed accounts of the price proxy program
pub struct PriceFeedOracle<'a, 'b> {
    accounts: Accounts<'a, 'b>,
}

impl<'a, 'b> PriceFeedOracle<'a, 'b> {
    pub fn new(accounts: Accounts<'a, 'b>) -> Self {
        Self { accounts }
    }
}

impl PriceOracle for PriceFeedOracle<'_, '_> {
    fn price(&self, feed: &Pubkey) -> LendyResult<OraclePrice> {
        let account = self.accounts.get(feed).map_err(|_| {
            msg!("price feed {} is not provided", feed);
            NftLendyError::InvalidOracle
        })?;

        if account.owner != &PRICE_PROXY_ID {
            msg!("price feed {} is owned by {}", feed, account.owner);
            return Err(NftLendyError::InvalidOracle);
        }

        let data = account
            .try_borrow_data()
            .map_err(NftLendyError::ProgramCall)?;
        let unpacked = PriceFeed::try_from_bytes(&data).map_err(|err| {
            msg!("can't read price feed {}: {}", feed, err);
            NftLendyError::InvalidOracle
        })?;

        unpacked.oracle_price()
    }
}

pub fn mpl_authorization_data(
    data: &AuthorizationData,
) -> mpl_token_metadata::types::AuthorizationData {
    let map: HashMap<String, mpl_token_metadata::types::PayloadType> = data
        .payload
        .iter()
        .map(|(name, value)| (name.clone(), mpl_payload_type(value)))
        .collect();

    mpl_token_metadata::types::AuthorizationData {
        payload: mpl_token_metadata::types::Payload { map },
    }
}

fn mpl_payload_type(value: &PayloadType) -> mpl_token_metadata::types::PayloadType {
    use mpl_token_metadata::types::{PayloadType as MplPayloadType, ProofInfo, SeedsVec};

    match value {
        PayloadType::Pubkey(key) => MplPayloadType::Pubkey(*key),
        PayloadType::Seeds(seeds) => MplPayloadType::Seeds(SeedsVec {
            seeds: seeds.clone(),
        }),
        PayloadType::MerkleProof(proof) => MplPayloadType::MerkleProof(ProofInfo {
            proof: proof.clone(),
        }),
        PayloadType::Number(number) => MplPayloadType::Number(*number),
    }
}
