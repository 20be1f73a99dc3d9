use borsh::BorshDeserialize;
use solana_program::clock::Clock;
use solana_program::msg;
use solana_program::program_error::ProgramError;
use solana_program::pubkey::Pubkey;
use solana_program::sysvar;
use tinyvec::ArrayVec;

use crate::account::PodAccount;
use crate::collaborators::{
    AccountStore, AuthorizationData, NftInfo, NftVerifier, PnftMove, PriceOracle,
    ProgrammableNfts, TokenTransfer,
};
use crate::error::{self, NftLendyError};
use crate::events::NftLendyEvent;
use crate::instruction::{NftLendyInstruction, PnftAccounts};
use crate::pda::{
    find_market_authority, find_master_edition, find_metadata, find_token_record,
    BID_ESCROW_AUTHORITY_SEED, MARKET_AUTHORITY_SEED,
};
use crate::state::market::Market;
use crate::state::obligation::Obligation;
use crate::state::reserve::Reserve;
use crate::{LendyResult, NFT_LENDY_ID};

mod bid;
mod market;
mod obligation;
mod reserve;
mod solvent;

pub type SeedVec<'a> = ArrayVec<[&'a [u8]; 5]>;
macro_rules! seedvec {
    ($($seed:expr),*) => {{
        let mut seed_vec = $crate::processor::SeedVec::new();
        $( seed_vec.push($seed); )*
        seed_vec
    }};
}

pub(crate) use seedvec;

/// Collaborators the processor works through
pub struct Host<'a> {
    pub store: &'a mut dyn AccountStore,
    pub tokens: &'a mut dyn TokenTransfer,
    pub oracle: &'a dyn PriceOracle,
    pub nft_verifier: &'a dyn NftVerifier,
    pub pnfts: &'a mut dyn ProgrammableNfts,
}

/// Arguments of programmable NFT instruction variants
#[derive(Debug, Clone, Default)]
pub struct PnftArgs {
    pub authorization_data: Option<AuthorizationData>,
    pub rules_acc_present: bool,
}

/// Programmable NFT accounts and arguments passed with the instruction
#[derive(Debug, Clone)]
pub struct Pnft {
    pub accounts: PnftAccounts,
    pub rule_set: Option<Pubkey>,
    pub authorization_data: Option<AuthorizationData>,
}

/// NFT move between token accounts. `source_owner` signs the transfer.
#[derive(Debug, Clone, Copy)]
pub struct NftMove {
    pub mint: Pubkey,
    pub metadata: Pubkey,
    pub source: Pubkey,
    pub source_owner: Pubkey,
    pub destination: Pubkey,
    pub destination_owner: Pubkey,
    pub payer: Pubkey,
}

/// Seeds of a program derived authority
pub struct SignerSeeds {
    base: [u8; 32],
    seed: &'static [u8],
    bump: [u8; 1],
}

impl SignerSeeds {
    pub fn seeds(&self) -> SeedVec<'_> {
        seedvec![&self.base, self.seed, &self.bump]
    }
}

pub struct Processor<'a> {
    host: Host<'a>,
    accounts: &'a [Pubkey],
    signers: &'a [Pubkey],
    clock: Clock,
    events: Vec<NftLendyEvent>,
}

impl<'a> Processor<'a> {
    pub fn new(host: Host<'a>, accounts: &'a [Pubkey], signers: &'a [Pubkey], clock: Clock) -> Self {
        Self {
            host,
            accounts,
            signers,
            clock,
            events: Vec::new(),
        }
    }

    pub fn into_events(self) -> Vec<NftLendyEvent> {
        self.events
    }

    pub fn process_instruction(&mut self, input: &[u8]) -> LendyResult<()> {
        match NftLendyInstruction::try_from_slice(input).map_err(NftLendyError::from)? {
            NftLendyInstruction::InitMarket { params } => self.init_market(params),
            NftLendyInstruction::AlterMarket { params } => self.alter_market(params),
            NftLendyInstruction::TransferMarketOwnership => self.transfer_market_ownership(),
            NftLendyInstruction::InitReserve { config } => self.init_reserve(config),
            NftLendyInstruction::AlterReserve { config } => self.alter_reserve(config),
            NftLendyInstruction::RefreshReserve => self.refresh_reserve(),
            NftLendyInstruction::InitObligation => self.init_obligation(),
            NftLendyInstruction::CloseObligation => self.close_obligation(),
            NftLendyInstruction::DepositTokens { amount } => self.deposit_tokens(amount),
            NftLendyInstruction::WithdrawTokens { amount } => self.withdraw_tokens(amount),
            NftLendyInstruction::DepositCollateral { amount } => self.deposit_collateral(amount),
            NftLendyInstruction::WithdrawCollateral { amount } => self.withdraw_collateral(amount),
            NftLendyInstruction::DepositNft => self.deposit_nft(None),
            NftLendyInstruction::DepositPnft {
                authorization_data,
                rules_acc_present,
            } => self.deposit_nft(Some(PnftArgs {
                authorization_data,
                rules_acc_present,
            })),
            NftLendyInstruction::WithdrawNft => self.withdraw_nft(None),
            NftLendyInstruction::WithdrawPnft {
                authorization_data,
                rules_acc_present,
            } => self.withdraw_nft(Some(PnftArgs {
                authorization_data,
                rules_acc_present,
            })),
            NftLendyInstruction::Borrow { amount } => self.borrow(amount),
            NftLendyInstruction::Repay { amount } => self.repay(amount),
            NftLendyInstruction::PlaceBid {
                bid_limit,
                escrow_deposit,
                authority_bump,
            } => self.place_bid(bid_limit, escrow_deposit, authority_bump),
            NftLendyInstruction::IncreaseBid { bid_increase } => self.increase_bid(bid_increase),
            NftLendyInstruction::RevokeBid => self.revoke_bid(),
            NftLendyInstruction::ExecuteLiquidateBid => self.execute_liquidate_bid(None),
            NftLendyInstruction::ExecuteLiquidatePnftBid {
                authorization_data,
                rules_acc_present,
            } => self.execute_liquidate_bid(Some(PnftArgs {
                authorization_data,
                rules_acc_present,
            })),
            NftLendyInstruction::LiquidateSolvent => self.liquidate_solvent(),
            NftLendyInstruction::WithdrawNftSolvent => self.withdraw_nft_solvent(),
            NftLendyInstruction::Version { no_error } => self.version(no_error),
        }
    }

    #[inline(never)]
    pub(super) fn version(&self, no_error: bool) -> LendyResult<()> {
        if no_error {
            Ok(())
        } else {
            msg!("NftLendy contract {}", env!("CARGO_PKG_VERSION"));
            Err(NftLendyError::Disallowed)
        }
    }

    pub(super) fn verify_signer(&self, key: &Pubkey, name: &'static str) -> LendyResult<()> {
        if !self.signers.contains(key) {
            msg!("{} {} must sign the transaction", name, key);
            return Err(NftLendyError::MissingSignature(name));
        }
        Ok(())
    }

    pub(super) fn load<T: PodAccount>(&self, key: &Pubkey) -> LendyResult<T> {
        let data = self.host.store.data(key)?;
        Ok(T::try_from_bytes(&data)?)
    }

    pub(super) fn save<T: PodAccount>(&mut self, key: &Pubkey, account: &T) -> LendyResult<()> {
        let mut data = self.host.store.data(key)?;
        account.write_bytes(&mut data)?;
        self.host.store.write(key, &data)
    }

    /// Allocates and initializes new account
    pub(super) fn create<T: PodAccount>(
        &mut self,
        key: &Pubkey,
        payer: &Pubkey,
        seeds: &[&[u8]],
        params: T::InitParams,
    ) -> LendyResult<T> {
        self.host.store.allocate(key, T::SIZE, payer, seeds)?;
        let mut data = self.host.store.data(key)?;
        let account = T::init_bytes(&mut data, params)?;
        self.host.store.write(key, &data)?;
        Ok(account)
    }

    pub(super) fn emit(&mut self, event: NftLendyEvent) -> LendyResult<()> {
        event.log()?;
        self.events.push(event);
        Ok(())
    }

    /// Loads the Reserve checking it is registered in the `market`
    pub(super) fn load_reserve(
        &self,
        key: &Pubkey,
        market_key: &Pubkey,
        market: &Market,
    ) -> LendyResult<Reserve> {
        let reserve = self.load::<Reserve>(key)?;
        verify_key(&reserve.market, market_key, "reserve.market")?;
        if !market.is_registered(key, reserve.index) {
            msg!("reserve {} is not registered in the market", key);
            return Err(NftLendyError::ObligationAccountMismatch);
        }
        Ok(reserve)
    }

    /// Loads reserves passed after instruction's accounts
    pub(super) fn load_reserves(
        &self,
        keys: &[Pubkey],
        market_key: &Pubkey,
        market: &Market,
    ) -> LendyResult<Vec<(Pubkey, Reserve)>> {
        keys.iter()
            .map(|key| Ok((*key, self.load_reserve(key, market_key, market)?)))
            .collect()
    }

    pub(super) fn load_obligation(&self, key: &Pubkey, market_key: &Pubkey) -> LendyResult<Obligation> {
        let obligation = self.load::<Obligation>(key)?;
        verify_key(&obligation.market, market_key, "obligation.market")?;
        Ok(obligation)
    }

    pub(super) fn verify_obligation_owner(&self, obligation: &Obligation, owner: &Pubkey) -> LendyResult<()> {
        if obligation.owner != *owner {
            msg!("{} is not the obligation owner {}", owner, obligation.owner);
            return Err(NftLendyError::InvalidAuthority);
        }
        self.verify_signer(owner, "obligation owner")
    }

    pub(super) fn verify_market_owner(&self, market: &Market, owner: &Pubkey) -> LendyResult<()> {
        if market.owner != *owner {
            msg!("{} is not the market owner {}", owner, market.owner);
            return Err(NftLendyError::InvalidMarketAuthority);
        }
        self.verify_signer(owner, "market owner")
    }

    pub(super) fn verify_executor(&self, market: &Market, executor: &Pubkey) -> LendyResult<()> {
        if market.executor != *executor {
            msg!("{} is not the market executor {}", executor, market.executor);
            return Err(NftLendyError::InvalidAuthority);
        }
        self.verify_signer(executor, "executor")
    }

    /// Checks that the NFT belongs to the market's collection
    pub(super) fn verify_nft(
        &self,
        nft_mint: &Pubkey,
        nft_metadata: &Pubkey,
        market: &Market,
    ) -> LendyResult<NftInfo> {
        let (expected_metadata, _) = find_metadata(nft_mint);
        verify_key(nft_metadata, &expected_metadata, "NFT metadata")?;
        self.host
            .nft_verifier
            .verify(nft_mint, &market.nft_collection_creator)
    }

    /// Moves the NFT. Programmable NFTs go through their rule set and need `pnft`.
    pub(super) fn transfer_nft(
        &mut self,
        nft: &NftMove,
        pnft: Option<&Pnft>,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        let Some(pnft) = pnft else {
            return self.host.tokens.transfer(
                &nft.source,
                &nft.destination,
                &nft.source_owner,
                1,
                authority_seeds,
            );
        };

        let PnftAccounts {
            nft_edition,
            source_token_record,
            destination_token_record,
            sysvar_instructions,
        } = pnft.accounts;
        let (expected_source_record, _) = find_token_record(&nft.mint, &nft.source);
        verify_key(&source_token_record, &expected_source_record, "source token record")?;
        let (expected_destination_record, _) = find_token_record(&nft.mint, &nft.destination);
        verify_key(
            &destination_token_record,
            &expected_destination_record,
            "destination token record",
        )?;

        self.host.pnfts.transfer(
            &PnftMove {
                mint: nft.mint,
                metadata: nft.metadata,
                edition: nft_edition,
                source: nft.source,
                source_owner: nft.source_owner,
                source_token_record,
                destination: nft.destination,
                destination_owner: nft.destination_owner,
                destination_token_record,
                payer: nft.payer,
                sysvar_instructions,
                rule_set: pnft.rule_set,
                authorization_data: pnft.authorization_data.as_ref(),
            },
            authority_seeds,
        )
    }

    /// Closes emptied NFT vault. Token metadata program may close it with the pNFT transfer.
    pub(super) fn close_nft_vault(
        &mut self,
        vault: &Pubkey,
        destination: &Pubkey,
        market_authority: &Pubkey,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        if self.host.tokens.token_account(vault).is_err() {
            msg!("NFT vault {} is already closed", vault);
            return Ok(());
        }
        self.host
            .tokens
            .close_token_account(vault, destination, market_authority, authority_seeds)
    }
}

/// Reads programmable NFT accounts which follow instruction's accounts: [PnftAccounts] and then
/// the rule set account when `rules_acc_present`. `args` are given by pNFT instruction variants
/// only.
pub fn read_pnft<'k>(
    nft_mint: &Pubkey,
    nft: &NftInfo,
    args: Option<PnftArgs>,
    accounts_iter: &mut impl Iterator<Item = &'k Pubkey>,
) -> LendyResult<Option<Pnft>> {
    let args = match (nft.programmable, args) {
        (false, None) => return Ok(None),
        (true, Some(args)) => args,
        (true, None) => {
            msg!("NFT {} is programmable. Use pNFT variant of the IX", nft_mint);
            return Err(NftLendyError::NotSupported);
        }
        (false, Some(_)) => {
            msg!("NFT {} is not programmable. Use non pNFT variant of the IX", nft_mint);
            return Err(NftLendyError::NotSupported);
        }
    };

    let accounts = PnftAccounts::from_iter(accounts_iter)?;
    let (expected_edition, _) = find_master_edition(nft_mint);
    verify_key(&accounts.nft_edition, &expected_edition, "NFT edition")?;
    verify_key(
        &accounts.sysvar_instructions,
        &sysvar::instructions::ID,
        "instructions sysvar",
    )?;

    let rule_set = if args.rules_acc_present {
        Some(*accounts_iter.next().ok_or(NftLendyError::NotEnoughAccountKeys)?)
    } else {
        None
    };
    verify_rule_set(nft.rule_set.as_ref(), rule_set.as_ref())?;

    Ok(Some(Pnft {
        accounts,
        rule_set,
        authorization_data: args.authorization_data,
    }))
}

/// Rule set account must be passed exactly when the NFT has a rule set
pub fn verify_rule_set(expected: Option<&Pubkey>, provided: Option<&Pubkey>) -> LendyResult<()> {
    match (expected, provided) {
        (None, None) => Ok(()),
        (Some(expected), Some(provided)) if expected == provided => Ok(()),
        (Some(expected), Some(provided)) => {
            msg!("rule set {} is provided instead of {}", provided, expected);
            Err(NftLendyError::BadRuleset)
        }
        (Some(expected), None) => {
            msg!("NFT is governed by rule set {} which is not provided", expected);
            Err(NftLendyError::BadRuleset)
        }
        (None, Some(_)) => {
            msg!("rule set account is provided but the NFT has no rule set");
            Err(NftLendyError::BadRuleset)
        }
    }
}

/// Checks `market_authority` key and returns its seeds
pub fn verify_market_authority(market: &Pubkey, market_authority: &Pubkey) -> LendyResult<SignerSeeds> {
    let (expected_authority, bump) = find_market_authority(market);
    verify_key(market_authority, &expected_authority, "market authority")?;
    Ok(SignerSeeds {
        base: market.to_bytes(),
        seed: MARKET_AUTHORITY_SEED,
        bump: [bump],
    })
}

/// Checks `bid_escrow_authority` against the bump stored in the bid and returns its seeds
pub fn verify_bid_escrow_authority(
    bid: &Pubkey,
    bid_escrow_authority: &Pubkey,
    bump: u8,
) -> LendyResult<SignerSeeds> {
    let expected_authority = Pubkey::create_program_address(
        &[bid.as_ref(), BID_ESCROW_AUTHORITY_SEED, &[bump]],
        &NFT_LENDY_ID,
    )?;
    verify_key(
        bid_escrow_authority,
        &expected_authority,
        "bid escrow authority",
    )?;
    Ok(SignerSeeds {
        base: bid.to_bytes(),
        seed: BID_ESCROW_AUTHORITY_SEED,
        bump: [bump],
    })
}

pub fn verify_key(actual: &Pubkey, expected: &Pubkey, key_type: &'static str) -> LendyResult<()> {
    if actual != expected {
        msg!("invalid {} key {}, expected {}", key_type, actual, expected);
        return Err(NftLendyError::InvalidKey(error::InvalidKey {
            key_type,
            actual: *actual,
            expected: *expected,
        }));
    }
    Ok(())
}

/// Executes one instruction. Returns events emitted by it.
pub fn process_instruction<'a>(
    host: Host<'a>,
    accounts: &'a [Pubkey],
    signers: &'a [Pubkey],
    clock: Clock,
    instruction_data: &[u8],
) -> Result<Vec<NftLendyEvent>, ProgramError> {
    let mut processor = Processor::new(host, accounts, signers, clock);
    processor
        .process_instruction(instruction_data)
        .map_err(|err| {
            msg!("Error: {}", err);
            ProgramError::from(err)
        })?;

    Ok(processor.into_events())
}
