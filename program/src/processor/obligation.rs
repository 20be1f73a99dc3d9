use solana_program::msg;
use solana_program::pubkey::Pubkey;

use crate::error::NftLendyError;
use crate::events::NftLendyEvent;
use crate::instruction::{
    BorrowAccounts, CloseObligationAccounts, DepositCollateralAccounts, InitObligationAccounts,
    NftAccounts, RepayAccounts, WithdrawCollateralAccounts, WithdrawNftAccounts,
};
use crate::pda::{
    find_loan_account, find_market_authority, find_nft_collateral_vault,
    find_note_collateral_account, find_obligation, LOAN_SEED, NFT_COLLATERAL_SEED,
    NOTE_COLLATERAL_SEED, OBLIGATION_SEED,
};
use crate::processor::{
    read_pnft, seedvec, verify_key, verify_market_authority, NftMove, PnftArgs, Processor,
};
use crate::state::amount::{Amount, AmountUnits};
use crate::state::last_update::LastUpdate;
use crate::state::market::{Market, MarketFlags};
use crate::state::obligation::Obligation;
use crate::state::reserve::Reserve;
use crate::{LendyResult, MAX_AMOUNT};

impl<'a> Processor<'a> {
    #[inline(never)]
    pub(super) fn init_obligation(&mut self) -> LendyResult<()> {
        msg!("init_obligation ix");

        let InitObligationAccounts {
            obligation,
            market,
            owner,
        } = InitObligationAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&owner, "obligation owner")?;

        // Market must exist
        self.load::<Market>(&market)?;

        let (expected_obligation, bump) = find_obligation(&market, &owner);
        verify_key(&obligation, &expected_obligation, "obligation")?;

        let bump_seed = [bump];
        let last_update = LastUpdate::new(self.clock.slot, self.clock.unix_timestamp);
        self.create::<Obligation>(
            &obligation,
            &owner,
            &seedvec![market.as_ref(), owner.as_ref(), OBLIGATION_SEED, &bump_seed],
            (market, owner, last_update),
        )?;

        msg!("obligation {} created for {}", obligation, owner);

        Ok(())
    }

    #[inline(never)]
    pub(super) fn close_obligation(&mut self) -> LendyResult<()> {
        msg!("close_obligation ix");

        let CloseObligationAccounts { obligation, owner } =
            CloseObligationAccounts::from_iter(&mut self.accounts.iter())?;

        let unpacked_obligation = self.load::<Obligation>(&obligation)?;
        self.verify_obligation_owner(&unpacked_obligation, &owner)?;

        if unpacked_obligation.has_positions() {
            msg!("obligation still has deposit or loan positions");
            return Err(NftLendyError::PositionNotEmpty);
        }

        if unpacked_obligation.nft_count() > 0 {
            msg!(
                "obligation still holds {} NFTs",
                unpacked_obligation.nft_count()
            );
            return Err(NftLendyError::AccountNotEmptyError);
        }

        self.host.store.close(&obligation, &owner)
    }

    /// Locks deposit notes in the obligation. Notes keep earning interest as collateral.
    #[inline(never)]
    pub(super) fn deposit_collateral(&mut self, amount: Amount) -> LendyResult<()> {
        msg!("deposit_collateral ix: {:?}", amount);

        let DepositCollateralAccounts {
            owner,
            obligation,
            reserve,
            deposit_note_mint,
            source_note_wallet,
            collateral_account,
            market,
        } = DepositCollateralAccounts::from_iter(&mut self.accounts.iter())?;

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_DEPOSITS)?;

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        self.verify_obligation_owner(&unpacked_obligation, &owner)?;
        ensure_not_solvent_liquidated(&unpacked_obligation)?;

        let unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;
        verify_key(
            &deposit_note_mint,
            &unpacked_reserve.deposit_note_mint,
            "deposit note mint",
        )?;

        if amount.units != AmountUnits::DepositNotes {
            msg!("collateral amount must be expressed in deposit notes");
            return Err(NftLendyError::InvalidAmountUnits);
        }
        let notes = if amount.value == MAX_AMOUNT {
            self.host.tokens.balance(&source_note_wallet)?
        } else {
            amount.value
        };
        if notes == 0 {
            msg!("collateral amount can not be zero");
            return Err(NftLendyError::InvalidAmount);
        }

        let (expected_collateral_account, bump) = find_note_collateral_account(&reserve, &obligation);
        verify_key(
            &collateral_account,
            &expected_collateral_account,
            "collateral account",
        )?;

        unpacked_obligation.add_deposit(reserve, notes)?;

        let (market_authority, _) = find_market_authority(&market);
        let bump_seed = [bump];
        self.host.tokens.init_token_account(
            &collateral_account,
            &deposit_note_mint,
            &market_authority,
            &owner,
            &seedvec![reserve.as_ref(), obligation.as_ref(), NOTE_COLLATERAL_SEED, &bump_seed],
        )?;
        self.host
            .tokens
            .transfer(&source_note_wallet, &collateral_account, &owner, notes, &[])?;

        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::CollateralDeposited {
            obligation,
            reserve,
            notes,
        })
    }

    /// Unlocks deposit notes as long as the obligation stays healthy
    #[inline(never)]
    pub(super) fn withdraw_collateral(&mut self, amount: Amount) -> LendyResult<()> {
        msg!("withdraw_collateral ix: {:?}", amount);

        let accounts = self.accounts;
        let mut accounts_iter = accounts.iter();
        let WithdrawCollateralAccounts {
            owner,
            obligation,
            reserve,
            collateral_account,
            destination_note_wallet,
            market,
            market_authority,
        } = WithdrawCollateralAccounts::from_iter(&mut accounts_iter)?;
        let valuation_reserves: Vec<Pubkey> = accounts_iter.copied().collect();

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_WITHDRAWALS)?;

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        self.verify_obligation_owner(&unpacked_obligation, &owner)?;
        ensure_not_solvent_liquidated(&unpacked_obligation)?;

        let unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;

        let (expected_collateral_account, _) = find_note_collateral_account(&reserve, &obligation);
        verify_key(
            &collateral_account,
            &expected_collateral_account,
            "collateral account",
        )?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        let position_notes = unpacked_obligation
            .deposit(&reserve)
            .map(|position| position.notes)
            .ok_or_else(|| {
                msg!("obligation has no collateral in reserve {}", reserve);
                NftLendyError::UnregisteredPosition
            })?;

        if amount.units != AmountUnits::DepositNotes {
            msg!("collateral amount must be expressed in deposit notes");
            return Err(NftLendyError::InvalidAmountUnits);
        }
        let notes = if amount.value == MAX_AMOUNT {
            position_notes
        } else {
            amount.value
        };
        if notes == 0 || notes > position_notes {
            msg!(
                "can't withdraw {} notes from collateral of {} notes",
                notes,
                position_notes
            );
            return Err(NftLendyError::InvalidAmount);
        }

        unpacked_obligation.reduce_deposit(&reserve, notes)?;

        let mut reserves = vec![(reserve, unpacked_reserve)];
        reserves.extend(self.load_reserves(&valuation_reserves, &market, &unpacked_market)?);
        self.ensure_healthy(
            &mut unpacked_obligation,
            &reserves,
            NftLendyError::ObligationUnhealthy,
        )?;

        self.host.tokens.transfer(
            &collateral_account,
            &destination_note_wallet,
            &market_authority,
            notes,
            &authority_seeds.seeds(),
        )?;

        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::CollateralWithdrawn {
            obligation,
            reserve,
            notes,
        })
    }

    /// Locks NFT of the market's collection in a vault derived from the obligation
    #[inline(never)]
    pub(super) fn deposit_nft(&mut self, pnft: Option<PnftArgs>) -> LendyResult<()> {
        msg!("deposit_nft ix: {:?}", pnft);

        let accounts = self.accounts;
        let mut accounts_iter = accounts.iter();
        let NftAccounts {
            owner,
            obligation,
            market,
            nft_mint,
            nft_metadata,
            source_nft_wallet,
            nft_collateral_vault,
            market_authority,
        } = NftAccounts::from_iter(&mut accounts_iter)?;

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_DEPOSITS)?;

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        self.verify_obligation_owner(&unpacked_obligation, &owner)?;
        ensure_not_solvent_liquidated(&unpacked_obligation)?;

        let nft = self.verify_nft(&nft_mint, &nft_metadata, &unpacked_market)?;
        let pnft = read_pnft(&nft_mint, &nft, pnft, &mut accounts_iter)?;

        let (expected_vault, bump) = find_nft_collateral_vault(&obligation, &nft_mint);
        verify_key(&nft_collateral_vault, &expected_vault, "NFT collateral vault")?;
        verify_market_authority(&market, &market_authority)?;

        unpacked_obligation.add_nft(nft_mint)?;

        let bump_seed = [bump];
        self.host.tokens.init_token_account(
            &nft_collateral_vault,
            &nft_mint,
            &market_authority,
            &owner,
            &seedvec![obligation.as_ref(), nft_mint.as_ref(), NFT_COLLATERAL_SEED, &bump_seed],
        )?;
        self.transfer_nft(
            &NftMove {
                mint: nft_mint,
                metadata: nft_metadata,
                source: source_nft_wallet,
                source_owner: owner,
                destination: nft_collateral_vault,
                destination_owner: market_authority,
                payer: owner,
            },
            pnft.as_ref(),
            &[],
        )?;

        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::NftDeposited {
            obligation,
            nft_mint,
        })
    }

    /// Returns NFT to the owner as long as the obligation stays healthy
    #[inline(never)]
    pub(super) fn withdraw_nft(&mut self, pnft: Option<PnftArgs>) -> LendyResult<()> {
        msg!("withdraw_nft ix: {:?}", pnft);

        let accounts = self.accounts;
        let mut accounts_iter = accounts.iter();
        let WithdrawNftAccounts {
            owner,
            obligation,
            market,
            nft_mint,
            nft_metadata,
            nft_collateral_vault,
            destination_nft_wallet,
            market_authority,
        } = WithdrawNftAccounts::from_iter(&mut accounts_iter)?;

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_WITHDRAWALS)?;

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        self.verify_obligation_owner(&unpacked_obligation, &owner)?;
        ensure_not_solvent_liquidated(&unpacked_obligation)?;

        let nft = self.verify_nft(&nft_mint, &nft_metadata, &unpacked_market)?;
        let pnft = read_pnft(&nft_mint, &nft, pnft, &mut accounts_iter)?;
        let valuation_reserves: Vec<Pubkey> = accounts_iter.copied().collect();

        let (expected_vault, _) = find_nft_collateral_vault(&obligation, &nft_mint);
        verify_key(&nft_collateral_vault, &expected_vault, "NFT collateral vault")?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        unpacked_obligation.remove_nft(&nft_mint)?;

        let reserves = self.load_reserves(&valuation_reserves, &market, &unpacked_market)?;
        self.ensure_healthy(
            &mut unpacked_obligation,
            &reserves,
            NftLendyError::ObligationUnhealthy,
        )?;

        let seeds = authority_seeds.seeds();
        self.transfer_nft(
            &NftMove {
                mint: nft_mint,
                metadata: nft_metadata,
                source: nft_collateral_vault,
                source_owner: market_authority,
                destination: destination_nft_wallet,
                destination_owner: owner,
                payer: owner,
            },
            pnft.as_ref(),
            &seeds,
        )?;
        self.close_nft_vault(&nft_collateral_vault, &owner, &market_authority, &seeds)?;

        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::NftWithdrawn {
            obligation,
            nft_mint,
        })
    }

    /// Lends reserve's liquidity against obligation's collateral. Origination fee is added
    /// to the debt.
    #[inline(never)]
    pub(super) fn borrow(&mut self, amount: Amount) -> LendyResult<()> {
        msg!("borrow ix: {:?}", amount);

        let accounts = self.accounts;
        let mut accounts_iter = accounts.iter();
        let BorrowAccounts {
            owner,
            obligation,
            reserve,
            vault,
            loan_note_mint,
            loan_account,
            destination_wallet,
            market,
            market_authority,
        } = BorrowAccounts::from_iter(&mut accounts_iter)?;
        let valuation_reserves: Vec<Pubkey> = accounts_iter.copied().collect();

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_BORROWS)?;

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        self.verify_obligation_owner(&unpacked_obligation, &owner)?;
        ensure_not_solvent_liquidated(&unpacked_obligation)?;

        let mut unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;
        unpacked_reserve.ensure_current(self.clock.slot)?;

        verify_key(&vault, &unpacked_reserve.vault, "vault")?;
        verify_key(
            &loan_note_mint,
            &unpacked_reserve.loan_note_mint,
            "loan note mint",
        )?;
        let (expected_loan_account, loan_account_bump) = find_loan_account(&reserve, &obligation);
        verify_key(&loan_account, &expected_loan_account, "loan account")?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        let borrow = unpacked_reserve.borrow(amount)?;
        unpacked_obligation.add_loan(reserve, borrow.notes)?;

        msg!(
            "borrow {} tokens with {} fee for {} loan notes",
            borrow.tokens,
            borrow.fee,
            borrow.notes
        );

        let mut reserves = vec![(reserve, unpacked_reserve)];
        reserves.extend(self.load_reserves(&valuation_reserves, &market, &unpacked_market)?);
        self.ensure_healthy(
            &mut unpacked_obligation,
            &reserves,
            NftLendyError::InsufficientCollateral,
        )?;

        let bump_seed = [loan_account_bump];
        self.host.tokens.init_token_account(
            &loan_account,
            &loan_note_mint,
            &market_authority,
            &owner,
            &seedvec![reserve.as_ref(), obligation.as_ref(), LOAN_SEED, &bump_seed],
        )?;
        self.host.tokens.transfer(
            &vault,
            &destination_wallet,
            &market_authority,
            borrow.tokens,
            &authority_seeds.seeds(),
        )?;
        self.host.tokens.mint_to(
            &loan_note_mint,
            &loan_account,
            &market_authority,
            borrow.notes,
            &authority_seeds.seeds(),
        )?;

        self.save(&reserve, &unpacked_reserve)?;
        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::Borrowed {
            obligation,
            reserve,
            tokens: borrow.tokens,
            fee: borrow.fee,
            notes: borrow.notes,
        })
    }

    /// Pays the loan back. Anyone can repay on behalf of the obligation owner.
    #[inline(never)]
    pub(super) fn repay(&mut self, amount: Amount) -> LendyResult<()> {
        msg!("repay ix: {:?}", amount);

        let RepayAccounts {
            payer,
            obligation,
            reserve,
            vault,
            loan_note_mint,
            loan_account,
            source_wallet,
            market,
            market_authority,
        } = RepayAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&payer, "payer")?;

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_REPAYS)?;

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;

        let mut unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;
        unpacked_reserve.ensure_current(self.clock.slot)?;

        verify_key(&vault, &unpacked_reserve.vault, "vault")?;
        verify_key(
            &loan_note_mint,
            &unpacked_reserve.loan_note_mint,
            "loan note mint",
        )?;
        let (expected_loan_account, _) = find_loan_account(&reserve, &obligation);
        verify_key(&loan_account, &expected_loan_account, "loan account")?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        let position_notes = unpacked_obligation.loan_notes(&reserve)?;

        let flow = unpacked_reserve.repay(amount, position_notes)?;
        unpacked_obligation.reduce_loan(&reserve, flow.notes)?;

        msg!("repay {} tokens for {} loan notes", flow.tokens, flow.notes);

        self.host
            .tokens
            .transfer(&source_wallet, &vault, &payer, flow.tokens, &[])?;
        self.host.tokens.burn(
            &loan_account,
            &loan_note_mint,
            &market_authority,
            flow.notes,
            &authority_seeds.seeds(),
        )?;

        self.save(&reserve, &unpacked_reserve)?;
        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::Repaid {
            obligation,
            reserve,
            tokens: flow.tokens,
            notes: flow.notes,
        })
    }

    /// Values the obligation and caches the valuation. Fails with `error` when unhealthy.
    /// Obligation without a loan is always healthy and needs no reserves.
    pub(super) fn ensure_healthy(
        &self,
        obligation: &mut Obligation,
        reserves: &[(Pubkey, Reserve)],
        error: NftLendyError,
    ) -> LendyResult<()> {
        if obligation.loan().is_none() {
            return Ok(());
        }

        let valuation = obligation.valuate(reserves, self.clock.slot)?;
        if !valuation.is_healthy()? {
            msg!(
                "obligation is unhealthy: collateral value {}, debt value {}, min ratio {}",
                valuation.collateral_value,
                valuation.debt_value,
                valuation.min_collateral_ratio
            );
            return Err(error);
        }

        obligation.set_valuation(&valuation, self.clock.slot, self.clock.unix_timestamp)
    }
}

pub(super) fn ensure_not_solvent_liquidated(obligation: &Obligation) -> LendyResult<()> {
    if obligation.is_solvent_liquidated() {
        msg!("obligation was liquidated from reserve liquidity. Only executor can claim NFTs");
        return Err(NftLendyError::Disallowed);
    }
    Ok(())
}
