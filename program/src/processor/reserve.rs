use solana_program::msg;

use crate::error::NftLendyError;
use crate::events::NftLendyEvent;
use crate::instruction::{DepositTokensAccounts, RefreshReserveAccounts, WithdrawTokensAccounts};
use crate::processor::{verify_key, verify_market_authority, Processor};
use crate::state::amount::{Amount, AmountUnits};
use crate::state::market::{Market, MarketFlags};
use crate::state::reserve::Reserve;
use crate::{LendyResult, MAX_AMOUNT};

impl<'a> Processor<'a> {
    /// Accrues interest, collects manage fees and caches oracle prices. Must precede any
    /// operation reading reserve's rates or prices in the same slot.
    #[inline(never)]
    pub(super) fn refresh_reserve(&mut self) -> LendyResult<()> {
        msg!("refresh_reserve ix");

        let RefreshReserveAccounts {
            reserve,
            price_feed,
            nft_price_feed,
            deposit_note_mint,
            fee_note_vault,
            market_authority,
        } = RefreshReserveAccounts::from_iter(&mut self.accounts.iter())?;

        let mut unpacked_reserve = self.load::<Reserve>(&reserve)?;

        if unpacked_reserve.price_feed != price_feed
            || unpacked_reserve.nft_price_feed != nft_price_feed
        {
            msg!(
                "price feeds {}, {} don't match reserve's {}, {}",
                price_feed,
                nft_price_feed,
                unpacked_reserve.price_feed,
                unpacked_reserve.nft_price_feed
            );
            return Err(NftLendyError::InvalidOracle);
        }
        verify_key(
            &deposit_note_mint,
            &unpacked_reserve.deposit_note_mint,
            "deposit note mint",
        )?;
        verify_key(
            &fee_note_vault,
            &unpacked_reserve.fee_note_vault,
            "fee note vault",
        )?;
        let authority_seeds = verify_market_authority(&unpacked_reserve.market, &market_authority)?;

        let token_price = self.host.oracle.price(&price_feed)?;
        let nft_floor_price = self.host.oracle.price(&nft_price_feed)?;

        let result = unpacked_reserve.refresh(&token_price, &nft_floor_price, &self.clock)?;

        if result.fee_notes > 0 {
            msg!("mint {} fee notes", result.fee_notes);
            self.host.tokens.mint_to(
                &deposit_note_mint,
                &fee_note_vault,
                &market_authority,
                result.fee_notes,
                &authority_seeds.seeds(),
            )?;
        }

        self.save(&reserve, &unpacked_reserve)?;

        self.emit(NftLendyEvent::ReserveRefreshed {
            reserve,
            slot: self.clock.slot,
            accrual_state: result.state.into(),
            fee_notes: result.fee_notes,
        })
    }

    /// Lends tokens to the reserve. Depositor receives deposit notes.
    #[inline(never)]
    pub(super) fn deposit_tokens(&mut self, amount: Amount) -> LendyResult<()> {
        msg!("deposit_tokens ix: {:?}", amount);

        let DepositTokensAccounts {
            depositor,
            source_wallet,
            destination_note_wallet,
            reserve,
            vault,
            deposit_note_mint,
            market,
            market_authority,
        } = DepositTokensAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&depositor, "depositor")?;

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_DEPOSITS)?;

        let mut unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;
        unpacked_reserve.ensure_current(self.clock.slot)?;

        verify_key(&vault, &unpacked_reserve.vault, "vault")?;
        verify_key(
            &deposit_note_mint,
            &unpacked_reserve.deposit_note_mint,
            "deposit note mint",
        )?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        let amount = if amount.units == AmountUnits::Tokens && amount.value == MAX_AMOUNT {
            Amount::tokens(self.host.tokens.balance(&source_wallet)?)
        } else {
            amount
        };

        let flow = unpacked_reserve.deposit(amount)?;

        msg!("deposit {} tokens for {} notes", flow.tokens, flow.notes);

        self.host
            .tokens
            .transfer(&source_wallet, &vault, &depositor, flow.tokens, &[])?;
        self.host.tokens.mint_to(
            &deposit_note_mint,
            &destination_note_wallet,
            &market_authority,
            flow.notes,
            &authority_seeds.seeds(),
        )?;

        self.save(&reserve, &unpacked_reserve)?;

        self.emit(NftLendyEvent::TokensDeposited {
            reserve,
            depositor,
            tokens: flow.tokens,
            notes: flow.notes,
        })
    }

    /// Burns deposit notes paying out tokens from the vault
    #[inline(never)]
    pub(super) fn withdraw_tokens(&mut self, amount: Amount) -> LendyResult<()> {
        msg!("withdraw_tokens ix: {:?}", amount);

        let WithdrawTokensAccounts {
            owner,
            source_note_wallet,
            destination_wallet,
            reserve,
            vault,
            deposit_note_mint,
            market,
            market_authority,
        } = WithdrawTokensAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&owner, "notes owner")?;

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_WITHDRAWALS)?;

        let mut unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;
        unpacked_reserve.ensure_current(self.clock.slot)?;

        verify_key(&vault, &unpacked_reserve.vault, "vault")?;
        verify_key(
            &deposit_note_mint,
            &unpacked_reserve.deposit_note_mint,
            "deposit note mint",
        )?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        let notes_balance = self.host.tokens.balance(&source_note_wallet)?;

        // Whole token balance is the whole notes balance
        let amount = if amount.units == AmountUnits::Tokens && amount.value == MAX_AMOUNT {
            Amount::deposit_notes(MAX_AMOUNT)
        } else {
            amount
        };

        let flow = unpacked_reserve.withdraw(amount, notes_balance)?;

        msg!("withdraw {} tokens for {} notes", flow.tokens, flow.notes);

        self.host.tokens.burn(
            &source_note_wallet,
            &deposit_note_mint,
            &owner,
            flow.notes,
            &[],
        )?;
        self.host.tokens.transfer(
            &vault,
            &destination_wallet,
            &market_authority,
            flow.tokens,
            &authority_seeds.seeds(),
        )?;

        self.save(&reserve, &unpacked_reserve)?;

        self.emit(NftLendyEvent::TokensWithdrawn {
            reserve,
            owner,
            tokens: flow.tokens,
            notes: flow.notes,
        })
    }
}
