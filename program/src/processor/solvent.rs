use solana_program::msg;
use solana_program::pubkey::Pubkey;

use crate::error::NftLendyError;
use crate::events::NftLendyEvent;
use crate::instruction::{LiquidateSolventAccounts, WithdrawNftSolventAccounts};
use crate::math::Decimal;
use crate::pda::{find_loan_account, find_nft_collateral_vault};
use crate::processor::{
    read_pnft, verify_key, verify_market_authority, NftMove, Pnft, PnftArgs, Processor,
};
use crate::state::market::{Market, MarketFlags};
use crate::state::obligation::Valuation;
use crate::LendyResult;

impl<'a> Processor<'a> {
    /// Liquidation without a bid. The loan is written off (lenders absorb it) and the executor
    /// takes the NFT. Remaining NFTs can be claimed by the executor with WithdrawNftSolvent.
    #[inline(never)]
    pub(super) fn liquidate_solvent(&mut self) -> LendyResult<()> {
        msg!("liquidate_solvent ix");

        let accounts = self.accounts;
        let mut accounts_iter = accounts.iter();
        let LiquidateSolventAccounts {
            executor,
            market,
            obligation,
            reserve,
            loan_note_mint,
            loan_account,
            nft_mint,
            nft_metadata,
            nft_collateral_vault,
            executor_nft_wallet,
            market_authority,
        } = LiquidateSolventAccounts::from_iter(&mut accounts_iter)?;

        let unpacked_market = self.load::<Market>(&market)?;
        self.verify_executor(&unpacked_market, &executor)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_LIQUIDATIONS)?;

        let pnft = self.read_any_nft(
            &nft_mint,
            &nft_metadata,
            &unpacked_market,
            &mut accounts_iter,
        )?;
        let valuation_reserves: Vec<Pubkey> = accounts_iter.copied().collect();

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        if !unpacked_obligation.has_nft(&nft_mint) {
            msg!("NFT {} is not deposited into the obligation", nft_mint);
            return Err(NftLendyError::UnregisteredPosition);
        }

        let mut unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;
        unpacked_reserve.ensure_current(self.clock.slot)?;
        verify_key(
            &loan_note_mint,
            &unpacked_reserve.loan_note_mint,
            "loan note mint",
        )?;
        let (expected_loan_account, _) = find_loan_account(&reserve, &obligation);
        verify_key(&loan_account, &expected_loan_account, "loan account")?;
        let (expected_nft_vault, _) = find_nft_collateral_vault(&obligation, &nft_mint);
        verify_key(
            &nft_collateral_vault,
            &expected_nft_vault,
            "NFT collateral vault",
        )?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        let mut reserves = vec![(reserve, unpacked_reserve)];
        reserves.extend(self.load_reserves(&valuation_reserves, &market, &unpacked_market)?);

        let valuation = unpacked_obligation.valuate(&reserves, self.clock.slot)?;
        if valuation.is_healthy()? {
            msg!(
                "obligation is healthy: collateral value {}, debt value {}",
                valuation.collateral_value,
                valuation.debt_value
            );
            return Err(NftLendyError::ObligationHealthy);
        }

        let loan_notes = unpacked_obligation.loan_notes(&reserve)?;
        let written_off = unpacked_reserve.write_off_loan(loan_notes)?;

        msg!(
            "write off {} loan notes worth {} tokens",
            loan_notes,
            written_off
        );

        unpacked_obligation.reduce_loan(&reserve, loan_notes)?;
        unpacked_obligation.remove_nft(&nft_mint)?;
        unpacked_obligation.set_solvent_liquidated(unpacked_obligation.nft_count() > 0);
        unpacked_obligation.set_valuation(
            &Valuation {
                collateral_value: Decimal::ZERO,
                debt_value: Decimal::ZERO,
                min_collateral_ratio: Decimal::ONE,
            },
            self.clock.slot,
            self.clock.unix_timestamp,
        )?;

        let seeds = authority_seeds.seeds();
        self.host.tokens.burn(
            &loan_account,
            &loan_note_mint,
            &market_authority,
            loan_notes,
            &seeds,
        )?;
        self.claim_nft(
            &NftMove {
                mint: nft_mint,
                metadata: nft_metadata,
                source: nft_collateral_vault,
                source_owner: market_authority,
                destination: executor_nft_wallet,
                destination_owner: executor,
                payer: executor,
            },
            pnft.as_ref(),
            &seeds,
        )?;

        self.save(&reserve, &unpacked_reserve)?;
        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::LiquidatedSolvent {
            obligation,
            reserve,
            nft_mint,
            written_off_notes: loan_notes,
        })
    }

    /// Executor claims NFTs left in the obligation after LiquidateSolvent
    #[inline(never)]
    pub(super) fn withdraw_nft_solvent(&mut self) -> LendyResult<()> {
        msg!("withdraw_nft_solvent ix");

        let accounts = self.accounts;
        let mut accounts_iter = accounts.iter();
        let WithdrawNftSolventAccounts {
            executor,
            market,
            obligation,
            nft_mint,
            nft_metadata,
            nft_collateral_vault,
            executor_nft_wallet,
            market_authority,
        } = WithdrawNftSolventAccounts::from_iter(&mut accounts_iter)?;

        let unpacked_market = self.load::<Market>(&market)?;
        self.verify_executor(&unpacked_market, &executor)?;
        let pnft = self.read_any_nft(
            &nft_mint,
            &nft_metadata,
            &unpacked_market,
            &mut accounts_iter,
        )?;

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        if !unpacked_obligation.is_solvent_liquidated() {
            if unpacked_obligation.loan().is_none() {
                msg!("obligation has no loan and was not liquidated");
                return Err(NftLendyError::ObligationHealthy);
            }
            msg!("obligation must be liquidated with LiquidateSolvent first");
            return Err(NftLendyError::Disallowed);
        }

        let (expected_nft_vault, _) = find_nft_collateral_vault(&obligation, &nft_mint);
        verify_key(
            &nft_collateral_vault,
            &expected_nft_vault,
            "NFT collateral vault",
        )?;
        let authority_seeds = verify_market_authority(&market, &market_authority)?;

        unpacked_obligation.remove_nft(&nft_mint)?;
        if unpacked_obligation.nft_count() == 0 {
            msg!("all NFTs are claimed");
            unpacked_obligation.set_solvent_liquidated(false);
        }

        self.claim_nft(
            &NftMove {
                mint: nft_mint,
                metadata: nft_metadata,
                source: nft_collateral_vault,
                source_owner: market_authority,
                destination: executor_nft_wallet,
                destination_owner: executor,
                payer: executor,
            },
            pnft.as_ref(),
            &authority_seeds.seeds(),
        )?;

        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::NftClaimedSolvent {
            obligation,
            nft_mint,
        })
    }

    /// Solvent liquidations take NFT of any standard. Programmable NFT is followed by
    /// [crate::instruction::PnftAccounts] and its rule set when it has one.
    fn read_any_nft<'k>(
        &self,
        nft_mint: &Pubkey,
        nft_metadata: &Pubkey,
        market: &Market,
        accounts_iter: &mut impl Iterator<Item = &'k Pubkey>,
    ) -> LendyResult<Option<Pnft>> {
        let nft = self.verify_nft(nft_mint, nft_metadata, market)?;
        let args = nft.programmable.then(|| PnftArgs {
            authorization_data: None,
            rules_acc_present: nft.rule_set.is_some(),
        });
        read_pnft(nft_mint, &nft, args, accounts_iter)
    }

    /// Moves the NFT from the collateral vault to the executor and closes the vault
    fn claim_nft(
        &mut self,
        nft: &NftMove,
        pnft: Option<&Pnft>,
        authority_seeds: &[&[u8]],
    ) -> LendyResult<()> {
        self.transfer_nft(nft, pnft, authority_seeds)?;
        self.close_nft_vault(
            &nft.source,
            &nft.destination_owner,
            &nft.source_owner,
            authority_seeds,
        )
    }
}
