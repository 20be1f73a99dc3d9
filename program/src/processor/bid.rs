use solana_program::msg;
use solana_program::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use crate::error::NftLendyError;
use crate::events::NftLendyEvent;
use crate::instruction::{
    ExecuteLiquidateBidAccounts, IncreaseBidAccounts, PlaceBidAccounts, RevokeBidAccounts,
};
use crate::pda::{
    find_bid, find_bid_escrow, find_loan_account, find_nft_collateral_vault, BID_ESCROW_SEED,
    BID_SEED,
};
use crate::processor::{
    read_pnft, seedvec, verify_bid_escrow_authority, verify_key, verify_market_authority,
    NftMove, PnftArgs, Processor,
};
use crate::state::bid::{Bid, BidParams};
use crate::state::market::{Market, MarketFlags};
use crate::LendyResult;

impl<'a> Processor<'a> {
    /// Creates bidder's standing offer for NFT collateral of unhealthy obligations and funds
    /// its escrow.
    #[inline(never)]
    pub(super) fn place_bid(
        &mut self,
        bid_limit: u64,
        escrow_deposit: u64,
        authority_bump: u8,
    ) -> LendyResult<()> {
        msg!(
            "place_bid ix: bid_limit {}, escrow_deposit {}, authority_bump {}",
            bid_limit,
            escrow_deposit,
            authority_bump
        );

        let PlaceBidAccounts {
            bidder,
            bid,
            market,
            reserve,
            bid_mint,
            source_wallet,
            bid_escrow,
            bid_escrow_authority,
        } = PlaceBidAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&bidder, "bidder")?;

        let unpacked_market = self.load::<Market>(&market)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_BIDS)?;

        let unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;
        if bid_mint != unpacked_reserve.token_mint {
            msg!(
                "bid mint {} differs from reserve token {}",
                bid_mint,
                unpacked_reserve.token_mint
            );
            return Err(NftLendyError::BidMintMismatch);
        }

        let (expected_bid, bid_bump) = find_bid(&market, &bidder);
        verify_key(&bid, &expected_bid, "bid")?;
        let (expected_escrow, escrow_bump) = find_bid_escrow(&bid);
        verify_key(&bid_escrow, &expected_escrow, "bid escrow")?;
        verify_bid_escrow_authority(&bid, &bid_escrow_authority, authority_bump)?;

        let params = BidParams {
            market,
            bidder,
            bid_mint,
            bid_escrow,
            bid_escrow_authority,
            authority_bump,
            bid_limit,
            escrow_balance: escrow_deposit,
        };
        params.validate()?;

        let bid_bump_seed = [bid_bump];
        self.create::<Bid>(
            &bid,
            &bidder,
            &seedvec![market.as_ref(), bidder.as_ref(), BID_SEED, &bid_bump_seed],
            (params, self.clock.slot),
        )?;

        let escrow_bump_seed = [escrow_bump];
        self.host.tokens.init_token_account(
            &bid_escrow,
            &bid_mint,
            &bid_escrow_authority,
            &bidder,
            &seedvec![bid.as_ref(), BID_ESCROW_SEED, &escrow_bump_seed],
        )?;
        self.host
            .tokens
            .transfer(&source_wallet, &bid_escrow, &bidder, escrow_deposit, &[])?;

        self.emit(NftLendyEvent::BidPlaced {
            bid,
            bidder,
            bid_limit,
            escrow_balance: escrow_deposit,
        })
    }

    #[inline(never)]
    pub(super) fn increase_bid(&mut self, bid_increase: u64) -> LendyResult<()> {
        msg!("increase_bid ix: {}", bid_increase);

        let IncreaseBidAccounts {
            bidder,
            bid,
            source_wallet,
            bid_escrow,
        } = IncreaseBidAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&bidder, "bidder")?;

        let mut unpacked_bid = self.load::<Bid>(&bid)?;
        unpacked_bid.verify_bidder(&bidder)?;
        verify_key(&bid_escrow, &unpacked_bid.bid_escrow, "bid escrow")?;

        unpacked_bid.increase(bid_increase, self.clock.slot)?;

        self.host
            .tokens
            .transfer(&source_wallet, &bid_escrow, &bidder, bid_increase, &[])?;

        self.save(&bid, &unpacked_bid)?;

        self.emit(NftLendyEvent::BidIncreased {
            bid,
            amount: bid_increase,
        })
    }

    /// Returns all escrowed tokens to the bidder and closes the bid
    #[inline(never)]
    pub(super) fn revoke_bid(&mut self) -> LendyResult<()> {
        msg!("revoke_bid ix");

        let RevokeBidAccounts {
            bidder,
            bid,
            bid_escrow,
            destination_wallet,
            bid_escrow_authority,
        } = RevokeBidAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&bidder, "bidder")?;

        let unpacked_bid = self.load::<Bid>(&bid)?;
        unpacked_bid.verify_bidder(&bidder)?;
        verify_key(&bid_escrow, &unpacked_bid.bid_escrow, "bid escrow")?;
        let authority_seeds = verify_bid_escrow_authority(
            &bid,
            &bid_escrow_authority,
            unpacked_bid.authority_bump,
        )?;

        // Whatever is in the escrow, including tokens sent there directly
        let returned = self.host.tokens.balance(&bid_escrow)?;
        if returned > 0 {
            self.host.tokens.transfer(
                &bid_escrow,
                &destination_wallet,
                &bid_escrow_authority,
                returned,
                &authority_seeds.seeds(),
            )?;
        }
        self.host.tokens.close_token_account(
            &bid_escrow,
            &bidder,
            &bid_escrow_authority,
            &authority_seeds.seeds(),
        )?;
        self.host.store.close(&bid, &bidder)?;

        self.emit(NftLendyEvent::BidRevoked { bid, returned })
    }

    /// Sells one NFT of unhealthy obligation to the bid. Bid's funds repay the loan, pay the
    /// liquidation fee to the market owner and the rest goes back to the borrower.
    #[inline(never)]
    pub(super) fn execute_liquidate_bid(&mut self, pnft: Option<PnftArgs>) -> LendyResult<()> {
        msg!("execute_liquidate_bid ix: {:?}", pnft);

        let accounts = self.accounts;
        let mut accounts_iter = accounts.iter();
        let ExecuteLiquidateBidAccounts {
            executor,
            market,
            obligation,
            reserve,
            vault,
            loan_note_mint,
            loan_account,
            bid,
            bid_escrow,
            bid_escrow_authority,
            bidder,
            bidder_wallet,
            nft_mint,
            nft_metadata,
            nft_collateral_vault,
            bidder_nft_wallet,
            liquidation_fee_receiver,
            leftovers_receiver,
            market_authority,
        } = ExecuteLiquidateBidAccounts::from_iter(&mut accounts_iter)?;

        let unpacked_market = self.load::<Market>(&market)?;
        self.verify_executor(&unpacked_market, &executor)?;
        unpacked_market.ensure_not_halted(MarketFlags::HALT_LIQUIDATIONS)?;

        let nft = self.verify_nft(&nft_mint, &nft_metadata, &unpacked_market)?;
        let pnft = read_pnft(&nft_mint, &nft, pnft, &mut accounts_iter)?;
        let valuation_reserves: Vec<Pubkey> = accounts_iter.copied().collect();

        let mut unpacked_obligation = self.load_obligation(&obligation, &market)?;
        if !unpacked_obligation.has_nft(&nft_mint) {
            msg!("NFT {} is not deposited into the obligation", nft_mint);
            return Err(NftLendyError::UnregisteredPosition);
        }

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
        let (expected_nft_vault, _) = find_nft_collateral_vault(&obligation, &nft_mint);
        verify_key(
            &nft_collateral_vault,
            &expected_nft_vault,
            "NFT collateral vault",
        )?;
        let market_authority_seeds = verify_market_authority(&market, &market_authority)?;

        let mut unpacked_bid = self.load::<Bid>(&bid)?;
        verify_key(&unpacked_bid.market, &market, "bid.market")?;
        verify_key(&bid_escrow, &unpacked_bid.bid_escrow, "bid escrow")?;
        verify_key(&bidder, &unpacked_bid.bidder, "bidder")?;
        if unpacked_bid.bid_mint != unpacked_reserve.token_mint {
            msg!(
                "bid pays with {} but the loan is in {}",
                unpacked_bid.bid_mint,
                unpacked_reserve.token_mint
            );
            return Err(NftLendyError::BidMintMismatch);
        }
        let escrow_authority_seeds = verify_bid_escrow_authority(
            &bid,
            &bid_escrow_authority,
            unpacked_bid.authority_bump,
        )?;

        verify_key(
            &bidder_wallet,
            &get_associated_token_address(&unpacked_bid.bidder, &unpacked_bid.bid_mint),
            "bidder wallet",
        )?;
        verify_key(
            &bidder_nft_wallet,
            &get_associated_token_address(&unpacked_bid.bidder, &nft_mint),
            "bidder NFT wallet",
        )?;
        verify_key(
            &liquidation_fee_receiver,
            &get_associated_token_address(&unpacked_market.owner, &unpacked_reserve.token_mint),
            "liquidation fee receiver",
        )?;
        verify_key(
            &leftovers_receiver,
            &get_associated_token_address(&unpacked_obligation.owner, &unpacked_reserve.token_mint),
            "leftovers receiver",
        )?;

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
        let liquidation =
            unpacked_reserve.calculate_liquidation(loan_notes, unpacked_bid.available())?;

        msg!("liquidation: {:?}", liquidation);

        unpacked_bid.draw(liquidation.drawn, self.clock.slot)?;
        unpacked_reserve.settle_loan(liquidation.settled_notes, liquidation.repaid)?;
        unpacked_obligation.reduce_loan(&reserve, liquidation.settled_notes)?;
        unpacked_obligation.remove_nft(&nft_mint)?;

        reserves[0].1 = unpacked_reserve;
        let valuation = unpacked_obligation.valuate(&reserves, self.clock.slot)?;
        unpacked_obligation.set_valuation(&valuation, self.clock.slot, self.clock.unix_timestamp)?;

        let escrow_seeds = escrow_authority_seeds.seeds();
        self.host.tokens.transfer(
            &bid_escrow,
            &vault,
            &bid_escrow_authority,
            liquidation.repaid,
            &escrow_seeds,
        )?;
        if liquidation.fee > 0 {
            self.host.tokens.transfer(
                &bid_escrow,
                &liquidation_fee_receiver,
                &bid_escrow_authority,
                liquidation.fee,
                &escrow_seeds,
            )?;
        }
        if liquidation.leftover > 0 {
            self.host.tokens.transfer(
                &bid_escrow,
                &leftovers_receiver,
                &bid_escrow_authority,
                liquidation.leftover,
                &escrow_seeds,
            )?;
        }

        let market_seeds = market_authority_seeds.seeds();
        self.host.tokens.burn(
            &loan_account,
            &loan_note_mint,
            &market_authority,
            liquidation.settled_notes,
            &market_seeds,
        )?;

        self.transfer_nft(
            &NftMove {
                mint: nft_mint,
                metadata: nft_metadata,
                source: nft_collateral_vault,
                source_owner: market_authority,
                destination: bidder_nft_wallet,
                destination_owner: bidder,
                payer: executor,
            },
            pnft.as_ref(),
            &market_seeds,
        )?;
        self.close_nft_vault(
            &nft_collateral_vault,
            &executor,
            &market_authority,
            &market_seeds,
        )?;

        if unpacked_bid.is_drained() {
            // Tokens sent to the escrow past the bid are returned with the bid's funds
            let remainder = self.host.tokens.balance(&bid_escrow)?;
            if remainder > 0 {
                msg!("return {} tokens left in the escrow", remainder);
                self.host.tokens.transfer(
                    &bid_escrow,
                    &bidder_wallet,
                    &bid_escrow_authority,
                    remainder,
                    &escrow_seeds,
                )?;
            }

            msg!("bid {} is drained and closed", bid);
            self.host.tokens.close_token_account(
                &bid_escrow,
                &bidder,
                &bid_escrow_authority,
                &escrow_seeds,
            )?;
            self.host.store.close(&bid, &bidder)?;
        } else {
            self.save(&bid, &unpacked_bid)?;
        }

        self.save(&reserve, &unpacked_reserve)?;
        self.save(&obligation, &unpacked_obligation)?;

        self.emit(NftLendyEvent::LiquidatedByBid {
            obligation,
            bid,
            nft_mint,
            drawn: liquidation.drawn,
            repaid: liquidation.repaid,
            fee: liquidation.fee,
            leftover: liquidation.leftover,
            settled_notes: liquidation.settled_notes,
        })
    }
}
