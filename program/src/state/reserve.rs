use std::cmp::Ordering;

use borsh::{BorshDeserialize, BorshSerialize};
use bytemuck::{Pod, Zeroable};
use solana_program::clock::Clock;
use solana_program::{clock::Slot, msg, pubkey::Pubkey};

use crate::account::PodAccount;
use crate::collaborators::OraclePrice;
use crate::error::NftLendyError;
use crate::math::{CheckedAdd, CheckedDiv, CheckedMul, CheckedSub, Decimal, MathError, MathResult};
use crate::state::amount::{Amount, AmountUnits, NoteExchangeRate, NoteKind, Rounding};
use crate::state::last_update::{AccrualState, LastUpdate};
use crate::state::{MAX_ACCRUAL_SLOTS, RESERVE_DISCRIMINATOR, SLOTS_PER_YEAR};
use crate::{LendyResult, MAX_AMOUNT};

static_assertions::const_assert_eq!(Reserve::SIZE, std::mem::size_of::<Reserve>());
static_assertions::const_assert_eq!(0, std::mem::size_of::<Reserve>() % 16);
static_assertions::const_assert_eq!(0, std::mem::size_of::<ReserveState>() % 16);
static_assertions::const_assert_eq!(0, std::mem::size_of::<ReserveConfig>() % 16);

/// Important note about amounts representation in this contact.
/// When some fn parameter or variable has _amount suffix or is called `tokens`/`notes` and has u64
/// type - this is "lamports" representation, the same value as could be found in
/// spl_token::Account.amount field.
///
/// Second amount representation is fixed point decimal with 18 scale (digits past delimiter)
/// expressed in whole tokens. In structs such values are i128. In the code these are Decimal type.

/// Reserve manages one fungible token of the Market: its liquidity, deposit and loan notes,
/// interest and prices.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Reserve {
    pub discriminator: [u8; 8],
    pub version: u8,

    /// Slot index in the Market's reserves table
    pub index: u8,

    /// Decimals of the token mint. Deposit and loan notes have the same decimals.
    pub token_decimals: u8,

    /// Vacant to store mode/status flags
    pub _flags: [u8; 5],

    /// Slot interest is accrued up to and accrual state
    pub last_update: LastUpdate,

    /// Market the reserve belongs to
    pub market: Pubkey,
    pub token_mint: Pubkey,
    /// Token wallet with available liquidity
    pub vault: Pubkey,
    /// Deposit notes wallet which receives manage fees
    pub fee_note_vault: Pubkey,
    pub deposit_note_mint: Pubkey,
    pub loan_note_mint: Pubkey,
    /// Oracle feed with token price in quote currency
    pub price_feed: Pubkey,
    /// Oracle feed with floor price of the market's NFT collection in quote currency
    pub nft_price_feed: Pubkey,

    pub state: ReserveState,

    pub config: ReserveConfig,

    // For future use
    pub _padding: [u8; 128],
}

/// Mutable accounting of the Reserve
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct ReserveState {
    /// Tokens owed by borrowers including accrued interest. WAD
    pub outstanding_debt: i128,
    /// Manage fees accrued but not yet materialized as deposit notes. WAD
    pub uncollected_fees: i128,
    /// Token price in quote currency. WAD
    pub market_price: i128,
    /// NFT collection floor price in quote currency. WAD
    pub nft_floor_price: i128,
    /// This is last time calculated Borrow Rate. It is NOT used by the contract for any purposes.
    /// The field is here to simplify things for off-chain apps interested in that value.
    pub borrow_rate: i128,
    /// Tokens per one deposit note after the last change. WAD
    pub deposit_note_exchange_rate: i128,
    /// Tokens per one loan note after the last change. WAD
    pub loan_note_exchange_rate: i128,

    /// Tokens available in the vault. Lamports.
    pub total_deposits: u64,
    pub total_deposit_notes: u64,
    pub total_loan_notes: u64,
    pub _padding: u64,
}

/// Reserve configuration. This part of the Reserve can be changed via AlterReserve IX.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
#[repr(C)]
pub struct ReserveConfig {
    /// Utilization (bps) where the first segment of borrow rate curve ends
    pub utilization_rate_1: u16,
    /// Utilization (bps) where the second segment of borrow rate curve ends
    pub utilization_rate_2: u16,
    /// Annual borrow rate (bps) at zero utilization
    pub borrow_rate_0: u16,
    /// Annual borrow rate (bps) at `utilization_rate_1`
    pub borrow_rate_1: u16,
    /// Annual borrow rate (bps) at `utilization_rate_2`
    pub borrow_rate_2: u16,
    /// Annual borrow rate (bps) at full utilization
    pub borrow_rate_3: u16,
    /// Collateral value to debt value ratio (bps) below which an obligation can be liquidated
    pub min_collateral_ratio: u16,
    /// Discount (bps) of liquidated collateral price. Paid out as liquidation fee.
    pub liquidation_premium: u16,
    /// Part (bps) of accrued interest taken as manage fee
    pub manage_fee_rate: u16,
    /// Part (bps) of borrowed amount added to the debt as fee
    pub loan_origination_fee: u16,
    /// Oracle price older than that number of slots is not accepted
    pub price_stale_threshold_slots: u32,
    /// Max oracle confidence interval relative to the price (bps)
    pub max_price_confidence_bps: u16,
    pub _padding0: [u8; 6],
    /// Uncollected manage fees (lamports) materialized into fee notes once reached
    pub manage_fee_collection_threshold: u64,
    pub _padding: [u8; 24],
}

/// Identity of the Reserve set on creation
#[derive(Debug, Clone, Copy)]
pub struct ReserveParams {
    pub market: Pubkey,
    pub index: u8,
    pub token_mint: Pubkey,
    pub token_decimals: u8,
    pub vault: Pubkey,
    pub fee_note_vault: Pubkey,
    pub deposit_note_mint: Pubkey,
    pub loan_note_mint: Pubkey,
    pub price_feed: Pubkey,
    pub nft_price_feed: Pubkey,
    pub config: ReserveConfig,
}

impl PodAccount for Reserve {
    const DISCRIMINATOR: &'static [u8; 8] = RESERVE_DISCRIMINATOR;

    const VERSION: u8 = 1;

    type InitParams = (ReserveParams, LastUpdate);

    fn discriminator(&self) -> &[u8] {
        &self.discriminator
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn init_unchecked(&mut self, (params, last_update): Self::InitParams) {
        self.discriminator = *RESERVE_DISCRIMINATOR;
        self.version = Self::VERSION;
        self.index = params.index;
        self.token_decimals = params.token_decimals;
        self.last_update = last_update;
        self.market = params.market;
        self.token_mint = params.token_mint;
        self.vault = params.vault;
        self.fee_note_vault = params.fee_note_vault;
        self.deposit_note_mint = params.deposit_note_mint;
        self.loan_note_mint = params.loan_note_mint;
        self.price_feed = params.price_feed;
        self.nft_price_feed = params.nft_price_feed;
        self.config = params.config;
        self.state = ReserveState::zeroed();
        // Both rates start at 1 and are only stored (never read back) by the contract
        self.state.deposit_note_exchange_rate = WAD;
        self.state.loan_note_exchange_rate = WAD;
    }
}

/// Decimal::ONE bits
const WAD: i128 = 1_000_000_000_000_000_000;

/// Tokens moved and notes minted or burned by deposit, withdraw and repay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteFlow {
    pub tokens: u64,
    pub notes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculateBorrowResult {
    /// Tokens transferred to the borrower
    pub tokens: u64,
    /// Origination fee added to the debt on top of `tokens`
    pub fee: u64,
    /// Loan notes minted
    pub notes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculateLiquidationResult {
    /// Tokens taken from the bid escrow
    pub drawn: u64,
    /// Part of `drawn` repaying the loan
    pub repaid: u64,
    /// Part of `drawn` paid to the liquidation fee receiver
    pub fee: u64,
    /// Part of `drawn` returned to the borrower
    pub leftover: u64,
    /// Loan notes settled by `repaid`
    pub settled_notes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshResult {
    pub state: AccrualState,
    /// Deposit notes to mint into fee note vault
    pub fee_notes: u64,
}

impl Reserve {
    /// Functions to read and set Decimal amounts which are i128 inside
    pub fn outstanding_debt(&self) -> LendyResult<Decimal> {
        Decimal::from_bits(self.state.outstanding_debt).map_err(From::from)
    }

    pub fn set_outstanding_debt(&mut self, value: Decimal) -> LendyResult<()> {
        self.state.outstanding_debt = value.into_bits()?;
        Ok(())
    }

    pub fn uncollected_fees(&self) -> LendyResult<Decimal> {
        Decimal::from_bits(self.state.uncollected_fees).map_err(From::from)
    }

    pub fn set_uncollected_fees(&mut self, value: Decimal) -> LendyResult<()> {
        self.state.uncollected_fees = value.into_bits()?;
        Ok(())
    }

    pub fn market_price(&self) -> LendyResult<Decimal> {
        Decimal::from_bits(self.state.market_price).map_err(From::from)
    }

    pub fn set_market_price(&mut self, value: Decimal) -> LendyResult<()> {
        self.state.market_price = value.into_bits()?;
        Ok(())
    }

    pub fn nft_floor_price(&self) -> LendyResult<Decimal> {
        Decimal::from_bits(self.state.nft_floor_price).map_err(From::from)
    }

    pub fn set_nft_floor_price(&mut self, value: Decimal) -> LendyResult<()> {
        self.state.nft_floor_price = value.into_bits()?;
        Ok(())
    }

    pub fn borrow_rate(&self) -> LendyResult<Decimal> {
        Decimal::from_bits(self.state.borrow_rate).map_err(From::from)
    }

    pub fn set_borrow_rate(&mut self, value: Decimal) -> LendyResult<()> {
        self.state.borrow_rate = value.into_bits()?;
        Ok(())
    }

    pub fn accrual_state(&self, current_slot: Slot) -> LendyResult<AccrualState> {
        self.last_update.state(current_slot)
    }

    /// Operations reading rates or prices must be preceded by RefreshReserve in the same slot
    pub fn ensure_current(&self, current_slot: Slot) -> LendyResult<()> {
        match self.accrual_state(current_slot)? {
            AccrualState::Current => Ok(()),
            state => {
                msg!(
                    "Reserve is {:?} and must be refreshed. Last updated on {}. Current slot {}",
                    state,
                    self.last_update.slot,
                    current_slot
                );
                Err(NftLendyError::ExceptionalReserveState)
            }
        }
    }

    /// Tokens in the vault plus outstanding debt
    pub fn total_deposited(&self) -> LendyResult<Decimal> {
        Ok(Decimal::from_lamports(self.state.total_deposits, self.token_decimals)?
            .checked_add(self.outstanding_debt()?)?)
    }

    /// Calculate the liquidity utilization rate of the reserve
    pub fn utilization_rate(&self) -> LendyResult<Decimal> {
        Ok(utilization_rate(
            self.total_deposited()?,
            self.outstanding_debt()?,
        )?)
    }

    /// Calculate the current borrow rate.
    pub fn current_borrow_rate(&self) -> LendyResult<Decimal> {
        Ok(self.config.borrow_rate(self.utilization_rate()?)?)
    }

    pub fn deposit_note_exchange_rate(&self) -> LendyResult<NoteExchangeRate> {
        let lenders_tokens = self
            .total_deposited()?
            .checked_sub(self.uncollected_fees()?)?;
        Ok(NoteExchangeRate::new(
            lenders_tokens,
            Decimal::from_lamports(self.state.total_deposit_notes, self.token_decimals)?,
        )?)
    }

    pub fn loan_note_exchange_rate(&self) -> LendyResult<NoteExchangeRate> {
        Ok(NoteExchangeRate::new(
            self.outstanding_debt()?,
            Decimal::from_lamports(self.state.total_loan_notes, self.token_decimals)?,
        )?)
    }

    pub fn exchange_rate(&self, kind: NoteKind) -> LendyResult<NoteExchangeRate> {
        match kind {
            NoteKind::Deposit => self.deposit_note_exchange_rate(),
            NoteKind::Loan => self.loan_note_exchange_rate(),
        }
    }

    /// Store current exchange rates for off-chain readers
    fn sync_exchange_rates(&mut self) -> LendyResult<()> {
        self.state.deposit_note_exchange_rate = self.deposit_note_exchange_rate()?.0.into_bits()?;
        self.state.loan_note_exchange_rate = self.loan_note_exchange_rate()?.0.into_bits()?;
        Ok(())
    }

    /// Accrue interest, materialize manage fees and update cached prices.
    pub fn refresh(
        &mut self,
        token_price: &OraclePrice,
        nft_floor_price: &OraclePrice,
        clock: &Clock,
    ) -> LendyResult<RefreshResult> {
        let token_price = self.config.validate_price(token_price, clock.slot)?;
        let nft_floor_price = self.config.validate_price(nft_floor_price, clock.slot)?;

        let state = self.accrue_interest(clock.slot, clock.unix_timestamp)?;
        let fee_notes = self.collect_fees()?;

        self.set_market_price(token_price)?;
        self.set_nft_floor_price(nft_floor_price)?;
        self.sync_exchange_rates()?;

        Ok(RefreshResult { state, fee_notes })
    }

    /// Update borrow rate and accrue interest. At most `MAX_ACCRUAL_SLOTS` are accrued per call.
    pub fn accrue_interest(&mut self, current_slot: Slot, timestamp: i64) -> LendyResult<AccrualState> {
        let slots_elapsed = self.last_update.slots_elapsed(current_slot)?;
        let accrual_slots = slots_elapsed.min(MAX_ACCRUAL_SLOTS);

        if accrual_slots > 0 {
            let current_borrow_rate = self.current_borrow_rate()?;
            self.compound_interest(current_borrow_rate, accrual_slots)?;
            self.set_borrow_rate(current_borrow_rate)?;
        }

        if slots_elapsed > MAX_ACCRUAL_SLOTS {
            msg!(
                "accrued {} of {} elapsed slots, reserve needs another refresh",
                accrual_slots,
                slots_elapsed
            );
            self.last_update.advance_partially(accrual_slots)?;
            Ok(AccrualState::ExceptionallyStale)
        } else {
            self.last_update.update(current_slot, timestamp);
            Ok(AccrualState::Current)
        }
    }

    /// Compound current borrow rate continuously over elapsed slots
    fn compound_interest(&mut self, current_borrow_rate: Decimal, slots_elapsed: u64) -> LendyResult<()> {
        let exponent = current_borrow_rate
            .checked_mul(Decimal::from(slots_elapsed))?
            .checked_div(Decimal::from(SLOTS_PER_YEAR))?;

        // Stored Decimals have 18 digits precision. Compounded factor is scaled the same way so
        // the state doesn't depend on precision of intermediate calculations.
        let compounded_interest_rate = Decimal::from_bits(exponent.checked_exp()?.into_bits()?)?;

        let debt = self.outstanding_debt()?;
        let new_debt = debt.checked_mul(compounded_interest_rate)?;
        let interest = new_debt.checked_sub(debt)?;

        if !interest.is_zero() && self.config.manage_fee_rate != 0 {
            let fee = interest
                .checked_mul(Decimal::from_basis_points(self.config.manage_fee_rate as u32)?)?;
            self.set_uncollected_fees(self.uncollected_fees()?.checked_add(fee)?)?;
        }

        self.set_outstanding_debt(new_debt)?;

        Ok(())
    }

    /// Converts whole lamports of uncollected fees into deposit notes once the threshold is
    /// reached. Returns the number of notes to mint into fee note vault.
    pub fn collect_fees(&mut self) -> LendyResult<u64> {
        let fees = self.uncollected_fees()?;
        let fee_tokens = fees.to_lamports_floor(self.token_decimals)?;
        if fee_tokens == 0 || fee_tokens < self.config.manage_fee_collection_threshold {
            return Ok(0);
        }

        let fee_notes = self
            .deposit_note_exchange_rate()?
            .tokens_to_notes(fee_tokens, Rounding::Down)?;
        if fee_notes == 0 {
            return Ok(0);
        }

        self.set_uncollected_fees(
            fees.checked_sub(Decimal::from_lamports(fee_tokens, self.token_decimals)?)?
                .max(Decimal::ZERO),
        )?;
        self.state.total_deposit_notes = checked_add(
            self.state.total_deposit_notes,
            fee_notes,
            "collect_fees(): total_deposit_notes",
        )?;

        Ok(fee_notes)
    }

    /// Record deposited tokens and return tokens to take and deposit notes to mint
    pub fn deposit(&mut self, amount: Amount) -> LendyResult<NoteFlow> {
        let rate = self.deposit_note_exchange_rate()?;
        let flow = match amount.units {
            AmountUnits::Tokens => NoteFlow {
                tokens: amount.value,
                notes: rate.tokens_to_notes(amount.value, Rounding::Down)?,
            },
            AmountUnits::DepositNotes => NoteFlow {
                tokens: rate.notes_to_tokens(amount.value, Rounding::Up)?,
                notes: amount.value,
            },
            AmountUnits::LoanNotes => {
                msg!("deposit amount can not be expressed in loan notes");
                return Err(NftLendyError::InvalidAmountUnits);
            }
        };

        if flow.notes == 0 || flow.tokens == 0 {
            msg!("deposit of {:?} results in zero notes", amount);
            return Err(NftLendyError::InvalidAmount);
        }

        self.state.total_deposits =
            checked_add(self.state.total_deposits, flow.tokens, "deposit(): total_deposits")?;
        self.state.total_deposit_notes = checked_add(
            self.state.total_deposit_notes,
            flow.notes,
            "deposit(): total_deposit_notes",
        )?;
        self.sync_exchange_rates()?;

        Ok(flow)
    }

    /// Record withdrawal and return tokens to give out and deposit notes to burn.
    /// `notes_balance` is used when the whole balance (MAX_AMOUNT) is requested.
    pub fn withdraw(&mut self, amount: Amount, notes_balance: u64) -> LendyResult<NoteFlow> {
        let rate = self.deposit_note_exchange_rate()?;
        let flow = match amount.units {
            AmountUnits::Tokens => NoteFlow {
                tokens: amount.value,
                notes: rate.tokens_to_notes(amount.value, Rounding::Up)?,
            },
            AmountUnits::DepositNotes => {
                let notes = if amount.value == MAX_AMOUNT {
                    notes_balance
                } else {
                    amount.value
                };
                NoteFlow {
                    tokens: rate.notes_to_tokens(notes, Rounding::Down)?,
                    notes,
                }
            }
            AmountUnits::LoanNotes => {
                msg!("withdraw amount can not be expressed in loan notes");
                return Err(NftLendyError::InvalidAmountUnits);
            }
        };

        if flow.notes == 0 || flow.tokens == 0 {
            msg!("withdraw of {:?} results in zero tokens", amount);
            return Err(NftLendyError::InvalidAmount);
        }

        if flow.notes > notes_balance {
            msg!(
                "withdraw needs {} notes but only {} available",
                flow.notes,
                notes_balance
            );
            return Err(NftLendyError::InvalidAmount);
        }

        if flow.tokens > self.state.total_deposits {
            msg!(
                "withdraw amount {} exceeds available liquidity {}",
                flow.tokens,
                self.state.total_deposits
            );
            return Err(NftLendyError::InsufficientLiquidity);
        }

        self.state.total_deposits =
            checked_sub(self.state.total_deposits, flow.tokens, "withdraw(): total_deposits")?;
        self.state.total_deposit_notes = checked_sub(
            self.state.total_deposit_notes,
            flow.notes,
            "withdraw(): total_deposit_notes",
        )?;
        self.sync_exchange_rates()?;

        Ok(flow)
    }

    /// Record new loan. Origination fee is added to the debt and credited to manage fees.
    /// Amount is in tokens only: notes minted depend on the fee and can't be requested directly.
    pub fn borrow(&mut self, amount: Amount) -> LendyResult<CalculateBorrowResult> {
        let tokens = match amount.units {
            AmountUnits::Tokens => amount.value,
            AmountUnits::DepositNotes | AmountUnits::LoanNotes => {
                msg!("borrow amount must be expressed in tokens");
                return Err(NftLendyError::InvalidAmountUnits);
            }
        };
        let rate = self.loan_note_exchange_rate()?;

        if tokens == 0 {
            msg!("borrow amount can not be zero");
            return Err(NftLendyError::InvalidAmount);
        }

        if tokens > self.state.total_deposits {
            msg!(
                "borrow amount {} exceeds available liquidity {}",
                tokens,
                self.state.total_deposits
            );
            return Err(NftLendyError::InsufficientLiquidity);
        }

        let fee = Decimal::from(tokens)
            .checked_mul(Decimal::from_basis_points(
                self.config.loan_origination_fee as u32,
            )?)?
            .ceil()?;
        let debt_tokens = checked_add(tokens, fee, "borrow(): debt_tokens")?;
        let notes = rate.tokens_to_notes(debt_tokens, Rounding::Down)?;

        if notes == 0 {
            msg!("borrow of {} tokens results in zero loan notes", tokens);
            return Err(NftLendyError::InvalidAmount);
        }

        self.state.total_deposits =
            checked_sub(self.state.total_deposits, tokens, "borrow(): total_deposits")?;
        self.state.total_loan_notes =
            checked_add(self.state.total_loan_notes, notes, "borrow(): total_loan_notes")?;
        self.set_outstanding_debt(
            self.outstanding_debt()?
                .checked_add(Decimal::from_lamports(debt_tokens, self.token_decimals)?)?,
        )?;
        self.set_uncollected_fees(
            self.uncollected_fees()?
                .checked_add(Decimal::from_lamports(fee, self.token_decimals)?)?,
        )?;
        self.sync_exchange_rates()?;

        Ok(CalculateBorrowResult { tokens, fee, notes })
    }

    /// Record repayment of the loan holding `position_notes`. Returns tokens to take and loan
    /// notes to burn. Repayment is capped by the whole loan.
    pub fn repay(&mut self, amount: Amount, position_notes: u64) -> LendyResult<NoteFlow> {
        let rate = self.loan_note_exchange_rate()?;
        let notes = match amount.units {
            AmountUnits::Tokens => rate.tokens_to_notes(amount.value, Rounding::Down)?,
            AmountUnits::LoanNotes => amount.value,
            AmountUnits::DepositNotes => {
                msg!("repay amount can not be expressed in deposit notes");
                return Err(NftLendyError::InvalidAmountUnits);
            }
        }
        .min(position_notes);

        let tokens = rate.notes_to_tokens(notes, Rounding::Up)?;
        if notes == 0 || tokens == 0 {
            msg!("repay of {:?} results in zero loan notes", amount);
            return Err(NftLendyError::InvalidAmount);
        }

        self.settle_loan(notes, tokens)?;

        Ok(NoteFlow { tokens, notes })
    }

    /// Burn `notes` paid by `tokens` coming into the vault. Debt is reduced by the exact value
    /// of burned notes so the loan note rate never goes down.
    pub fn settle_loan(&mut self, notes: u64, tokens: u64) -> LendyResult<()> {
        let settled = self.loan_notes_to_tokens(notes)?;

        self.state.total_deposits =
            checked_add(self.state.total_deposits, tokens, "settle_loan(): total_deposits")?;
        self.state.total_loan_notes =
            checked_sub(self.state.total_loan_notes, notes, "settle_loan(): total_loan_notes")?;

        // Last repayment could be slightly bigger (due to rounding) than the debt.
        // Thus don't go negative...
        self.set_outstanding_debt(
            self.outstanding_debt()?
                .checked_sub(settled)?
                .max(Decimal::ZERO),
        )?;
        if self.state.total_loan_notes == 0 {
            self.set_outstanding_debt(Decimal::ZERO)?;
        }
        self.sync_exchange_rates()?;

        Ok(())
    }

    /// Remove the loan without repayment. Lenders absorb the loss. Returns written off tokens.
    pub fn write_off_loan(&mut self, notes: u64) -> LendyResult<Decimal> {
        let written_off = self.loan_notes_to_tokens(notes)?;
        self.state.total_loan_notes = checked_sub(
            self.state.total_loan_notes,
            notes,
            "write_off_loan(): total_loan_notes",
        )?;
        self.set_outstanding_debt(
            self.outstanding_debt()?
                .checked_sub(written_off)?
                .max(Decimal::ZERO),
        )?;
        if self.state.total_loan_notes == 0 {
            self.set_outstanding_debt(Decimal::ZERO)?;
        }
        self.sync_exchange_rates()?;

        Ok(written_off)
    }

    /// Exact (not rounded) amount of tokens represented by loan notes
    pub fn loan_notes_to_tokens(&self, notes: u64) -> LendyResult<Decimal> {
        Ok(self
            .loan_note_exchange_rate()?
            .decimal_notes_to_tokens(Decimal::from_lamports(notes, self.token_decimals)?)?)
    }

    /// Value of the loan in quote currency. Debt is rounded up to whole lamports.
    pub fn loan_value(&self, loan_notes: u64) -> LendyResult<Decimal> {
        let tokens = self
            .loan_note_exchange_rate()?
            .notes_to_tokens(loan_notes, Rounding::Up)?;
        Ok(Decimal::from_lamports(tokens, self.token_decimals)?
            .checked_mul(self.market_price()?)?)
    }

    /// Value of the deposit notes in quote currency. Rounded down to whole lamports.
    pub fn deposit_value(&self, deposit_notes: u64) -> LendyResult<Decimal> {
        let tokens = self
            .deposit_note_exchange_rate()?
            .notes_to_tokens(deposit_notes, Rounding::Down)?;
        Ok(Decimal::from_lamports(tokens, self.token_decimals)?
            .checked_mul(self.market_price()?)?)
    }

    /// Floor price of one NFT expressed in reserve tokens
    pub fn nft_price_in_tokens(&self) -> LendyResult<Decimal> {
        Ok(self.nft_floor_price()?.checked_div(self.market_price()?)?)
    }

    /// Split of bid escrow funds liquidating one NFT of a loan with `loan_notes`.
    /// `bid_available` - the most the bid can pay i.e. min(bid_limit, escrow balance).
    pub fn calculate_liquidation(
        &self,
        loan_notes: u64,
        bid_available: u64,
    ) -> LendyResult<CalculateLiquidationResult> {
        let loan_rate = self.loan_note_exchange_rate()?;
        let debt = loan_rate.notes_to_tokens(loan_notes, Rounding::Up)?;

        let premium = Decimal::from_basis_points(self.config.liquidation_premium as u32)?;
        let discount = Decimal::ONE.checked_sub(premium)?;

        // Debt plus liquidation fee
        let value_to_cover = Decimal::from(debt).checked_div(discount)?.ceil()?;
        // Discounted price of the NFT
        let nft_price = self
            .nft_price_in_tokens()?
            .checked_mul(discount)?
            .to_lamports_floor(self.token_decimals)?;

        if debt == 0 || nft_price == 0 {
            msg!(
                "nothing to liquidate: debt {}, collateral price {}",
                debt,
                nft_price
            );
            return Err(NftLendyError::CollateralValueTooSmall);
        }

        let drawn = bid_available.min(value_to_cover.max(nft_price));
        let required = value_to_cover.min(nft_price);
        if drawn < required {
            msg!(
                "bid can pay {} but liquidation requires at least {}",
                drawn,
                required
            );
            return Err(NftLendyError::LiquidationLowCollateral);
        }

        let covered = drawn.min(value_to_cover);
        let repaid = Decimal::from(covered)
            .checked_mul(discount)?
            .floor()?
            .min(debt);
        if repaid == 0 {
            msg!("liquidation repays nothing");
            return Err(NftLendyError::CollateralValueTooSmall);
        }

        let settled_notes = match repaid.cmp(&debt) {
            Ordering::Less => loan_rate
                .tokens_to_notes(repaid, Rounding::Down)?
                .min(loan_notes),
            Ordering::Equal | Ordering::Greater => loan_notes,
        };

        Ok(CalculateLiquidationResult {
            drawn,
            repaid,
            fee: checked_sub(covered, repaid, "calculate_liquidation(): fee")?,
            leftover: checked_sub(drawn, covered, "calculate_liquidation(): leftover")?,
            settled_notes,
        })
    }
}

impl ReserveConfig {
    /// Validate the reserve configs, when initializing or modifying the reserve
    /// configs
    pub fn validate(&self) -> LendyResult<()> {
        if self.utilization_rate_1 >= self.utilization_rate_2 || self.utilization_rate_2 >= 10_000
        {
            msg!("utilization rates must satisfy utilization_rate_1 < utilization_rate_2 < 100 %");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.borrow_rate_0 > self.borrow_rate_1
            || self.borrow_rate_1 > self.borrow_rate_2
            || self.borrow_rate_2 > self.borrow_rate_3
        {
            msg!("borrow rates must be non decreasing");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.min_collateral_ratio < 10_000 {
            msg!("min_collateral_ratio must be at least 100 %");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.liquidation_premium > 5_000 {
            msg!("liquidation_premium must be in range [0, 50] %");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.manage_fee_rate > 5_000 {
            msg!("manage_fee_rate must be in range [0, 50] %");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.loan_origination_fee > 1_000 {
            msg!("loan_origination_fee must be in range [0, 10] %");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.price_stale_threshold_slots == 0 {
            msg!("price_stale_threshold_slots can't be zero");
            return Err(NftLendyError::InvalidConfig);
        }

        if self.max_price_confidence_bps == 0 || self.max_price_confidence_bps > 10_000 {
            msg!("max_price_confidence_bps must be in range (0, 100] %");
            return Err(NftLendyError::InvalidConfig);
        }

        Ok(())
    }

    /// Annual borrow rate at given utilization. Linear interpolation within one of three segments.
    pub fn borrow_rate(&self, utilization: Decimal) -> MathResult<Decimal> {
        let utilization = utilization.min(Decimal::ONE);
        let utilization_1 = Decimal::from_basis_points(self.utilization_rate_1 as u32)?;
        let utilization_2 = Decimal::from_basis_points(self.utilization_rate_2 as u32)?;
        let rate = |bps: u16| Decimal::from_basis_points(bps as u32);

        let (start_utilization, end_utilization, start_rate, end_rate) =
            if utilization < utilization_1 {
                (
                    Decimal::ZERO,
                    utilization_1,
                    rate(self.borrow_rate_0)?,
                    rate(self.borrow_rate_1)?,
                )
            } else if utilization < utilization_2 {
                (
                    utilization_1,
                    utilization_2,
                    rate(self.borrow_rate_1)?,
                    rate(self.borrow_rate_2)?,
                )
            } else {
                (
                    utilization_2,
                    Decimal::ONE,
                    rate(self.borrow_rate_2)?,
                    rate(self.borrow_rate_3)?,
                )
            };

        let segment_share = utilization
            .checked_sub(start_utilization)?
            .checked_div(end_utilization.checked_sub(start_utilization)?)?;

        start_rate.checked_add(end_rate.checked_sub(start_rate)?.checked_mul(segment_share)?)
    }

    /// Checks oracle price and returns it as Decimal
    pub fn validate_price(&self, price: &OraclePrice, current_slot: Slot) -> LendyResult<Decimal> {
        if price.price <= Decimal::ZERO {
            msg!("oracle price {} is not positive", price.price);
            return Err(NftLendyError::InvalidOraclePrice);
        }

        if price.publish_slot > current_slot {
            msg!(
                "oracle price is published in future slot {} (current {})",
                price.publish_slot,
                current_slot
            );
            return Err(NftLendyError::InvalidOraclePrice);
        }

        let age = current_slot - price.publish_slot;
        if age > self.price_stale_threshold_slots as u64 {
            msg!(
                "oracle price age {} slots reached stale threshold {} slots",
                age,
                self.price_stale_threshold_slots
            );
            return Err(NftLendyError::InvalidOraclePrice);
        }

        let max_confidence = price.price.checked_mul(Decimal::from_basis_points(
            self.max_price_confidence_bps as u32,
        )?)?;
        if price.confidence > max_confidence {
            msg!(
                "oracle confidence {} is wider than allowed {}",
                price.confidence,
                max_confidence
            );
            return Err(NftLendyError::InvalidOraclePrice);
        }

        Ok(price.price)
    }
}

/// Part of total deposited liquidity which is borrowed
pub fn utilization_rate(total_deposited: Decimal, outstanding_debt: Decimal) -> MathResult<Decimal> {
    if total_deposited == Decimal::ZERO || outstanding_debt == Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    outstanding_debt.checked_div(total_deposited)
}

fn checked_add(a: u64, b: u64, context: &str) -> LendyResult<u64> {
    a.checked_add(b)
        .ok_or_else(|| MathError(format!("{}: checked_add {} + {}", context, a, b)).into())
}

fn checked_sub(a: u64, b: u64, context: &str) -> LendyResult<u64> {
    a.checked_sub(b).ok_or_else(|| {
        NftLendyError::ArithmeticError(format!("{}: checked_sub {} - {}", context, a, b))
    })
}
