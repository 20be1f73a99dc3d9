//! Amounts crossing instruction boundary and their conversion between tokens and notes.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::msg;

use crate::error::NftLendyError;
use crate::math::{CheckedDiv, CheckedMul, Decimal, MathResult};
use crate::LendyResult;

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountUnits {
    Tokens,
    DepositNotes,
    LoanNotes,
}

/// Quantity tagged with its units
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Amount {
    pub units: AmountUnits,
    pub value: u64,
}

/// Kind of notes Reserve issues
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteKind {
    /// Share of Reserve's liquidity owned by lenders
    Deposit,
    /// Share of Reserve's outstanding debt owed by borrowers
    Loan,
}

impl NoteKind {
    pub fn units(self) -> AmountUnits {
        match self {
            NoteKind::Deposit => AmountUnits::DepositNotes,
            NoteKind::Loan => AmountUnits::LoanNotes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// Amount of tokens one note is worth
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteExchangeRate(pub Decimal);

impl NoteExchangeRate {
    /// `total_tokens` and `total_notes` must be expressed with the same decimals. Until first
    /// notes are issued one note is worth one token.
    pub fn new(total_tokens: Decimal, total_notes: Decimal) -> MathResult<Self> {
        if total_notes.is_zero() {
            return Ok(Self(Decimal::ONE));
        }
        Ok(Self(total_tokens.checked_div(total_notes)?))
    }

    pub fn notes_to_tokens(&self, notes: u64, rounding: Rounding) -> MathResult<u64> {
        round(self.decimal_notes_to_tokens(Decimal::from(notes))?, rounding)
    }

    pub fn decimal_notes_to_tokens(&self, notes: Decimal) -> MathResult<Decimal> {
        notes.checked_mul(self.0)
    }

    pub fn tokens_to_notes(&self, tokens: u64, rounding: Rounding) -> MathResult<u64> {
        round(Decimal::from(tokens).checked_div(self.0)?, rounding)
    }
}

impl From<NoteExchangeRate> for Decimal {
    fn from(exchange_rate: NoteExchangeRate) -> Self {
        exchange_rate.0
    }
}

fn round(value: Decimal, rounding: Rounding) -> MathResult<u64> {
    match rounding {
        Rounding::Down => value.floor(),
        Rounding::Up => value.ceil(),
    }
}

impl Amount {
    pub fn tokens(value: u64) -> Self {
        Self {
            units: AmountUnits::Tokens,
            value,
        }
    }

    pub fn deposit_notes(value: u64) -> Self {
        Self {
            units: AmountUnits::DepositNotes,
            value,
        }
    }

    pub fn loan_notes(value: u64) -> Self {
        Self {
            units: AmountUnits::LoanNotes,
            value,
        }
    }

    pub fn notes(kind: NoteKind, value: u64) -> Self {
        Self {
            units: kind.units(),
            value,
        }
    }

    /// Express the amount in `kind` notes.
    pub fn to_notes(
        self,
        rate: &NoteExchangeRate,
        kind: NoteKind,
        rounding: Rounding,
    ) -> LendyResult<Amount> {
        self.expect_kind(kind)?;
        match self.units {
            AmountUnits::Tokens => Ok(Amount::notes(
                kind,
                rate.tokens_to_notes(self.value, rounding)?,
            )),
            AmountUnits::DepositNotes | AmountUnits::LoanNotes => Ok(self),
        }
    }

    /// Express the amount in tokens. Notes must be of the `kind`.
    pub fn to_tokens(
        self,
        rate: &NoteExchangeRate,
        kind: NoteKind,
        rounding: Rounding,
    ) -> LendyResult<Amount> {
        self.expect_kind(kind)?;
        match self.units {
            AmountUnits::Tokens => Ok(self),
            AmountUnits::DepositNotes | AmountUnits::LoanNotes => Ok(Amount::tokens(
                rate.notes_to_tokens(self.value, rounding)?,
            )),
        }
    }

    fn expect_kind(&self, kind: NoteKind) -> LendyResult<()> {
        if self.units != AmountUnits::Tokens && self.units != kind.units() {
            msg!("amount in {:?} can not be used as {:?}", self.units, kind);
            return Err(NftLendyError::InvalidAmountUnits);
        }
        Ok(())
    }
}
