//! Fixed point math used by all on-chain accounting.
//!
//! `Decimal` wraps `rust_decimal::Decimal`. Values kept in accounts are stored as `i128` mantissas
//! with a fixed scale of 18, which is wider than the 96 bit mantissa of `rust_decimal` (see [`Decimal::into_bits`] / [`Decimal::from_bits`]).

use std::fmt::{Display, Formatter};

use rust_decimal::prelude::{MathematicalOps, ToPrimitive};
use rust_decimal::RoundingStrategy;
use thiserror::Error;

/// Scale (digits past delimiter) of Decimals stored in accounts.
pub const SCALE: u32 = 18;

/// Largest mantissa of `rust_decimal::Decimal` (2^96 - 1)
const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MathError(pub String);

pub type MathResult<T> = Result<T, MathError>;

pub trait CheckedAdd: Sized {
    fn checked_add(self, rhs: Self) -> MathResult<Self>;
}

pub trait CheckedSub: Sized {
    fn checked_sub(self, rhs: Self) -> MathResult<Self>;
}

pub trait CheckedMul: Sized {
    fn checked_mul(self, rhs: Self) -> MathResult<Self>;
}

pub trait CheckedDiv: Sized {
    fn checked_div(self, rhs: Self) -> MathResult<Self>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(rust_decimal::Decimal);

impl Decimal {
    pub const ZERO: Decimal = Decimal(rust_decimal::Decimal::ZERO);
    pub const ONE: Decimal = Decimal(rust_decimal::Decimal::ONE);

    pub fn from_i128_with_scale(num: i128, scale: u32) -> MathResult<Self> {
        rust_decimal::Decimal::try_from_i128_with_scale(num, scale)
            .map(Decimal)
            .map_err(|err| {
                MathError(format!(
                    "from_i128_with_scale(): {} with scale {}: {}",
                    num, scale, err
                ))
            })
    }

    /// Token amount in smallest units (lamports) to the Decimal amount of whole tokens.
    pub fn from_lamports(amount: u64, decimals: u8) -> MathResult<Self> {
        Self::from_i128_with_scale(amount as i128, decimals as u32)
    }

    /// 1 bps = 0.0001
    pub fn from_basis_points(bps: u32) -> MathResult<Self> {
        Self::from_i128_with_scale(bps as i128, 4)
    }

    /// Reads the value stored in account with scale 18. Mantissas wider than 96 bits are
    /// truncated to fit.
    pub fn from_bits(bits: i128) -> MathResult<Self> {
        let mut mantissa = bits;
        let mut scale = SCALE;
        while mantissa.unsigned_abs() > MAX_MANTISSA && scale > 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self::from_i128_with_scale(mantissa, scale)
    }

    /// Representation for storing in account. Digits past 18th are truncated. Values up to
    /// ~1.7e20 whole tokens fit.
    pub fn into_bits(self) -> MathResult<i128> {
        let value = self
            .0
            .round_dp_with_strategy(SCALE, RoundingStrategy::ToZero);
        let overflow = || {
            MathError(format!(
                "into_bits(): {} can not be represented with scale {}",
                self.0, SCALE
            ))
        };
        10i128
            .checked_pow(SCALE - value.scale())
            .and_then(|multiplier| value.mantissa().checked_mul(multiplier))
            .ok_or_else(overflow)
    }

    pub fn to_lamports_floor(self, decimals: u8) -> MathResult<u64> {
        self.to_lamports(decimals, RoundingStrategy::ToNegativeInfinity)
    }

    pub fn to_lamports_ceil(self, decimals: u8) -> MathResult<u64> {
        self.to_lamports(decimals, RoundingStrategy::ToPositiveInfinity)
    }

    pub fn to_lamports_round(self, decimals: u8) -> MathResult<u64> {
        self.to_lamports(decimals, RoundingStrategy::MidpointAwayFromZero)
    }

    fn to_lamports(self, decimals: u8, strategy: RoundingStrategy) -> MathResult<u64> {
        let multiplier = 10u64.checked_pow(decimals as u32).ok_or(MathError(format!(
            "to_lamports(): 10^{} overflow",
            decimals
        )))?;
        self.checked_mul(Decimal::from(multiplier))?
            .round_to_u64(strategy)
    }

    /// Integer part rounded down
    pub fn floor(self) -> MathResult<u64> {
        self.round_to_u64(RoundingStrategy::ToNegativeInfinity)
    }

    /// Integer part rounded up
    pub fn ceil(self) -> MathResult<u64> {
        self.round_to_u64(RoundingStrategy::ToPositiveInfinity)
    }

    fn round_to_u64(self, strategy: RoundingStrategy) -> MathResult<u64> {
        let rounded = self.0.round_dp_with_strategy(0, strategy);
        rounded.to_u64().ok_or(MathError(format!(
            "round_to_u64(): {} does not fit u64",
            rounded
        )))
    }

    pub fn checked_pow(self, exp: u64) -> MathResult<Self> {
        self.0
            .checked_powu(exp)
            .map(Decimal)
            .ok_or(MathError(format!("checked_pow(): {} ^ {}", self.0, exp)))
    }

    /// e^self
    pub fn checked_exp(self) -> MathResult<Self> {
        self.0
            .checked_exp()
            .map(Decimal)
            .ok_or(MathError(format!("checked_exp(): e ^ {}", self.0)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Decimal(rust_decimal::Decimal::from(value))
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl CheckedAdd for Decimal {
    fn checked_add(self, rhs: Self) -> MathResult<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Decimal)
            .ok_or(MathError(format!("checked_add(): {} + {}", self.0, rhs.0)))
    }
}

impl CheckedSub for Decimal {
    fn checked_sub(self, rhs: Self) -> MathResult<Self> {
        self.0
            .checked_sub(rhs.0)
            .map(Decimal)
            .ok_or(MathError(format!("checked_sub(): {} - {}", self.0, rhs.0)))
    }
}

impl CheckedMul for Decimal {
    fn checked_mul(self, rhs: Self) -> MathResult<Self> {
        self.0
            .checked_mul(rhs.0)
            .map(Decimal)
            .ok_or(MathError(format!("checked_mul(): {} * {}", self.0, rhs.0)))
    }
}

impl CheckedDiv for Decimal {
    fn checked_div(self, rhs: Self) -> MathResult<Self> {
        self.0
            .checked_div(rhs.0)
            .map(Decimal)
            .ok_or(MathError(format!("checked_div(): {} / {}", self.0, rhs.0)))
    }
}
