use borsh::io::Error as BorshIoError;
use solana_program::program_error::ProgramError;
use solana_program::program_error::ProgramError::Custom;
use solana_program::pubkey::{Pubkey, PubkeyError};
use spl_token::error::TokenError;
use thiserror::Error;

use crate::account::PodAccountError;
use crate::math::MathError;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("borsh: {0}")]
    Borsh(#[from] BorshIoError),
    #[error("not enough data")]
    NotEnoughData,
    #[error("version mismatch: {actual} != {expected}")]
    VersionMismatch { expected: u8, actual: u8 },
}

#[derive(Debug, Error)]
#[error("invalid {key_type} key {actual}, expected {expected}")]
pub struct InvalidKey {
    pub key_type: &'static str,
    pub actual: Pubkey,
    pub expected: Pubkey,
}

#[derive(Debug, Error)]
pub enum NftLendyError {
    #[error("math overflow: {0}")]
    MathOverflow(#[from] MathError),

    #[error("arithmetic error: {0}")]
    ArithmeticError(String),

    #[error("borsh error: {0}")]
    Borsh(#[from] BorshIoError),

    #[error("serialize error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("pod account: {0}")]
    PodAccount(#[from] PodAccountError),

    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),

    #[error("not enough account keys")]
    NotEnoughAccountKeys,

    #[error("missing signature for {0}")]
    MissingSignature(&'static str),

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("address creation error: {0}")]
    AddressCreation(#[from] PubkeyError),

    #[error("invalid config")]
    InvalidConfig,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("amount units do not match the operation")]
    InvalidAmountUnits,

    #[error("internal logic error: {0}")]
    Internal(String),

    #[error("reserve is not refreshed for the current slot")]
    ExceptionalReserveState,

    #[error("signer is not the market owner")]
    InvalidMarketAuthority,

    #[error("signer is not authorized for this account")]
    InvalidAuthority,

    #[error("nft collection creator is not verified")]
    VerifiedCreatorMismatch,

    #[error("nft metadata account is invalid")]
    InvalidMetadata,

    #[error("nft metadata can not be decoded")]
    BadMetadata,

    #[error("programmable nft transfer rejected by ruleset")]
    BadRuleset,

    #[error("no free reserve slots in the market")]
    NoFreeReserves,

    #[error("no free slots in the obligation")]
    NoFreeObligation,

    #[error("collateral is not enough for the requested borrow")]
    InsufficientCollateral,

    #[error("reserve liquidity is not enough")]
    InsufficientLiquidity,

    #[error("obligation is healthy")]
    ObligationHealthy,

    #[error("obligation would become unhealthy")]
    ObligationUnhealthy,

    #[error("position is not registered in the obligation")]
    UnregisteredPosition,

    #[error("provided account does not match the obligation")]
    ObligationAccountMismatch,

    #[error("position is not empty")]
    PositionNotEmpty,

    #[error("account is not empty")]
    AccountNotEmptyError,

    #[error("market operation is halted")]
    MarketHalted,

    #[error("operation is not allowed in the current state")]
    Disallowed,

    #[error("operation is not supported")]
    NotSupported,

    #[error("nft is already deposited as collateral")]
    NftCollateralExists,

    #[error("another loan is outstanding")]
    AnotherLoanOutstanding,

    #[error("can not deposit and borrow in the same reserve")]
    SimultaneousDepositAndBorrow,

    #[error("bid mint does not match reserve token mint")]
    BidMintMismatch,

    #[error("bid does not cover liquidation of the collateral")]
    LiquidationLowCollateral,

    #[error("collateral value is too small to liquidate")]
    CollateralValueTooSmall,

    #[error("oracle account is invalid")]
    InvalidOracle,

    #[error("oracle price is invalid")]
    InvalidOraclePrice,

    #[error("spl-token error: {0}")]
    SplToken(#[from] TokenError),

    #[error("cross program call failed: {0}")]
    ProgramCall(ProgramError),

    #[error("error unpacking account {0} with error {1}")]
    AccountUnpackError(Pubkey, ProgramError),
}

impl From<NftLendyError> for ProgramError {
    fn from(error: NftLendyError) -> Self {
        match error {
            NftLendyError::MathOverflow(..) => Custom(0),
            NftLendyError::ArithmeticError(..) => Custom(1),
            NftLendyError::Borsh(..) => Custom(2),
            NftLendyError::Serialize(..) => Custom(3),
            NftLendyError::PodAccount(..) => Custom(4),
            NftLendyError::InvalidKey(..) => Custom(5),
            NftLendyError::NotEnoughAccountKeys => Custom(6),
            NftLendyError::MissingSignature(..) => Custom(7),
            NftLendyError::AccountNotFound(..) => Custom(8),
            NftLendyError::AddressCreation(..) => Custom(9),
            NftLendyError::InvalidConfig => Custom(10),
            NftLendyError::InvalidAmount => Custom(11),
            NftLendyError::InvalidAmountUnits => Custom(12),
            NftLendyError::Internal(..) => Custom(13),
            NftLendyError::ExceptionalReserveState => Custom(14),
            NftLendyError::InvalidMarketAuthority => Custom(15),
            NftLendyError::InvalidAuthority => Custom(16),
            NftLendyError::VerifiedCreatorMismatch => Custom(17),
            NftLendyError::InvalidMetadata => Custom(18),
            NftLendyError::BadMetadata => Custom(19),
            NftLendyError::BadRuleset => Custom(20),
            NftLendyError::NoFreeReserves => Custom(21),
            NftLendyError::NoFreeObligation => Custom(22),
            NftLendyError::InsufficientCollateral => Custom(23),
            NftLendyError::InsufficientLiquidity => Custom(24),
            NftLendyError::ObligationHealthy => Custom(25),
            NftLendyError::ObligationUnhealthy => Custom(26),
            NftLendyError::UnregisteredPosition => Custom(27),
            NftLendyError::ObligationAccountMismatch => Custom(28),
            NftLendyError::PositionNotEmpty => Custom(29),
            NftLendyError::AccountNotEmptyError => Custom(30),
            NftLendyError::MarketHalted => Custom(31),
            NftLendyError::Disallowed => Custom(32),
            NftLendyError::NotSupported => Custom(33),
            NftLendyError::NftCollateralExists => Custom(34),
            NftLendyError::AnotherLoanOutstanding => Custom(35),
            NftLendyError::SimultaneousDepositAndBorrow => Custom(36),
            NftLendyError::BidMintMismatch => Custom(37),
            NftLendyError::LiquidationLowCollateral => Custom(38),
            NftLendyError::CollateralValueTooSmall => Custom(39),
            NftLendyError::InvalidOracle => Custom(40),
            NftLendyError::InvalidOraclePrice => Custom(41),
            NftLendyError::AccountUnpackError(..) => Custom(42),

            NftLendyError::SplToken(err) => err.into(),
            NftLendyError::ProgramCall(err) => err,
        }
    }
}
