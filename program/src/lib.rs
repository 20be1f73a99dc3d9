pub mod account;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod instruction;
pub mod math;
#[cfg(feature = "with-processor")]
pub mod processor;
#[cfg(feature = "with-processor")]
pub mod remote;
pub mod state;

pub mod pda;

#[cfg(all(feature = "with-processor", not(feature = "no-entrypoint")))]
pub mod entrypoint;

// Symbolize max available amount (to withdraw, repay, etc.). Recognized as special amount value
// by many IXes and internal functions. This is useful when User want's to operate on whole token amount.
pub const MAX_AMOUNT: u64 = u64::MAX;

pub use lendy_id::ID as NFT_LENDY_ID;
mod lendy_id {
    solana_program::declare_id!("6e4maV5GjMSETVH3yuG2Uc8tzuUPEJoxYf3wdy4jqX2F");
}

/// Program publishing price feeds read by reserves
pub use price_proxy_id::ID as PRICE_PROXY_ID;
mod price_proxy_id {
    solana_program::declare_id!("priceEvKXX3KERsitDpmvujXfPFYesmEspw4kiC3ryF");
}

/// Rule set program of programmable NFTs
pub use auth_rules_id::ID as MPL_TOKEN_AUTH_RULES_ID;
mod auth_rules_id {
    solana_program::declare_id!("auth9SigNpDKz4sJJ1DfCTuZrZNSAgh9sFD3rboVmgg");
}

pub type LendyResult<T> = std::result::Result<T, error::NftLendyError>;
