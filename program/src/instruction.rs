use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::pubkey::Pubkey;

use crate::collaborators::AuthorizationData;
use crate::error::NftLendyError;
use crate::state::amount::Amount;
use crate::state::market::MarketParams;
use crate::state::reserve::ReserveConfig;
use crate::{LendyResult, NFT_LENDY_ID};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq)]
pub enum NftLendyInstruction {
    // 0
    /// Create Market account. Accounts: [InitMarketAccounts]
    InitMarket { params: MarketParams },

    // 1
    /// Change Market config (except owner). Accounts: [AlterMarketAccounts]
    AlterMarket { params: MarketParams },

    // 2
    /// Accounts: [TransferMarketOwnershipAccounts]
    TransferMarketOwnership,

    // 3
    /// Create Reserve and register it in the Market. Accounts: [InitReserveAccounts]
    InitReserve { config: ReserveConfig },

    // 4
    /// Accounts: [AlterReserveAccounts]
    AlterReserve { config: ReserveConfig },

    // 5
    /// Accrue interest and update prices. Accounts: [RefreshReserveAccounts]
    RefreshReserve,

    // 6
    /// Accounts: [InitObligationAccounts]
    InitObligation,

    // 7
    /// Accounts: [CloseObligationAccounts]
    CloseObligation,

    // 8
    /// Deposit tokens into the Reserve receiving deposit notes.
    /// Accounts: [DepositTokensAccounts]
    DepositTokens { amount: Amount },

    // 9
    /// Burn deposit notes receiving tokens. Accounts: [WithdrawTokensAccounts]
    WithdrawTokens { amount: Amount },

    // 10
    /// Lock deposit notes in the obligation as collateral.
    /// Accounts: [DepositCollateralAccounts]
    DepositCollateral { amount: Amount },

    // 11
    /// Accounts: [WithdrawCollateralAccounts] followed by the obligation's loan reserve
    WithdrawCollateral { amount: Amount },

    // 12
    /// Lock NFT of the Market's collection. Accounts: [NftAccounts]
    DepositNft,

    // 13
    /// Lock programmable NFT of the Market's collection.
    /// Accounts: [NftAccounts], [PnftAccounts], rule set when `rules_acc_present`
    DepositPnft {
        authorization_data: Option<AuthorizationData>,
        rules_acc_present: bool,
    },

    // 14
    /// Accounts: [WithdrawNftAccounts] followed by the obligation's loan reserve
    WithdrawNft,

    // 15
    /// Accounts: [WithdrawNftAccounts], [PnftAccounts], rule set when `rules_acc_present`,
    /// the obligation's loan reserve
    WithdrawPnft {
        authorization_data: Option<AuthorizationData>,
        rules_acc_present: bool,
    },

    // 16
    /// Borrow `amount` of tokens. Amounts in notes are rejected with `InvalidAmountUnits`:
    /// loan notes minted cover the origination fee as well.
    /// Accounts: [BorrowAccounts] followed by reserves of deposit collateral
    Borrow { amount: Amount },

    // 17
    /// Accounts: [RepayAccounts]
    Repay { amount: Amount },

    // 18
    /// Create bid and put `escrow_deposit` tokens into its escrow.
    /// Accounts: [PlaceBidAccounts]
    PlaceBid {
        bid_limit: u64,
        escrow_deposit: u64,
        /// Bump of the bid escrow authority
        authority_bump: u8,
    },

    // 19
    /// Accounts: [IncreaseBidAccounts]
    IncreaseBid { bid_increase: u64 },

    // 20
    /// Return escrowed tokens and close the bid. Accounts: [RevokeBidAccounts]
    RevokeBid,

    // 21
    /// Sell NFT collateral of unhealthy obligation to the bid.
    /// Accounts: [ExecuteLiquidateBidAccounts] followed by reserves of deposit collateral
    ExecuteLiquidateBid,

    // 22
    /// Accounts: [ExecuteLiquidateBidAccounts], [PnftAccounts], rule set when
    /// `rules_acc_present`, reserves of deposit collateral
    ExecuteLiquidatePnftBid {
        authorization_data: Option<AuthorizationData>,
        rules_acc_present: bool,
    },

    // 23
    /// Write off the loan of unhealthy obligation and claim its NFT.
    /// Accounts: [LiquidateSolventAccounts], reserves of deposit collateral. Programmable NFT
    /// takes [PnftAccounts] and its rule set (when it has one) before the reserves.
    LiquidateSolvent,

    // 24
    /// Claim remaining NFT of solvent liquidated obligation.
    /// Accounts: [WithdrawNftSolventAccounts]. Programmable NFT takes [PnftAccounts] and its
    /// rule set (when it has one) after them.
    WithdrawNftSolvent,

    // 25
    /// Logs program version. Fails unless `no_error` is set.
    Version { no_error: bool },
}

macro_rules! account_meta {
    ($key:expr, readonly) => {
        AccountMeta::new_readonly($key, false)
    };
    ($key:expr, writable) => {
        AccountMeta::new($key, false)
    };
    ($key:expr, signer) => {
        AccountMeta::new_readonly($key, true)
    };
    ($key:expr, writable_signer) => {
        AccountMeta::new($key, true)
    };
}

/// Declares struct with keys of instruction accounts in the order they are passed
macro_rules! instruction_accounts {
    ($(
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $access:ident
            ),* $(,)?
        }
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: Pubkey,
            )*
        }

        impl $name {
            pub fn from_iter<'a>(iter: &mut impl Iterator<Item = &'a Pubkey>) -> LendyResult<Self> {
                Ok(Self {
                    $(
                        $field: *iter.next().ok_or(NftLendyError::NotEnoughAccountKeys)?,
                    )*
                })
            }

            pub fn to_vec(&self) -> Vec<Pubkey> {
                vec![$(self.$field),*]
            }

            pub fn to_account_metas(&self) -> Vec<AccountMeta> {
                vec![$(account_meta!(self.$field, $access)),*]
            }
        }
    )*};
}

instruction_accounts! {
    pub struct InitMarketAccounts {
        /// New Market account
        market: writable_signer,
        /// Market owner. Funds the account.
        owner: writable_signer,
    }

    pub struct AlterMarketAccounts {
        market: writable,
        owner: signer,
    }

    pub struct TransferMarketOwnershipAccounts {
        market: writable,
        owner: signer,
        new_owner: signer,
    }

    pub struct InitReserveAccounts {
        /// New Reserve account
        reserve: writable_signer,
        market: writable,
        owner: writable_signer,
        token_mint: readonly,
        /// Token account of `token_mint` owned by market authority
        vault: readonly,
        /// Deposit notes account owned by market authority
        fee_note_vault: readonly,
        /// Mint with market authority as mint authority and decimals of `token_mint`
        deposit_note_mint: readonly,
        loan_note_mint: readonly,
        price_feed: readonly,
        nft_price_feed: readonly,
        market_authority: readonly,
    }

    pub struct AlterReserveAccounts {
        reserve: writable,
        market: readonly,
        owner: signer,
    }

    pub struct RefreshReserveAccounts {
        reserve: writable,
        price_feed: readonly,
        nft_price_feed: readonly,
        deposit_note_mint: writable,
        fee_note_vault: writable,
        market_authority: readonly,
    }

    pub struct InitObligationAccounts {
        /// Obligation PDA to create
        obligation: writable,
        market: readonly,
        owner: writable_signer,
    }

    pub struct CloseObligationAccounts {
        obligation: writable,
        /// Receives obligation's funds
        owner: writable_signer,
    }

    pub struct DepositTokensAccounts {
        depositor: signer,
        source_wallet: writable,
        destination_note_wallet: writable,
        reserve: writable,
        vault: writable,
        deposit_note_mint: writable,
        market: readonly,
        market_authority: readonly,
    }

    pub struct WithdrawTokensAccounts {
        owner: signer,
        source_note_wallet: writable,
        destination_wallet: writable,
        reserve: writable,
        vault: writable,
        deposit_note_mint: writable,
        market: readonly,
        market_authority: readonly,
    }

    pub struct DepositCollateralAccounts {
        /// Funds the collateral account
        owner: writable_signer,
        obligation: writable,
        reserve: readonly,
        deposit_note_mint: readonly,
        source_note_wallet: writable,
        /// Deposit notes account derived from the reserve and obligation
        collateral_account: writable,
        market: readonly,
    }

    pub struct WithdrawCollateralAccounts {
        owner: signer,
        obligation: writable,
        reserve: readonly,
        collateral_account: writable,
        destination_note_wallet: writable,
        market: readonly,
        market_authority: readonly,
    }

    pub struct NftAccounts {
        /// Funds the NFT vault
        owner: writable_signer,
        obligation: writable,
        market: readonly,
        nft_mint: readonly,
        /// Metaplex metadata of `nft_mint`
        nft_metadata: writable,
        source_nft_wallet: writable,
        /// NFT account derived from the obligation and the mint
        nft_collateral_vault: writable,
        market_authority: readonly,
    }

    pub struct WithdrawNftAccounts {
        /// Receives NFT vault funds
        owner: writable_signer,
        obligation: writable,
        market: readonly,
        nft_mint: readonly,
        nft_metadata: writable,
        nft_collateral_vault: writable,
        destination_nft_wallet: writable,
        market_authority: readonly,
    }

    pub struct BorrowAccounts {
        /// Funds the loan account
        owner: writable_signer,
        obligation: writable,
        reserve: writable,
        vault: writable,
        loan_note_mint: writable,
        /// Loan notes account derived from the reserve and obligation
        loan_account: writable,
        destination_wallet: writable,
        market: readonly,
        market_authority: readonly,
    }

    pub struct RepayAccounts {
        payer: signer,
        obligation: writable,
        reserve: writable,
        vault: writable,
        loan_note_mint: writable,
        loan_account: writable,
        source_wallet: writable,
        market: readonly,
        market_authority: readonly,
    }

    pub struct PlaceBidAccounts {
        /// Funds the bid account
        bidder: writable_signer,
        /// Bid PDA to create
        bid: writable,
        market: readonly,
        /// Reserve the bid will repay loans to
        reserve: readonly,
        bid_mint: readonly,
        source_wallet: writable,
        /// Token account of `bid_mint` derived from the bid and owned by `bid_escrow_authority`
        bid_escrow: writable,
        bid_escrow_authority: readonly,
    }

    pub struct IncreaseBidAccounts {
        bidder: signer,
        bid: writable,
        source_wallet: writable,
        bid_escrow: writable,
    }

    pub struct RevokeBidAccounts {
        bidder: writable_signer,
        bid: writable,
        bid_escrow: writable,
        destination_wallet: writable,
        bid_escrow_authority: readonly,
    }

    pub struct ExecuteLiquidateBidAccounts {
        /// Receives NFT vault funds
        executor: writable_signer,
        market: readonly,
        obligation: writable,
        reserve: writable,
        vault: writable,
        loan_note_mint: writable,
        loan_account: writable,
        bid: writable,
        bid_escrow: writable,
        bid_escrow_authority: readonly,
        /// Receives bid account funds when the bid is drained
        bidder: writable,
        /// Associated token account of the bidder for the bid mint. Receives tokens left in
        /// the escrow of the drained bid.
        bidder_wallet: writable,
        nft_mint: readonly,
        nft_metadata: writable,
        nft_collateral_vault: writable,
        /// Associated token account of the bidder for `nft_mint`
        bidder_nft_wallet: writable,
        /// Associated token account of the market owner for reserve's token
        liquidation_fee_receiver: writable,
        /// Associated token account of the obligation owner for reserve's token
        leftovers_receiver: writable,
        market_authority: readonly,
    }

    pub struct LiquidateSolventAccounts {
        /// Receives NFT vault funds
        executor: writable_signer,
        market: readonly,
        obligation: writable,
        reserve: writable,
        loan_note_mint: writable,
        loan_account: writable,
        nft_mint: readonly,
        nft_metadata: writable,
        nft_collateral_vault: writable,
        executor_nft_wallet: writable,
        market_authority: readonly,
    }

    pub struct WithdrawNftSolventAccounts {
        executor: writable_signer,
        market: readonly,
        obligation: writable,
        nft_mint: readonly,
        nft_metadata: writable,
        nft_collateral_vault: writable,
        executor_nft_wallet: writable,
        market_authority: readonly,
    }

    /// Follow instruction accounts when the NFT is programmable
    pub struct PnftAccounts {
        /// Master edition of the NFT
        nft_edition: readonly,
        /// Token record of the NFT account the NFT leaves
        source_token_record: writable,
        /// Token record of the NFT account receiving the NFT
        destination_token_record: writable,
        sysvar_instructions: readonly,
    }
}

impl NftLendyInstruction {
    /// Builds transaction instruction. `remaining` are appended after `accounts` as read only.
    /// Programs called by the instruction (token, system, token metadata) can be appended
    /// anywhere: executable accounts are skipped when instruction accounts are read.
    pub fn into_instruction(
        self,
        mut accounts: Vec<AccountMeta>,
        remaining: &[Pubkey],
    ) -> Instruction {
        accounts.extend(
            remaining
                .iter()
                .map(|key| AccountMeta::new_readonly(*key, false)),
        );
        Instruction::new_with_borsh(NFT_LENDY_ID, &self, accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accounts_order() {
        let keys: Vec<_> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let accounts = TransferMarketOwnershipAccounts::from_iter(&mut keys.iter()).unwrap();

        assert_eq!(accounts.market, keys[0]);
        assert_eq!(accounts.new_owner, keys[2]);
        assert_eq!(accounts.to_vec(), keys);

        let metas = accounts.to_account_metas();
        assert!(metas[0].is_writable && !metas[0].is_signer);
        assert!(!metas[1].is_writable && metas[1].is_signer);
    }

    #[test]
    fn not_enough_keys() {
        let keys = [Pubkey::new_unique()];
        assert_matches!(
            AlterMarketAccounts::from_iter(&mut keys.iter()),
            Err(NftLendyError::NotEnoughAccountKeys)
        );
    }

    #[test]
    fn instruction_data() {
        let accounts = AlterReserveAccounts {
            reserve: Pubkey::new_unique(),
            market: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
        };
        let extra = Pubkey::new_unique();
        let ix = NftLendyInstruction::Version { no_error: true }
            .into_instruction(accounts.to_account_metas(), &[extra]);

        assert_eq!(ix.program_id, NFT_LENDY_ID);
        assert_eq!(ix.accounts.len(), 4);
        assert_eq!(ix.accounts[3].pubkey, extra);
        assert_eq!(
            NftLendyInstruction::try_from_slice(&ix.data).unwrap(),
            NftLendyInstruction::Version { no_error: true }
        );
    }
}
