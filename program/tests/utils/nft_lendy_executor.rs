use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::pubkey::Pubkey;
use solana_program::{system_program, sysvar};
use solana_program_test::{BanksClientError, ProgramTestContext};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use spl_associated_token_account::get_associated_token_address;

use nft_lendy::instruction::{
    AlterMarketAccounts, AlterReserveAccounts, BorrowAccounts, CloseObligationAccounts,
    DepositCollateralAccounts, DepositTokensAccounts, ExecuteLiquidateBidAccounts,
    IncreaseBidAccounts, InitMarketAccounts, InitObligationAccounts, InitReserveAccounts,
    LiquidateSolventAccounts, NftAccounts, NftLendyInstruction, PlaceBidAccounts, PnftAccounts,
    RefreshReserveAccounts, RepayAccounts, RevokeBidAccounts, TransferMarketOwnershipAccounts,
    WithdrawCollateralAccounts, WithdrawNftAccounts, WithdrawNftSolventAccounts,
    WithdrawTokensAccounts,
};
use nft_lendy::pda::{
    find_bid, find_bid_escrow, find_bid_escrow_authority, find_loan_account,
    find_master_edition, find_metadata, find_nft_collateral_vault, find_note_collateral_account,
    find_obligation, find_token_record,
};
use nft_lendy::state::amount::Amount;
use nft_lendy::state::market::MarketParams;
use nft_lendy::state::reserve::ReserveConfig;

use crate::utils::process;
use crate::utils::setup_nft_lendy::LendyEnv;

pub type TxResult = Result<(), BanksClientError>;

/// Programs invoked by the lending program. Executable accounts are not instruction keys.
const CALLED_PROGRAMS: [Pubkey; 2] = [system_program::ID, spl_token::ID];

/// Instruction with `remaining` keys and called programs after `accounts`
pub fn lendy_ix(
    instruction: NftLendyInstruction,
    accounts: Vec<AccountMeta>,
    remaining: &[Pubkey],
) -> Instruction {
    let mut remaining = remaining.to_vec();
    remaining.extend(CALLED_PROGRAMS);
    instruction.into_instruction(accounts, &remaining)
}

pub async fn init_market(
    ctx: &mut ProgramTestContext,
    market: &Keypair,
    owner: &Keypair,
    params: MarketParams,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::InitMarket { params },
        InitMarketAccounts {
            market: market.pubkey(),
            owner: owner.pubkey(),
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[market, owner]).await
}

pub async fn alter_market(
    ctx: &mut ProgramTestContext,
    market: &Pubkey,
    owner: &Keypair,
    params: MarketParams,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::AlterMarket { params },
        AlterMarketAccounts {
            market: *market,
            owner: owner.pubkey(),
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[owner]).await
}

pub async fn transfer_market_ownership(
    ctx: &mut ProgramTestContext,
    market: &Pubkey,
    owner: &Keypair,
    new_owner: &Keypair,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::TransferMarketOwnership,
        TransferMarketOwnershipAccounts {
            market: *market,
            owner: owner.pubkey(),
            new_owner: new_owner.pubkey(),
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[owner, new_owner]).await
}

pub fn init_reserve_accounts(env: &LendyEnv, reserve: &Pubkey) -> InitReserveAccounts {
    InitReserveAccounts {
        reserve: *reserve,
        market: env.market,
        owner: env.owner.pubkey(),
        token_mint: env.usdc_mint,
        vault: env.vault,
        fee_note_vault: env.fee_note_vault,
        deposit_note_mint: env.deposit_note_mint,
        loan_note_mint: env.loan_note_mint,
        price_feed: env.price_feed,
        nft_price_feed: env.nft_price_feed,
        market_authority: env.market_authority,
    }
}

pub async fn init_reserve(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    reserve: &Keypair,
    config: ReserveConfig,
) -> TxResult {
    init_reserve_with(
        ctx,
        init_reserve_accounts(env, &reserve.pubkey()),
        &[reserve, &env.owner],
        config,
    )
    .await
}

/// `signers` are the reserve and the owner of `accounts`
pub async fn init_reserve_with(
    ctx: &mut ProgramTestContext,
    accounts: InitReserveAccounts,
    signers: &[&Keypair],
    config: ReserveConfig,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::InitReserve { config },
        accounts.to_account_metas(),
        &[],
    );
    process(ctx, &[ix], signers).await
}

pub async fn alter_reserve(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    owner: &Keypair,
    config: ReserveConfig,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::AlterReserve { config },
        AlterReserveAccounts {
            reserve: env.reserve,
            market: env.market,
            owner: owner.pubkey(),
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[owner]).await
}

pub fn refresh_reserve_accounts(env: &LendyEnv) -> RefreshReserveAccounts {
    RefreshReserveAccounts {
        reserve: env.reserve,
        price_feed: env.price_feed,
        nft_price_feed: env.nft_price_feed,
        deposit_note_mint: env.deposit_note_mint,
        fee_note_vault: env.fee_note_vault,
        market_authority: env.market_authority,
    }
}

pub async fn refresh_reserve_with(
    ctx: &mut ProgramTestContext,
    accounts: RefreshReserveAccounts,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::RefreshReserve,
        accounts.to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[]).await
}

pub async fn refresh_reserve(ctx: &mut ProgramTestContext, env: &LendyEnv) -> TxResult {
    refresh_reserve_with(ctx, refresh_reserve_accounts(env)).await
}

pub async fn init_obligation(
    ctx: &mut ProgramTestContext,
    market: &Pubkey,
    owner: &Keypair,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::InitObligation,
        InitObligationAccounts {
            obligation: find_obligation(market, &owner.pubkey()).0,
            market: *market,
            owner: owner.pubkey(),
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[owner]).await
}

pub async fn close_obligation(
    ctx: &mut ProgramTestContext,
    obligation: &Pubkey,
    owner: &Keypair,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::CloseObligation,
        CloseObligationAccounts {
            obligation: *obligation,
            owner: owner.pubkey(),
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[owner]).await
}

pub async fn deposit_tokens(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    depositor: &Keypair,
    source_wallet: &Pubkey,
    destination_note_wallet: &Pubkey,
    amount: Amount,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::DepositTokens { amount },
        DepositTokensAccounts {
            depositor: depositor.pubkey(),
            source_wallet: *source_wallet,
            destination_note_wallet: *destination_note_wallet,
            reserve: env.reserve,
            vault: env.vault,
            deposit_note_mint: env.deposit_note_mint,
            market: env.market,
            market_authority: env.market_authority,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[depositor]).await
}

pub async fn withdraw_tokens(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    owner: &Keypair,
    source_note_wallet: &Pubkey,
    destination_wallet: &Pubkey,
    amount: Amount,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::WithdrawTokens { amount },
        WithdrawTokensAccounts {
            owner: owner.pubkey(),
            source_note_wallet: *source_note_wallet,
            destination_wallet: *destination_wallet,
            reserve: env.reserve,
            vault: env.vault,
            deposit_note_mint: env.deposit_note_mint,
            market: env.market,
            market_authority: env.market_authority,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[owner]).await
}

/// Borrower locks deposit notes from its note wallet
pub async fn deposit_collateral(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    amount: Amount,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::DepositCollateral { amount },
        DepositCollateralAccounts {
            owner: env.borrower.pubkey(),
            obligation: env.obligation,
            reserve: env.reserve,
            deposit_note_mint: env.deposit_note_mint,
            source_note_wallet: env.borrower_note_wallet,
            collateral_account: find_note_collateral_account(&env.reserve, &env.obligation).0,
            market: env.market,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[&env.borrower]).await
}

pub async fn withdraw_collateral(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    amount: Amount,
    valuation_reserves: &[Pubkey],
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::WithdrawCollateral { amount },
        WithdrawCollateralAccounts {
            owner: env.borrower.pubkey(),
            obligation: env.obligation,
            reserve: env.reserve,
            collateral_account: find_note_collateral_account(&env.reserve, &env.obligation).0,
            destination_note_wallet: env.borrower_note_wallet,
            market: env.market,
            market_authority: env.market_authority,
        }
        .to_account_metas(),
        valuation_reserves,
    );
    process(ctx, &[ix], &[&env.borrower]).await
}

pub fn nft_accounts(env: &LendyEnv, nft_mint: &Pubkey) -> NftAccounts {
    NftAccounts {
        owner: env.borrower.pubkey(),
        obligation: env.obligation,
        market: env.market,
        nft_mint: *nft_mint,
        nft_metadata: find_metadata(nft_mint).0,
        source_nft_wallet: get_associated_token_address(&env.borrower.pubkey(), nft_mint),
        nft_collateral_vault: find_nft_collateral_vault(&env.obligation, nft_mint).0,
        market_authority: env.market_authority,
    }
}

/// Borrower locks NFT held in its associated token account
pub async fn deposit_nft(ctx: &mut ProgramTestContext, env: &LendyEnv, nft_mint: &Pubkey) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::DepositNft,
        nft_accounts(env, nft_mint).to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[&env.borrower]).await
}

/// pNFT accounts of the move from `source` to `destination` token account
pub fn pnft_accounts(nft_mint: &Pubkey, source: &Pubkey, destination: &Pubkey) -> PnftAccounts {
    PnftAccounts {
        nft_edition: find_master_edition(nft_mint).0,
        source_token_record: find_token_record(nft_mint, source).0,
        destination_token_record: find_token_record(nft_mint, destination).0,
        sysvar_instructions: sysvar::instructions::ID,
    }
}

fn with_pnft(
    mut accounts: Vec<AccountMeta>,
    pnft: &PnftAccounts,
    rule_set: Option<Pubkey>,
) -> Vec<AccountMeta> {
    accounts.extend(pnft.to_account_metas());
    accounts.extend(rule_set.map(|key| AccountMeta::new_readonly(key, false)));
    accounts
}

pub async fn deposit_pnft(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    nft_mint: &Pubkey,
    pnft: &PnftAccounts,
    rule_set: Option<Pubkey>,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::DepositPnft {
            authorization_data: None,
            rules_acc_present: rule_set.is_some(),
        },
        with_pnft(nft_accounts(env, nft_mint).to_account_metas(), pnft, rule_set),
        &[],
    );
    process(ctx, &[ix], &[&env.borrower]).await
}

/// pNFT accounts of the borrower's NFT deposit
pub fn deposit_pnft_accounts(env: &LendyEnv, nft_mint: &Pubkey) -> PnftAccounts {
    let accounts = nft_accounts(env, nft_mint);
    pnft_accounts(
        nft_mint,
        &accounts.source_nft_wallet,
        &accounts.nft_collateral_vault,
    )
}

pub fn withdraw_nft_accounts(env: &LendyEnv, nft_mint: &Pubkey) -> WithdrawNftAccounts {
    WithdrawNftAccounts {
        owner: env.borrower.pubkey(),
        obligation: env.obligation,
        market: env.market,
        nft_mint: *nft_mint,
        nft_metadata: find_metadata(nft_mint).0,
        nft_collateral_vault: find_nft_collateral_vault(&env.obligation, nft_mint).0,
        destination_nft_wallet: get_associated_token_address(&env.borrower.pubkey(), nft_mint),
        market_authority: env.market_authority,
    }
}

pub async fn withdraw_nft(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    nft_mint: &Pubkey,
    valuation_reserves: &[Pubkey],
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::WithdrawNft,
        withdraw_nft_accounts(env, nft_mint).to_account_metas(),
        valuation_reserves,
    );
    process(ctx, &[ix], &[&env.borrower]).await
}

pub async fn withdraw_pnft(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    nft_mint: &Pubkey,
    rule_set: Option<Pubkey>,
    valuation_reserves: &[Pubkey],
) -> TxResult {
    let accounts = withdraw_nft_accounts(env, nft_mint);
    let pnft = pnft_accounts(
        nft_mint,
        &accounts.nft_collateral_vault,
        &accounts.destination_nft_wallet,
    );
    let ix = lendy_ix(
        NftLendyInstruction::WithdrawPnft {
            authorization_data: None,
            rules_acc_present: rule_set.is_some(),
        },
        with_pnft(accounts.to_account_metas(), &pnft, rule_set),
        valuation_reserves,
    );
    process(ctx, &[ix], &[&env.borrower]).await
}

pub async fn borrow(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    amount: Amount,
    valuation_reserves: &[Pubkey],
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::Borrow { amount },
        BorrowAccounts {
            owner: env.borrower.pubkey(),
            obligation: env.obligation,
            reserve: env.reserve,
            vault: env.vault,
            loan_note_mint: env.loan_note_mint,
            loan_account: find_loan_account(&env.reserve, &env.obligation).0,
            destination_wallet: env.borrower_usdc_wallet,
            market: env.market,
            market_authority: env.market_authority,
        }
        .to_account_metas(),
        valuation_reserves,
    );
    process(ctx, &[ix], &[&env.borrower]).await
}

pub async fn repay(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    payer: &Keypair,
    source_wallet: &Pubkey,
    amount: Amount,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::Repay { amount },
        RepayAccounts {
            payer: payer.pubkey(),
            obligation: env.obligation,
            reserve: env.reserve,
            vault: env.vault,
            loan_note_mint: env.loan_note_mint,
            loan_account: find_loan_account(&env.reserve, &env.obligation).0,
            source_wallet: *source_wallet,
            market: env.market,
            market_authority: env.market_authority,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[payer]).await
}

pub async fn place_bid(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    bidder: &Keypair,
    source_wallet: &Pubkey,
    bid_limit: u64,
    escrow_deposit: u64,
) -> TxResult {
    let bid = find_bid(&env.market, &bidder.pubkey()).0;
    let (bid_escrow_authority, authority_bump) = find_bid_escrow_authority(&bid);
    let ix = lendy_ix(
        NftLendyInstruction::PlaceBid {
            bid_limit,
            escrow_deposit,
            authority_bump,
        },
        PlaceBidAccounts {
            bidder: bidder.pubkey(),
            bid,
            market: env.market,
            reserve: env.reserve,
            bid_mint: env.usdc_mint,
            source_wallet: *source_wallet,
            bid_escrow: find_bid_escrow(&bid).0,
            bid_escrow_authority,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[bidder]).await
}

pub async fn increase_bid(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    bidder: &Keypair,
    source_wallet: &Pubkey,
    bid_increase: u64,
) -> TxResult {
    let bid = find_bid(&env.market, &bidder.pubkey()).0;
    let ix = lendy_ix(
        NftLendyInstruction::IncreaseBid { bid_increase },
        IncreaseBidAccounts {
            bidder: bidder.pubkey(),
            bid,
            source_wallet: *source_wallet,
            bid_escrow: find_bid_escrow(&bid).0,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[bidder]).await
}

pub async fn revoke_bid(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    bidder: &Keypair,
    destination_wallet: &Pubkey,
) -> TxResult {
    let bid = find_bid(&env.market, &bidder.pubkey()).0;
    let ix = lendy_ix(
        NftLendyInstruction::RevokeBid,
        RevokeBidAccounts {
            bidder: bidder.pubkey(),
            bid,
            bid_escrow: find_bid_escrow(&bid).0,
            destination_wallet: *destination_wallet,
            bid_escrow_authority: find_bid_escrow_authority(&bid).0,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[bidder]).await
}

pub fn execute_liquidate_bid_accounts(
    env: &LendyEnv,
    bidder: &Pubkey,
    nft_mint: &Pubkey,
) -> ExecuteLiquidateBidAccounts {
    let bid = find_bid(&env.market, bidder).0;
    ExecuteLiquidateBidAccounts {
        executor: env.executor.pubkey(),
        market: env.market,
        obligation: env.obligation,
        reserve: env.reserve,
        vault: env.vault,
        loan_note_mint: env.loan_note_mint,
        loan_account: find_loan_account(&env.reserve, &env.obligation).0,
        bid,
        bid_escrow: find_bid_escrow(&bid).0,
        bid_escrow_authority: find_bid_escrow_authority(&bid).0,
        bidder: *bidder,
        bidder_wallet: get_associated_token_address(bidder, &env.usdc_mint),
        nft_mint: *nft_mint,
        nft_metadata: find_metadata(nft_mint).0,
        nft_collateral_vault: find_nft_collateral_vault(&env.obligation, nft_mint).0,
        bidder_nft_wallet: get_associated_token_address(bidder, nft_mint),
        liquidation_fee_receiver: env.owner_usdc_wallet,
        leftovers_receiver: env.borrower_usdc_wallet,
        market_authority: env.market_authority,
    }
}

/// Liquidation signed by `executor` of `accounts`
pub async fn execute_liquidate_bid_with(
    ctx: &mut ProgramTestContext,
    accounts: ExecuteLiquidateBidAccounts,
    executor: &Keypair,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::ExecuteLiquidateBid,
        accounts.to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[executor]).await
}

pub async fn execute_liquidate_bid(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    bidder: &Pubkey,
    nft_mint: &Pubkey,
) -> TxResult {
    execute_liquidate_bid_with(
        ctx,
        execute_liquidate_bid_accounts(env, bidder, nft_mint),
        &env.executor,
    )
    .await
}

pub async fn execute_liquidate_pnft_bid(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    bidder: &Pubkey,
    nft_mint: &Pubkey,
    rule_set: Option<Pubkey>,
) -> TxResult {
    let accounts = execute_liquidate_bid_accounts(env, bidder, nft_mint);
    let pnft = pnft_accounts(
        nft_mint,
        &accounts.nft_collateral_vault,
        &accounts.bidder_nft_wallet,
    );
    let ix = lendy_ix(
        NftLendyInstruction::ExecuteLiquidatePnftBid {
            authorization_data: None,
            rules_acc_present: rule_set.is_some(),
        },
        with_pnft(accounts.to_account_metas(), &pnft, rule_set),
        &[],
    );
    process(ctx, &[ix], &[&env.executor]).await
}

pub async fn liquidate_solvent(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    executor: &Keypair,
    nft_mint: &Pubkey,
    executor_nft_wallet: &Pubkey,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::LiquidateSolvent,
        LiquidateSolventAccounts {
            executor: executor.pubkey(),
            market: env.market,
            obligation: env.obligation,
            reserve: env.reserve,
            loan_note_mint: env.loan_note_mint,
            loan_account: find_loan_account(&env.reserve, &env.obligation).0,
            nft_mint: *nft_mint,
            nft_metadata: find_metadata(nft_mint).0,
            nft_collateral_vault: find_nft_collateral_vault(&env.obligation, nft_mint).0,
            executor_nft_wallet: *executor_nft_wallet,
            market_authority: env.market_authority,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[executor]).await
}

pub async fn withdraw_nft_solvent(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    executor: &Keypair,
    nft_mint: &Pubkey,
    executor_nft_wallet: &Pubkey,
) -> TxResult {
    let ix = lendy_ix(
        NftLendyInstruction::WithdrawNftSolvent,
        WithdrawNftSolventAccounts {
            executor: executor.pubkey(),
            market: env.market,
            obligation: env.obligation,
            nft_mint: *nft_mint,
            nft_metadata: find_metadata(nft_mint).0,
            nft_collateral_vault: find_nft_collateral_vault(&env.obligation, nft_mint).0,
            executor_nft_wallet: *executor_nft_wallet,
            market_authority: env.market_authority,
        }
        .to_account_metas(),
        &[],
    );
    process(ctx, &[ix], &[executor]).await
}

pub async fn version(ctx: &mut ProgramTestContext, no_error: bool) -> TxResult {
    let ix = lendy_ix(NftLendyInstruction::Version { no_error }, vec![], &[]);
    process(ctx, &[ix], &[]).await
}
