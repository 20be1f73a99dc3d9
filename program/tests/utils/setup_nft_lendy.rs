use bytemuck::Zeroable;
use solana_program::pubkey::Pubkey;
use solana_program_test::ProgramTestContext;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use spl_associated_token_account::get_associated_token_address;
use tracing::info;

use nft_lendy::math::Decimal;
use nft_lendy::pda::{find_market_authority, find_obligation};
use nft_lendy::state::amount::Amount;
use nft_lendy::state::market::MarketParams;
use nft_lendy::state::reserve::ReserveConfig;

use crate::utils::nft_lendy_executor::{
    borrow, deposit_nft, deposit_tokens, init_market, init_obligation, init_reserve,
    refresh_reserve,
};
use crate::utils::{
    create_associated_token_account, create_mint, create_token_account, init_program_test,
    mint_tokens, set_nft_metadata, set_price, Runner, LAMPORTS, LAMPORTS_PER_USDC,
    TOKEN_STANDARD_NON_FUNGIBLE, USDC_DECIMALS,
};

/// Market with one USDC reserve, one lender and one borrower
pub struct LendyEnv {
    pub market: Pubkey,
    pub owner: Keypair,
    pub executor: Keypair,
    pub collection_creator: Pubkey,
    pub market_authority: Pubkey,

    pub reserve: Pubkey,
    pub usdc_mint: Pubkey,
    /// Mints USDC and collection NFTs
    pub mint_authority: Keypair,
    pub vault: Pubkey,
    pub fee_note_vault: Pubkey,
    pub deposit_note_mint: Pubkey,
    pub loan_note_mint: Pubkey,
    pub price_feed: Pubkey,
    pub nft_price_feed: Pubkey,

    pub lender: Keypair,
    pub lender_usdc_wallet: Pubkey,
    pub lender_note_wallet: Pubkey,

    pub borrower: Keypair,
    pub borrower_usdc_wallet: Pubkey,
    pub borrower_note_wallet: Pubkey,
    pub obligation: Pubkey,

    /// Market owner's wallet receiving liquidation fees
    pub owner_usdc_wallet: Pubkey,
}

pub fn usdc(amount: u64) -> u64 {
    amount * LAMPORTS_PER_USDC
}

pub fn market_params(collection_creator: Pubkey, executor: Pubkey) -> MarketParams {
    let mut quote_currency = [0; 16];
    quote_currency[..3].copy_from_slice(b"USD");
    MarketParams {
        quote_currency,
        quote_exponent: -6,
        nft_collection_creator: collection_creator,
        executor,
        flags: 0,
    }
}

/// 125 % min collateral ratio, 5 % liquidation premium, 0.5 % origination fee
pub fn reserve_config() -> ReserveConfig {
    ReserveConfig {
        utilization_rate_1: 5_000,
        utilization_rate_2: 9_000,
        borrow_rate_0: 500,
        borrow_rate_1: 1_500,
        borrow_rate_2: 3_000,
        borrow_rate_3: 10_000,
        min_collateral_ratio: 12_500,
        liquidation_premium: 500,
        manage_fee_rate: 1_000,
        loan_origination_fee: 50,
        price_stale_threshold_slots: 10,
        max_price_confidence_bps: 200,
        _padding0: Zeroable::zeroed(),
        manage_fee_collection_threshold: usdc(100),
        _padding: Zeroable::zeroed(),
    }
}

/// Starts the test validator with funded participants. Market's USDC reserve is priced at 1
/// with NFT floor price 100.
pub async fn setup_lendy_env() -> (ProgramTestContext, LendyEnv) {
    let owner = Keypair::new();
    let executor = Keypair::new();
    let lender = Keypair::new();
    let borrower = Keypair::new();
    let mint_authority = Keypair::new();

    let mut runner = init_program_test();
    for wallet in [&owner, &executor, &lender, &borrower] {
        runner.add_native_wallet(wallet.pubkey(), LAMPORTS);
    }
    let mut ctx = runner.start_with_context().await;

    let market = Keypair::new();
    let (market_authority, _) = find_market_authority(&market.pubkey());

    let usdc_mint = Keypair::new();
    let deposit_note_mint = Keypair::new();
    let loan_note_mint = Keypair::new();
    create_mint(&mut ctx, &usdc_mint, &mint_authority.pubkey(), USDC_DECIMALS)
        .await
        .expect("create usdc mint");
    create_mint(&mut ctx, &deposit_note_mint, &market_authority, USDC_DECIMALS)
        .await
        .expect("create deposit note mint");
    create_mint(&mut ctx, &loan_note_mint, &market_authority, USDC_DECIMALS)
        .await
        .expect("create loan note mint");

    let vault = Keypair::new();
    let fee_note_vault = Keypair::new();
    create_token_account(&mut ctx, &vault, &usdc_mint.pubkey(), &market_authority)
        .await
        .expect("create vault");
    create_token_account(
        &mut ctx,
        &fee_note_vault,
        &deposit_note_mint.pubkey(),
        &market_authority,
    )
    .await
    .expect("create fee note vault");

    let wallet = |owner: &Keypair, mint: &Keypair| {
        (owner.pubkey(), mint.pubkey(), get_associated_token_address(&owner.pubkey(), &mint.pubkey()))
    };
    let wallets = [
        wallet(&lender, &usdc_mint),
        wallet(&lender, &deposit_note_mint),
        wallet(&borrower, &usdc_mint),
        wallet(&borrower, &deposit_note_mint),
        wallet(&owner, &usdc_mint),
    ];
    for (wallet_owner, mint, _) in wallets {
        create_associated_token_account(&mut ctx, &wallet_owner, &mint)
            .await
            .expect("create_associated_token_account");
    }
    let [(_, _, lender_usdc_wallet), (_, _, lender_note_wallet), (_, _, borrower_usdc_wallet), (_, _, borrower_note_wallet), (_, _, owner_usdc_wallet)] =
        wallets;

    mint_tokens(
        &mut ctx,
        &usdc_mint.pubkey(),
        &lender_usdc_wallet,
        &mint_authority,
        usdc(10_000),
    )
    .await
    .expect("mint to lender");
    mint_tokens(
        &mut ctx,
        &usdc_mint.pubkey(),
        &borrower_usdc_wallet,
        &mint_authority,
        usdc(1_000),
    )
    .await
    .expect("mint to borrower");

    let price_feed = Pubkey::new_unique();
    let nft_price_feed = Pubkey::new_unique();
    set_price(&mut ctx, &price_feed, Decimal::ONE).await;
    set_price(&mut ctx, &nft_price_feed, Decimal::from(100)).await;

    let reserve = Keypair::new();
    let env = LendyEnv {
        market: market.pubkey(),
        collection_creator: Pubkey::new_unique(),
        market_authority,
        reserve: reserve.pubkey(),
        usdc_mint: usdc_mint.pubkey(),
        mint_authority,
        vault: vault.pubkey(),
        fee_note_vault: fee_note_vault.pubkey(),
        deposit_note_mint: deposit_note_mint.pubkey(),
        loan_note_mint: loan_note_mint.pubkey(),
        price_feed,
        nft_price_feed,
        lender_usdc_wallet,
        lender_note_wallet,
        borrower_usdc_wallet,
        borrower_note_wallet,
        obligation: find_obligation(&market.pubkey(), &borrower.pubkey()).0,
        owner_usdc_wallet,
        owner,
        executor,
        lender,
        borrower,
    };

    init_market(
        &mut ctx,
        &market,
        &env.owner,
        market_params(env.collection_creator, env.executor.pubkey()),
    )
    .await
    .expect("init_market");
    init_reserve(&mut ctx, &env, &reserve, reserve_config())
        .await
        .expect("init_reserve");
    init_obligation(&mut ctx, &env.market, &env.borrower)
        .await
        .expect("init_obligation");

    info!("================ Market {} is set up =================", env.market);

    (ctx, env)
}

/// Lender supplies `amount` of liquidity to the reserve
pub async fn supply_liquidity(ctx: &mut ProgramTestContext, env: &LendyEnv, amount: u64) {
    refresh_reserve(ctx, env).await.expect("refresh_reserve");
    deposit_tokens(
        ctx,
        env,
        &env.lender,
        &env.lender_usdc_wallet,
        &env.lender_note_wallet,
        Amount::tokens(amount),
    )
    .await
    .expect("deposit_tokens");
}

/// New mint with one token held by `holder` in its associated token account
pub async fn mint_single_token(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    holder: &Pubkey,
) -> Pubkey {
    let mint = Keypair::new();
    create_mint(ctx, &mint, &env.mint_authority.pubkey(), 0)
        .await
        .expect("create nft mint");
    let wallet = create_associated_token_account(ctx, holder, &mint.pubkey())
        .await
        .expect("create nft wallet");
    mint_tokens(ctx, &mint.pubkey(), &wallet, &env.mint_authority, 1)
        .await
        .expect("mint nft");
    mint.pubkey()
}

/// New NFT signed by `creator` held by `holder`
pub async fn mint_nft_with(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    holder: &Pubkey,
    creator: &Pubkey,
    token_standard: u8,
    rule_set: Option<Pubkey>,
) -> Pubkey {
    let nft_mint = mint_single_token(ctx, env, holder).await;
    set_nft_metadata(ctx, &nft_mint, creator, token_standard, rule_set);
    nft_mint
}

/// New NFT of the market's collection held by `holder`
pub async fn mint_nft(ctx: &mut ProgramTestContext, env: &LendyEnv, holder: &Pubkey) -> Pubkey {
    mint_nft_with(
        ctx,
        env,
        holder,
        &env.collection_creator,
        TOKEN_STANDARD_NON_FUNGIBLE,
        None,
    )
    .await
}

/// Borrower locks `count` NFTs in the obligation
pub async fn deposit_nfts(ctx: &mut ProgramTestContext, env: &LendyEnv, count: usize) -> Vec<Pubkey> {
    let mut nfts = Vec::with_capacity(count);
    for _ in 0..count {
        let nft_mint = mint_nft(ctx, env, &env.borrower.pubkey()).await;
        deposit_nft(ctx, env, &nft_mint).await.expect("deposit_nft");
        nfts.push(nft_mint);
    }
    nfts
}

/// Lender supplies 1000 USDC, borrower locks `nft_count` NFTs and borrows `amount`
pub async fn borrow_against_nfts(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    nft_count: usize,
    amount: u64,
) -> Vec<Pubkey> {
    supply_liquidity(ctx, env, usdc(1_000)).await;
    let nfts = deposit_nfts(ctx, env, nft_count).await;
    borrow(ctx, env, Amount::tokens(amount), &[])
        .await
        .expect("borrow");
    nfts
}

/// New NFT floor price published in the current slot. Reserve is refreshed with it.
pub async fn set_nft_floor_price(ctx: &mut ProgramTestContext, env: &LendyEnv, price: u64) {
    set_price(ctx, &env.price_feed, Decimal::ONE).await;
    set_price(ctx, &env.nft_price_feed, Decimal::from(price)).await;
    refresh_reserve(ctx, env).await.expect("refresh_reserve");
}

/// Funded bidder with `balance` in USDC wallet and empty wallets for `nft_mints`
pub async fn add_bidder(
    ctx: &mut ProgramTestContext,
    env: &LendyEnv,
    balance: u64,
    nft_mints: &[Pubkey],
) -> Keypair {
    let bidder = Keypair::new();
    ctx.add_native_wallet(bidder.pubkey(), LAMPORTS);

    let wallet = create_associated_token_account(ctx, &bidder.pubkey(), &env.usdc_mint)
        .await
        .expect("create bidder wallet");
    if balance > 0 {
        mint_tokens(ctx, &env.usdc_mint, &wallet, &env.mint_authority, balance)
            .await
            .expect("mint to bidder");
    }
    for nft_mint in nft_mints {
        create_associated_token_account(ctx, &bidder.pubkey(), nft_mint)
            .await
            .expect("create bidder nft wallet");
    }
    bidder
}
