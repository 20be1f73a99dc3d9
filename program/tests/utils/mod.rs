use std::str::FromStr;

use borsh::BorshSerialize;
use lazy_static::lazy_static;
use solana_program::clock::Clock;
use solana_program::instruction::{Instruction, InstructionError};
use solana_program::program_error::ProgramError;
use solana_program::program_pack::Pack;
use solana_program::pubkey::Pubkey;
use solana_program::rent::Rent;
use solana_program::{system_instruction, system_program};
use solana_program_test::{
    processor, BanksClient, BanksClientError, ProgramTest, ProgramTestBanksClientExt,
    ProgramTestContext,
};
use solana_sdk::account::{Account, AccountSharedData};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::{Transaction, TransactionError};
use spl_token::error::TokenError;
use spl_token::state::{Account as TokenAccount, Mint};

use nft_lendy::account::PodAccount;
use nft_lendy::error::{InvalidKey, NftLendyError};
use nft_lendy::math::Decimal;
use nft_lendy::pda::find_metadata;
use nft_lendy::state::price_feed::{PriceFeed, PriceFeedParams};
use nft_lendy::{NFT_LENDY_ID, PRICE_PROXY_ID};

pub mod nft_lendy_executor;
pub mod setup_nft_lendy;

pub const LAMPORTS_PER_USDC: u64 = 1_000_000;
pub const USDC_DECIMALS: u8 = 6;

pub fn program_name() -> &'static str {
    lazy_static! {
        static ref NAME: String = std::env!("CARGO_PKG_NAME").replace('-', "_");
    }
    &NAME
}

/// Program runs natively through its entrypoint. Token, associated token and system programs
/// are provided by the test validator.
pub fn init_program_test() -> ProgramTest {
    tracing_init();

    tracing::info!("init program test...");

    ProgramTest::new(
        program_name(),
        NFT_LENDY_ID,
        processor!(nft_lendy::entrypoint::process_instruction),
    )
}

/// Signs `ixs` by the payer and `signers` and executes them in one transaction
pub async fn process(
    context: &mut ProgramTestContext,
    ixs: &[Instruction],
    signers: &[&Keypair],
) -> Result<(), BanksClientError> {
    let blockhash = context
        .banks_client
        .get_new_latest_blockhash(&context.last_blockhash)
        .await
        .expect("get latest blockhash");
    context.last_blockhash = blockhash;

    let mut all_signers = vec![&context.payer];
    all_signers.extend_from_slice(signers);

    let tx = Transaction::new_signed_with_payer(
        ixs,
        Some(&context.payer.pubkey()),
        all_signers.as_slice(),
        blockhash,
    );
    context.banks_client.process_transaction(tx).await
}

pub async fn get_account(
    banks_client: &mut BanksClient,
    address: Pubkey,
) -> std::io::Result<Account> {
    banks_client
        .get_account(address)
        .await?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "account not found"))
}

pub async fn account_exists(banks_client: &mut BanksClient, address: Pubkey) -> bool {
    get_account(banks_client, address).await.is_ok()
}

pub async fn get_token_account(
    banks_client: &mut BanksClient,
    address: Pubkey,
) -> std::io::Result<TokenAccount> {
    let acc = get_account(banks_client, address).await?;
    TokenAccount::unpack_from_slice(acc.data.as_ref())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
}

pub async fn token_balance(banks_client: &mut BanksClient, address: Pubkey) -> u64 {
    get_token_account(banks_client, address)
        .await
        .unwrap_or_else(|err| panic!("token account {}: {}", address, err))
        .amount
}

pub async fn get_mint(banks_client: &mut BanksClient, address: Pubkey) -> std::io::Result<Mint> {
    let acc = get_account(banks_client, address).await?;
    Mint::unpack_from_slice(acc.data.as_ref())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
}

/// Program account decoded from its bytes
pub async fn load<T: PodAccount>(banks_client: &mut BanksClient, address: Pubkey) -> T {
    let acc = get_account(banks_client, address)
        .await
        .unwrap_or_else(|err| panic!("account {}: {}", address, err));
    T::try_from_bytes(&acc.data).expect("account decodes")
}

pub async fn clock(context: &mut ProgramTestContext) -> Clock {
    context
        .banks_client
        .get_sysvar::<Clock>()
        .await
        .expect("clock sysvar")
}

pub async fn warp_forward(context: &mut ProgramTestContext, slots: u64) {
    let slot = clock(context).await.slot;
    context.warp_to_slot(slot + slots).expect("warp");
}

pub async fn create_mint(
    context: &mut ProgramTestContext,
    mint: &Keypair,
    authority: &Pubkey,
    decimals: u8,
) -> Result<(), BanksClientError> {
    let rent = context.banks_client.get_rent().await.expect("get rent");

    let ixs = [
        system_instruction::create_account(
            &context.payer.pubkey(),
            &mint.pubkey(),
            rent.minimum_balance(Mint::LEN),
            Mint::LEN as u64,
            &spl_token::ID,
        ),
        spl_token::instruction::initialize_mint2(
            &spl_token::ID,
            &mint.pubkey(),
            authority,
            None,
            decimals,
        )
        .expect("initialize_mint2"),
    ];
    process(context, &ixs, &[mint]).await
}

pub async fn create_token_account(
    context: &mut ProgramTestContext,
    account: &Keypair,
    mint: &Pubkey,
    owner: &Pubkey,
) -> Result<(), BanksClientError> {
    let rent = context.banks_client.get_rent().await.expect("get rent");

    let ixs = [
        system_instruction::create_account(
            &context.payer.pubkey(),
            &account.pubkey(),
            rent.minimum_balance(TokenAccount::LEN),
            TokenAccount::LEN as u64,
            &spl_token::ID,
        ),
        spl_token::instruction::initialize_account3(&spl_token::ID, &account.pubkey(), mint, owner)
            .expect("initialize_account3"),
    ];
    process(context, &ixs, &[account]).await
}

pub async fn create_associated_token_account(
    context: &mut ProgramTestContext,
    wallet: &Pubkey,
    token_mint: &Pubkey,
) -> Result<Pubkey, BanksClientError> {
    let ix = spl_associated_token_account::instruction::create_associated_token_account(
        &context.payer.pubkey(),
        wallet,
        token_mint,
        &spl_token::ID,
    );
    process(context, &[ix], &[]).await?;

    Ok(spl_associated_token_account::get_associated_token_address(
        wallet, token_mint,
    ))
}

pub async fn mint_tokens(
    context: &mut ProgramTestContext,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Keypair,
    amount: u64,
) -> Result<(), BanksClientError> {
    let ix = spl_token::instruction::mint_to(
        &spl_token::ID,
        mint,
        destination,
        &authority.pubkey(),
        &[],
        amount,
    )
    .expect("mint_to");
    process(context, &[ix], &[authority]).await
}

pub async fn transfer_tokens(
    context: &mut ProgramTestContext,
    source: &Pubkey,
    destination: &Pubkey,
    owner: &Keypair,
    amount: u64,
) -> Result<(), BanksClientError> {
    let ix = spl_token::instruction::transfer(
        &spl_token::ID,
        source,
        destination,
        &owner.pubkey(),
        &[],
        amount,
    )
    .expect("transfer");
    process(context, &[ix], &[owner]).await
}

/// Writes price feed account of the price proxy program
pub fn set_price_feed(
    context: &mut ProgramTestContext,
    feed: &Pubkey,
    owner: &Pubkey,
    price: Decimal,
    confidence: Decimal,
    clock: &Clock,
) {
    let mut data = vec![0; PriceFeed::SIZE];
    PriceFeed::init_bytes(
        &mut data,
        PriceFeedParams {
            authority: Pubkey::default(),
            price,
            confidence,
            update_slot: clock.slot,
            update_timestamp: clock.unix_timestamp,
        },
    )
    .expect("price feed");

    set_account_data(context, feed, owner, data);
}

/// Price with zero confidence interval published in the current slot
pub async fn set_price(context: &mut ProgramTestContext, feed: &Pubkey, price: Decimal) {
    let clock = clock(context).await;
    set_price_feed(context, feed, &PRICE_PROXY_ID, price, Decimal::ZERO, &clock);
}

fn set_account_data(context: &mut ProgramTestContext, key: &Pubkey, owner: &Pubkey, data: Vec<u8>) {
    let mut account = Account::new(Rent::default().minimum_balance(data.len()), data.len(), owner);
    account.data = data;
    context.set_account(key, &AccountSharedData::from(account));
}

/// Length of Metaplex metadata accounts
const METADATA_LEN: usize = 679;
const KEY_METADATA_V1: u8 = 4;
pub const TOKEN_STANDARD_NON_FUNGIBLE: u8 = 0;
pub const TOKEN_STANDARD_PROGRAMMABLE_NON_FUNGIBLE: u8 = 4;

#[derive(BorshSerialize)]
struct MetadataCreator {
    address: Pubkey,
    verified: bool,
    share: u8,
}

/// Layout of Metaplex metadata account
#[derive(BorshSerialize)]
struct MetadataLayout {
    key: u8,
    update_authority: Pubkey,
    mint: Pubkey,
    name: String,
    symbol: String,
    uri: String,
    seller_fee_basis_points: u16,
    creators: Option<Vec<MetadataCreator>>,
    primary_sale_happened: bool,
    is_mutable: bool,
    edition_nonce: Option<u8>,
    token_standard: Option<u8>,
    collection: Option<u8>,
    uses: Option<u8>,
    collection_details: Option<u8>,
    /// `ProgrammableConfig::V1` tag and its rule set
    programmable_config: Option<(u8, Option<Pubkey>)>,
}

/// Creates token metadata account of `mint` signed by `verified_creator`
pub fn set_nft_metadata(
    context: &mut ProgramTestContext,
    mint: &Pubkey,
    verified_creator: &Pubkey,
    token_standard: u8,
    rule_set: Option<Pubkey>,
) -> Pubkey {
    let metadata = MetadataLayout {
        key: KEY_METADATA_V1,
        update_authority: *verified_creator,
        mint: *mint,
        name: "Lendy NFT".to_string(),
        symbol: "LNFT".to_string(),
        uri: "https://example.com/nft.json".to_string(),
        seller_fee_basis_points: 500,
        creators: Some(vec![MetadataCreator {
            address: *verified_creator,
            verified: true,
            share: 100,
        }]),
        primary_sale_happened: true,
        is_mutable: true,
        edition_nonce: Some(255),
        token_standard: Some(token_standard),
        collection: None,
        uses: None,
        collection_details: None,
        programmable_config: (token_standard == TOKEN_STANDARD_PROGRAMMABLE_NON_FUNGIBLE)
            .then_some((0, rule_set)),
    };

    let mut data = borsh::to_vec(&metadata).expect("metadata");
    data.resize(METADATA_LEN, 0);

    let (metadata_key, _) = find_metadata(mint);
    set_account_data(context, &metadata_key, &mpl_token_metadata::ID, data);
    metadata_key
}

pub const LAMPORTS: u64 = 1_000_000_000_000_000;

pub trait Runner {
    fn add_account(&mut self, key: Pubkey, account: Account) -> &mut Self;

    fn add_native_wallet(&mut self, key: Pubkey, lamports: u64) -> &mut Self {
        self.add_account(
            key,
            Account {
                lamports,
                data: Vec::new(),
                owner: system_program::ID,
                executable: false,
                rent_epoch: 0,
            },
        )
    }
}

impl Runner for ProgramTest {
    fn add_account(&mut self, key: Pubkey, account: Account) -> &mut Self {
        self.add_account(key, account);
        self
    }
}

impl Runner for ProgramTestContext {
    fn add_account(&mut self, key: Pubkey, account: Account) -> &mut Self {
        self.set_account(&key, &AccountSharedData::from(account));
        self
    }
}

/// Error of the first instruction in the transaction
pub fn instruction_error(error: ProgramError) -> TransactionError {
    TransactionError::InstructionError(0, InstructionError::from(u64::from(error)))
}

pub fn lendy_error(error: NftLendyError) -> TransactionError {
    instruction_error(ProgramError::from(error))
}

pub fn token_error(error: TokenError) -> TransactionError {
    instruction_error(ProgramError::from(error))
}

/// Error code of any key mismatch
pub fn invalid_key_error() -> TransactionError {
    lendy_error(NftLendyError::InvalidKey(InvalidKey {
        key_type: "any",
        actual: Pubkey::default(),
        expected: Pubkey::default(),
    }))
}

pub fn tracing_init() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        use tracing_subscriber::filter::LevelFilter;
        use tracing_subscriber::fmt::Subscriber;
        use tracing_subscriber::util::SubscriberInitExt;

        let builder = Subscriber::builder();
        let builder = builder.with_max_level(LevelFilter::TRACE);

        let subscriber = builder.finish();
        let subscriber = {
            use std::env;
            use tracing_subscriber::{filter::Targets, layer::SubscriberExt};
            let targets = match env::var("RUST_LOG") {
                Ok(var) => var,
                Err(_) => concat!(
                    "debug",
                    ",solana_program_test=debug",
                    ",solana_runtime::message_processor::stable_log=debug",
                    ",solana_program_runtime=warn",
                    ",solana_program=warn",
                    ",solana_runtime=warn",
                    ",solana_metrics=warn",
                    ",tarpc=error",
                )
                .to_owned(),
            };
            subscriber.with(Targets::from_str(&targets).unwrap())
        };

        subscriber.try_init().unwrap();
    });
}
