//! Program entrypoint. Builds the processor's collaborators from the accounts of the running
//! instruction.

use solana_program::account_info::AccountInfo;
use solana_program::clock::Clock;
use solana_program::entrypoint::ProgramResult;
use solana_program::program_error::ProgramError;
use solana_program::pubkey::Pubkey;
use solana_program::sysvar::Sysvar;
use solana_program::{entrypoint, msg};

use crate::processor::{self, Host};
use crate::remote::{
    AccountInfoStore, Accounts, MetaplexNftVerifier, MetaplexPnfts, PriceFeedOracle, SplTokenCpi,
};
use crate::NFT_LENDY_ID;

entrypoint!(process_instruction);

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    if program_id != &NFT_LENDY_ID {
        msg!("program id {} is not {}", program_id, NFT_LENDY_ID);
        return Err(ProgramError::IncorrectProgramId);
    }

    let accounts = Accounts::new(accounts);
    let keys = accounts.keys();
    let signers = accounts.signers();

    let mut store = AccountInfoStore::new(accounts);
    let mut tokens = SplTokenCpi::new(accounts);
    let oracle = PriceFeedOracle::new(accounts);
    let nft_verifier = MetaplexNftVerifier::new(accounts);
    let mut pnfts = MetaplexPnfts::new(accounts);

    let clock = Clock::get()?;

    processor::process_instruction(
        Host {
            store: &mut store,
            tokens: &mut tokens,
            oracle: &oracle,
            nft_verifier: &nft_verifier,
            pnfts: &mut pnfts,
        },
        &keys,
        &signers,
        clock,
        instruction_data,
    )?;

    Ok(())
}
