use solana_program::msg;
use solana_program::pubkey::Pubkey;

use crate::error::NftLendyError;
use crate::instruction::{
    AlterMarketAccounts, AlterReserveAccounts, InitMarketAccounts, InitReserveAccounts,
    TransferMarketOwnershipAccounts,
};
use crate::processor::{verify_key, verify_market_authority, Processor};
use crate::state::last_update::LastUpdate;
use crate::state::market::{Market, MarketParams};
use crate::state::reserve::{Reserve, ReserveConfig, ReserveParams};
use crate::LendyResult;

impl<'a> Processor<'a> {
    #[inline(never)]
    pub(super) fn init_market(&mut self, params: MarketParams) -> LendyResult<()> {
        msg!("init_market ix: {:?}", params);

        let InitMarketAccounts { market, owner } =
            InitMarketAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&market, "market")?;
        self.verify_signer(&owner, "market owner")?;

        params.validate()?;

        self.create::<Market>(&market, &owner, &[], (params, owner))?;

        msg!("market {} created, owner {}", market, owner);

        Ok(())
    }

    #[inline(never)]
    pub(super) fn alter_market(&mut self, params: MarketParams) -> LendyResult<()> {
        msg!("alter_market ix: {:?}", params);

        let AlterMarketAccounts { market, owner } =
            AlterMarketAccounts::from_iter(&mut self.accounts.iter())?;

        let mut unpacked_market = self.load::<Market>(&market)?;
        self.verify_market_owner(&unpacked_market, &owner)?;

        params.validate()?;

        unpacked_market.apply_params(&params);

        self.save(&market, &unpacked_market)
    }

    #[inline(never)]
    pub(super) fn transfer_market_ownership(&mut self) -> LendyResult<()> {
        msg!("transfer_market_ownership ix");

        let TransferMarketOwnershipAccounts {
            market,
            owner,
            new_owner,
        } = TransferMarketOwnershipAccounts::from_iter(&mut self.accounts.iter())?;

        let mut unpacked_market = self.load::<Market>(&market)?;
        self.verify_market_owner(&unpacked_market, &owner)?;
        // New owner proves the key is usable
        self.verify_signer(&new_owner, "new market owner")?;

        unpacked_market.owner = new_owner;

        msg!("market {} owner changed to {}", market, new_owner);

        self.save(&market, &unpacked_market)
    }

    /// Creates Reserve for `token_mint`. Token accounts and note mints are created by the caller
    /// beforehand and handed over to the market authority.
    #[inline(never)]
    pub(super) fn init_reserve(&mut self, config: ReserveConfig) -> LendyResult<()> {
        msg!("init_reserve ix: {:?}", config);

        let InitReserveAccounts {
            reserve,
            market,
            owner,
            token_mint,
            vault,
            fee_note_vault,
            deposit_note_mint,
            loan_note_mint,
            price_feed,
            nft_price_feed,
            market_authority,
        } = InitReserveAccounts::from_iter(&mut self.accounts.iter())?;

        self.verify_signer(&reserve, "reserve")?;

        let mut unpacked_market = self.load::<Market>(&market)?;
        self.verify_market_owner(&unpacked_market, &owner)?;
        verify_market_authority(&market, &market_authority)?;

        config.validate()?;

        let token_decimals = self.host.tokens.mint(&token_mint)?.decimals;

        self.verify_token_account(&vault, &token_mint, &market_authority, "vault")?;
        self.verify_token_account(
            &fee_note_vault,
            &deposit_note_mint,
            &market_authority,
            "fee note vault",
        )?;
        self.verify_note_mint(&deposit_note_mint, &market_authority, token_decimals)?;
        self.verify_note_mint(&loan_note_mint, &market_authority, token_decimals)?;

        if deposit_note_mint == loan_note_mint {
            msg!("deposit and loan notes must have different mints");
            return Err(NftLendyError::InvalidConfig);
        }

        // Both feeds must be served by the oracle
        self.host.oracle.price(&price_feed)?;
        self.host.oracle.price(&nft_price_feed)?;

        let index = unpacked_market.register_reserve(reserve)?;

        let params = ReserveParams {
            market,
            index,
            token_mint,
            token_decimals,
            vault,
            fee_note_vault,
            deposit_note_mint,
            loan_note_mint,
            price_feed,
            nft_price_feed,
            config,
        };
        let last_update = LastUpdate::new(self.clock.slot, self.clock.unix_timestamp);

        self.create::<Reserve>(&reserve, &owner, &[], (params, last_update))?;
        self.save(&market, &unpacked_market)?;

        msg!(
            "reserve {} for mint {} registered under index {}",
            reserve,
            token_mint,
            index
        );

        Ok(())
    }

    #[inline(never)]
    pub(super) fn alter_reserve(&mut self, config: ReserveConfig) -> LendyResult<()> {
        msg!("alter_reserve ix: {:?}", config);

        let AlterReserveAccounts {
            reserve,
            market,
            owner,
        } = AlterReserveAccounts::from_iter(&mut self.accounts.iter())?;

        let unpacked_market = self.load::<Market>(&market)?;
        self.verify_market_owner(&unpacked_market, &owner)?;

        let mut unpacked_reserve = self.load_reserve(&reserve, &market, &unpacked_market)?;

        config.validate()?;

        unpacked_reserve.config = config;
        // Rates change from now on. Force refresh before the next operation.
        unpacked_reserve.last_update.mark_stale();

        self.save(&reserve, &unpacked_reserve)
    }

    pub(super) fn verify_token_account(
        &self,
        account: &Pubkey,
        mint: &Pubkey,
        owner: &Pubkey,
        name: &'static str,
    ) -> LendyResult<()> {
        let token_account = self.host.tokens.token_account(account)?;
        verify_key(&token_account.mint, mint, name)?;
        verify_key(&token_account.owner, owner, name)
    }

    fn verify_note_mint(&self, mint: &Pubkey, market_authority: &Pubkey, decimals: u8) -> LendyResult<()> {
        let note_mint = self.host.tokens.mint(mint)?;

        if note_mint.mint_authority != Some(*market_authority) {
            msg!(
                "mint authority of note mint {} must be market authority {}",
                mint,
                market_authority
            );
            return Err(NftLendyError::InvalidAuthority);
        }

        if note_mint.decimals != decimals {
            msg!(
                "note mint {} decimals {} differ from token decimals {}",
                mint,
                note_mint.decimals,
                decimals
            );
            return Err(NftLendyError::InvalidConfig);
        }

        if note_mint.supply != 0 {
            msg!("note mint {} must have zero supply", mint);
            return Err(NftLendyError::InvalidConfig);
        }

        Ok(())
    }
}
