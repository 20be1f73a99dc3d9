use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use solana_program::clock::Slot;
use solana_program::msg;
use solana_program::pubkey::Pubkey;

use crate::account::PodAccount;
use crate::error::NftLendyError;
use crate::math::{CheckedAdd, CheckedDiv, CheckedMul, Decimal};
use crate::state::last_update::LastUpdate;
use crate::state::reserve::Reserve;
use crate::state::OBLIGATION_DISCRIMINATOR;
use crate::LendyResult;

pub const MAX_NFT_COLLATERALS: usize = 11;
pub const MAX_DEPOSITS: usize = 2;
pub const MAX_LOANS: usize = 1;

static_assertions::const_assert_eq!(Obligation::SIZE, std::mem::size_of::<Obligation>());
static_assertions::const_assert_eq!(0, std::mem::size_of::<Obligation>() % 16);
static_assertions::const_assert_eq!(0, std::mem::size_of::<ObligationPosition>() % 8);

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ObligationFlags: u8 {
        /// Debt was written off by the executor who now claims NFT collateral
        const SOLVENT_LIQUIDATED = 0b0000_0001;
    }
}

/// Borrower's collateral and debt in one Market
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Obligation {
    pub discriminator: [u8; 8],
    pub version: u8,

    /// `ObligationFlags` bits
    pub flags: u8,

    pub _flags: [u8; 6],

    /// Slot the cached valuation was calculated in
    pub last_update: LastUpdate,

    pub market: Pubkey,
    pub owner: Pubkey,

    /// Mints of NFTs locked in collateral vaults. Vacant slots are `Pubkey::default()`.
    pub collateral_nft_mints: [Pubkey; MAX_NFT_COLLATERALS],

    /// Deposit notes locked as collateral
    pub deposits: [ObligationPosition; MAX_DEPOSITS],

    /// Loan notes owed
    pub loans: [ObligationPosition; MAX_LOANS],

    pub valuation: CachedValuation,

    pub _padding: [u8; 128],
}

/// Notes of one reserve held by the obligation
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
#[repr(C)]
pub struct ObligationPosition {
    pub reserve: Pubkey,
    pub notes: u64,
    pub _padding: u64,
}

/// Values in quote currency calculated by the last health check. WAD.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct CachedValuation {
    pub collateral_value: i128,
    pub debt_value: i128,
    pub slot: Slot,
    pub _padding: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valuation {
    pub collateral_value: Decimal,
    pub debt_value: Decimal,
    /// Min collateral ratio of the loan's reserve. ONE when there is no loan.
    pub min_collateral_ratio: Decimal,
}

impl Valuation {
    /// None means infinite ratio (no debt)
    pub fn health_ratio(&self) -> LendyResult<Option<Decimal>> {
        if self.debt_value.is_zero() {
            return Ok(None);
        }
        Ok(Some(self.collateral_value.checked_div(self.debt_value)?))
    }

    pub fn is_healthy(&self) -> LendyResult<bool> {
        Ok(match self.health_ratio()? {
            None => true,
            Some(ratio) => ratio >= self.min_collateral_ratio,
        })
    }
}

impl PodAccount for Obligation {
    const DISCRIMINATOR: &'static [u8; 8] = OBLIGATION_DISCRIMINATOR;

    const VERSION: u8 = 1;

    type InitParams = (/*market:*/ Pubkey, /*owner:*/ Pubkey, LastUpdate);

    fn discriminator(&self) -> &[u8] {
        &self.discriminator
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn init_unchecked(&mut self, (market, owner, last_update): Self::InitParams) {
        self.discriminator = *OBLIGATION_DISCRIMINATOR;
        self.version = Self::VERSION;
        self.market = market;
        self.owner = owner;
        self.last_update = last_update;
    }
}

impl ObligationPosition {
    pub fn is_vacant(&self) -> bool {
        self.reserve == Pubkey::default()
    }

    fn vacate(&mut self) {
        *self = Self::zeroed();
    }
}

impl Obligation {
    pub fn flags(&self) -> ObligationFlags {
        ObligationFlags::from_bits_truncate(self.flags)
    }

    pub fn is_solvent_liquidated(&self) -> bool {
        self.flags().contains(ObligationFlags::SOLVENT_LIQUIDATED)
    }

    pub fn set_solvent_liquidated(&mut self, value: bool) {
        let mut flags = self.flags();
        flags.set(ObligationFlags::SOLVENT_LIQUIDATED, value);
        self.flags = flags.bits();
    }

    pub fn nft_mints(&self) -> impl Iterator<Item = &Pubkey> {
        self.collateral_nft_mints
            .iter()
            .filter(|mint| **mint != Pubkey::default())
    }

    pub fn nft_count(&self) -> usize {
        self.nft_mints().count()
    }

    pub fn has_nft(&self, mint: &Pubkey) -> bool {
        self.nft_mints().any(|held| held == mint)
    }

    pub fn add_nft(&mut self, mint: Pubkey) -> LendyResult<()> {
        if self.has_nft(&mint) {
            msg!("NFT {} is already deposited", mint);
            return Err(NftLendyError::NftCollateralExists);
        }

        let slot = self
            .collateral_nft_mints
            .iter_mut()
            .find(|slot| **slot == Pubkey::default())
            .ok_or_else(|| {
                msg!("obligation already holds {} NFTs", MAX_NFT_COLLATERALS);
                NftLendyError::NoFreeObligation
            })?;
        *slot = mint;

        Ok(())
    }

    pub fn remove_nft(&mut self, mint: &Pubkey) -> LendyResult<()> {
        let slot = self
            .collateral_nft_mints
            .iter_mut()
            .find(|slot| *slot == mint && **slot != Pubkey::default())
            .ok_or_else(|| {
                msg!("NFT {} is not deposited into the obligation", mint);
                NftLendyError::UnregisteredPosition
            })?;
        *slot = Pubkey::default();

        Ok(())
    }

    pub fn loan(&self) -> Option<&ObligationPosition> {
        self.loans.iter().find(|loan| !loan.is_vacant())
    }

    pub fn deposits(&self) -> impl Iterator<Item = &ObligationPosition> {
        self.deposits.iter().filter(|deposit| !deposit.is_vacant())
    }

    pub fn deposit(&self, reserve: &Pubkey) -> Option<&ObligationPosition> {
        self.deposits().find(|deposit| deposit.reserve == *reserve)
    }

    /// Loan notes owed to the `reserve`
    pub fn loan_notes(&self, reserve: &Pubkey) -> LendyResult<u64> {
        match self.loan() {
            Some(loan) if loan.reserve == *reserve => Ok(loan.notes),
            _ => {
                msg!("obligation has no loan in reserve {}", reserve);
                Err(NftLendyError::UnregisteredPosition)
            }
        }
    }

    pub fn add_loan(&mut self, reserve: Pubkey, notes: u64) -> LendyResult<()> {
        if let Some(loan) = self.loan() {
            if loan.reserve != reserve {
                msg!(
                    "obligation already has a loan in reserve {}",
                    loan.reserve
                );
                return Err(NftLendyError::AnotherLoanOutstanding);
            }
        }

        if self.deposit(&reserve).is_some() {
            msg!("obligation holds deposit collateral in borrow reserve {}", reserve);
            return Err(NftLendyError::SimultaneousDepositAndBorrow);
        }

        let position = position_mut(&mut self.loans, &reserve)?;
        position.reserve = reserve;
        position.notes = position.notes.checked_add(notes).ok_or_else(|| {
            NftLendyError::ArithmeticError(format!(
                "add_loan(): checked_add {} + {}",
                position.notes, notes
            ))
        })?;

        Ok(())
    }

    /// Reduces loan notes. Position is released when no notes left.
    pub fn reduce_loan(&mut self, reserve: &Pubkey, notes: u64) -> LendyResult<()> {
        reduce_position(&mut self.loans, reserve, notes)
    }

    pub fn add_deposit(&mut self, reserve: Pubkey, notes: u64) -> LendyResult<()> {
        if matches!(self.loan(), Some(loan) if loan.reserve == reserve) {
            msg!("obligation has a loan in deposit reserve {}", reserve);
            return Err(NftLendyError::SimultaneousDepositAndBorrow);
        }

        let position = position_mut(&mut self.deposits, &reserve)?;
        position.reserve = reserve;
        position.notes = position.notes.checked_add(notes).ok_or_else(|| {
            NftLendyError::ArithmeticError(format!(
                "add_deposit(): checked_add {} + {}",
                position.notes, notes
            ))
        })?;

        Ok(())
    }

    pub fn reduce_deposit(&mut self, reserve: &Pubkey, notes: u64) -> LendyResult<()> {
        reduce_position(&mut self.deposits, reserve, notes)
    }

    pub fn has_positions(&self) -> bool {
        self.loan().is_some() || self.deposits().next().is_some()
    }

    /// Values collateral and debt with prices cached by `reserves`. NFTs are priced by the
    /// floor price of the loan's reserve or, without a loan, of the first given reserve.
    /// Every used reserve must be refreshed in `current_slot`.
    pub fn valuate(&self, reserves: &[(Pubkey, Reserve)], current_slot: Slot) -> LendyResult<Valuation> {
        let mut collateral_value = Decimal::ZERO;
        let mut debt_value = Decimal::ZERO;
        let mut min_collateral_ratio = Decimal::ONE;

        let pricing_reserve = match self.loan() {
            Some(loan) => {
                let reserve = self.find_reserve(reserves, &loan.reserve, current_slot)?;
                debt_value = reserve.loan_value(loan.notes)?;
                min_collateral_ratio =
                    Decimal::from_basis_points(reserve.config.min_collateral_ratio as u32)?;
                Some(reserve)
            }
            None => match reserves.first() {
                Some((key, _)) => Some(self.find_reserve(reserves, key, current_slot)?),
                None => None,
            },
        };

        let nft_count = self.nft_count() as u64;
        if nft_count > 0 {
            let reserve = pricing_reserve.ok_or_else(|| {
                msg!("no reserve provided to price NFT collateral");
                NftLendyError::ObligationAccountMismatch
            })?;
            collateral_value = reserve
                .nft_floor_price()?
                .checked_mul(Decimal::from(nft_count))?;
        }

        for deposit in self.deposits() {
            let reserve = self.find_reserve(reserves, &deposit.reserve, current_slot)?;
            collateral_value = collateral_value.checked_add(reserve.deposit_value(deposit.notes)?)?;
        }

        Ok(Valuation {
            collateral_value,
            debt_value,
            min_collateral_ratio,
        })
    }

    fn find_reserve<'a>(
        &self,
        reserves: &'a [(Pubkey, Reserve)],
        key: &Pubkey,
        current_slot: Slot,
    ) -> LendyResult<&'a Reserve> {
        let (_, reserve) = reserves
            .iter()
            .find(|(reserve_key, _)| reserve_key == key)
            .ok_or_else(|| {
                msg!("reserve {} is not provided for obligation valuation", key);
                NftLendyError::ObligationAccountMismatch
            })?;
        if reserve.market != self.market {
            msg!("reserve {} belongs to another market", key);
            return Err(NftLendyError::ObligationAccountMismatch);
        }
        reserve.ensure_current(current_slot)?;
        Ok(reserve)
    }

    pub fn set_valuation(&mut self, valuation: &Valuation, slot: Slot, timestamp: i64) -> LendyResult<()> {
        self.valuation.collateral_value = valuation.collateral_value.into_bits()?;
        self.valuation.debt_value = valuation.debt_value.into_bits()?;
        self.valuation.slot = slot;
        self.last_update.update(slot, timestamp);
        Ok(())
    }
}

fn position_mut<'a, const N: usize>(
    positions: &'a mut [ObligationPosition; N],
    reserve: &Pubkey,
) -> LendyResult<&'a mut ObligationPosition> {
    let index = positions
        .iter()
        .position(|position| position.reserve == *reserve)
        .or_else(|| positions.iter().position(ObligationPosition::is_vacant))
        .ok_or_else(|| {
            msg!("all {} position slots are taken", N);
            NftLendyError::NoFreeObligation
        })?;
    Ok(&mut positions[index])
}

fn reduce_position<const N: usize>(
    positions: &mut [ObligationPosition; N],
    reserve: &Pubkey,
    notes: u64,
) -> LendyResult<()> {
    let position = positions
        .iter_mut()
        .find(|position| !position.is_vacant() && position.reserve == *reserve)
        .ok_or_else(|| {
            msg!("obligation has no position in reserve {}", reserve);
            NftLendyError::UnregisteredPosition
        })?;

    position.notes = position.notes.checked_sub(notes).ok_or_else(|| {
        NftLendyError::ArithmeticError(format!(
            "reduce_position(): checked_sub {} - {}",
            position.notes, notes
        ))
    })?;

    if position.notes == 0 {
        position.vacate();
    }

    Ok(())
}
