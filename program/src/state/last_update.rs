use std::cmp::Ordering;

use bytemuck::{Pod, Zeroable};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use solana_program::clock::Slot;

use crate::error::NftLendyError;
use crate::math::MathError;
use crate::LendyResult;

static_assertions::const_assert_eq!(0, std::mem::size_of::<LastUpdate>() % 8);

/// Accrual state of the account
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccrualState {
    /// Refreshed in the current slot
    Current = 0,
    /// Refreshed in one of previous slots or modified after refresh
    Stale = 1,
    /// Last refresh did not manage to accrue the whole elapsed period
    ExceptionallyStale = 2,
}

/// Last update state
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct LastUpdate {
    /// Last slot when updated
    pub slot: Slot,
    pub timestamp: i64,

    /// `AccrualState` value
    pub stale: u8,

    pub _padding: [u8; 15],
}

impl LastUpdate {
    /// Create new last update
    pub fn new(slot: Slot, timestamp: i64) -> Self {
        Self {
            slot,
            timestamp,
            stale: AccrualState::Stale.into(),
            _padding: Zeroable::zeroed(),
        }
    }

    /// Return slots elapsed since given slot
    pub fn slots_elapsed(&self, slot: Slot) -> LendyResult<u64> {
        let slots_elapsed = slot.checked_sub(self.slot).ok_or(MathError(format!(
            "slots_elapsed(): checked_sub {} - {}",
            slot, self.slot
        )))?;
        Ok(slots_elapsed)
    }

    /// Set last update slot
    pub fn update(&mut self, slot: Slot, timestamp: i64) {
        self.slot = slot;
        self.timestamp = timestamp;
        self.stale = AccrualState::Current.into();
    }

    /// Moves updated slot forward by `slots` but not up to the current slot.
    pub fn advance_partially(&mut self, slots: u64) -> LendyResult<()> {
        self.slot = self.slot.checked_add(slots).ok_or(MathError(format!(
            "advance_partially(): checked_add {} + {}",
            self.slot, slots
        )))?;
        self.stale = AccrualState::ExceptionallyStale.into();
        Ok(())
    }

    /// Set stale to true
    pub fn mark_stale(&mut self) {
        if self.stale == u8::from(AccrualState::Current) {
            self.stale = AccrualState::Stale.into();
        }
    }

    pub fn state(&self, current_slot: Slot) -> LendyResult<AccrualState> {
        let stored = AccrualState::try_from(self.stale).map_err(|_| {
            NftLendyError::Internal(format!("unknown accrual state {}", self.stale))
        })?;

        Ok(match stored {
            AccrualState::Current if self.slot != current_slot => AccrualState::Stale,
            state => state,
        })
    }

    pub fn is_stale_by_slot(
        &self,
        current_slot: Slot,
        stale_threshold_slots: Slot,
    ) -> LendyResult<bool> {
        Ok(self.stale != u8::from(AccrualState::Current)
            || self.slots_elapsed(current_slot)? >= stale_threshold_slots)
    }
}

impl PartialEq for LastUpdate {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl PartialOrd for LastUpdate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.slot.partial_cmp(&other.slot)
    }
}
