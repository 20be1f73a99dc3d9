//! Fixed layout program accounts.

use bytemuck::Pod;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PodAccountError {
    #[error("not enough data: {actual} < {expected}")]
    NotEnoughData { expected: usize, actual: usize },
    #[error("discriminator mismatch")]
    DiscriminatorMismatch,
    #[error("version mismatch: {actual} != {expected}")]
    VersionMismatch { expected: u8, actual: u8 },
    #[error("reinitialization attempt")]
    Reinit,
}

/// Account stored as plain bytes of a `#[repr(C)]` struct, prefixed by 8 bytes discriminator.
///
/// Accounts are read by copy (`try_from_bytes`) and written back with `write_bytes`, so a
/// failing instruction never leaves partially modified data behind.
pub trait PodAccount: Pod {
    const DISCRIMINATOR: &'static [u8; 8];
    const VERSION: u8;
    const SIZE: usize = std::mem::size_of::<Self>();

    type InitParams;

    fn discriminator(&self) -> &[u8];

    fn version(&self) -> u8;

    /// Fills zeroed struct with initial values.
    fn init_unchecked(&mut self, params: Self::InitParams);

    fn init_bytes(data: &mut [u8], params: Self::InitParams) -> Result<Self, PodAccountError> {
        let data = sized_mut::<Self>(data)?;
        if data[..8] != [0; 8] {
            return Err(PodAccountError::Reinit);
        }

        let mut account = Self::zeroed();
        account.init_unchecked(params);
        data.copy_from_slice(bytemuck::bytes_of(&account));

        Ok(account)
    }

    fn try_from_bytes(data: &[u8]) -> Result<Self, PodAccountError> {
        if data.len() < Self::SIZE {
            return Err(PodAccountError::NotEnoughData {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let account: Self = bytemuck::pod_read_unaligned(&data[..Self::SIZE]);
        if account.discriminator() != Self::DISCRIMINATOR {
            return Err(PodAccountError::DiscriminatorMismatch);
        }
        if account.version() != Self::VERSION {
            return Err(PodAccountError::VersionMismatch {
                expected: Self::VERSION,
                actual: account.version(),
            });
        }

        Ok(account)
    }

    fn write_bytes(&self, data: &mut [u8]) -> Result<(), PodAccountError> {
        sized_mut::<Self>(data)?.copy_from_slice(bytemuck::bytes_of(self));
        Ok(())
    }
}

fn sized_mut<T: PodAccount>(data: &mut [u8]) -> Result<&mut [u8], PodAccountError> {
    let actual = data.len();
    data.get_mut(..T::SIZE)
        .ok_or(PodAccountError::NotEnoughData {
            expected: T::SIZE,
            actual,
        })
}
