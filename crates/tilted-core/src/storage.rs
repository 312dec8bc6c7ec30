//! Calibration progress carried across deep sleep
//!
//! The sensor node loses all RAM when it sleeps except a small scratch
//! region. The calibration counter is the only state kept there, encoded as
//! a versioned `postcard` blob so that a firmware change or uninitialised
//! memory reads back as "not calibrating" instead of a bogus counter.

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Size of the scratch region reserved for the blob
pub const BLOB_SIZE: usize = 16;

/// Layout version written into every blob
const BLOB_VERSION: u8 = 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Failed to encode calibration state")]
    Encode,
    #[error("Scratch memory rejected the write")]
    WriteFailed,
}

/// Port for the memory region that survives deep sleep.
pub trait ScratchMemory {
    fn read(&mut self) -> [u8; BLOB_SIZE];

    fn write(&mut self, blob: &[u8; BLOB_SIZE]) -> Result<(), PersistenceError>;
}

#[derive(Serialize, Deserialize)]
struct Blob {
    version: u8,
    iteration_count: u32,
}

/// Calibration progress. `iteration_count == 0` means not calibrating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationState {
    pub iteration_count: u32,
}

impl CalibrationState {
    pub const INACTIVE: Self = Self { iteration_count: 0 };

    pub const fn is_active(&self) -> bool {
        self.iteration_count > 0
    }

    /// Decode a blob. Anything that is not a current-version blob is inactive.
    pub fn decode(blob: &[u8; BLOB_SIZE]) -> Self {
        match postcard::from_bytes::<Blob>(blob) {
            Ok(b) if b.version == BLOB_VERSION => Self {
                iteration_count: b.iteration_count,
            },
            Ok(b) => {
                warn!("Ignoring calibration blob with version {}", b.version);
                Self::INACTIVE
            }
            Err(_) => {
                warn!("Calibration blob did not decode, starting inactive");
                Self::INACTIVE
            }
        }
    }

    pub fn encode(&self) -> Result<[u8; BLOB_SIZE], PersistenceError> {
        let mut blob = [0u8; BLOB_SIZE];
        let value = Blob {
            version: BLOB_VERSION,
            iteration_count: self.iteration_count,
        };
        postcard::to_slice(&value, &mut blob).map_err(|_| PersistenceError::Encode)?;
        Ok(blob)
    }

    pub fn load<S: ScratchMemory>(scratch: &mut S) -> Self {
        Self::decode(&scratch.read())
    }

    pub fn save<S: ScratchMemory>(&self, scratch: &mut S) -> Result<(), PersistenceError> {
        scratch.write(&self.encode()?)
    }
}
