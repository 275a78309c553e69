//! Register store for slave-side data
//!
//! This module provides thread-safe storage for the slave's coils and
//! holding registers. Storage is a pair of fixed-size arrays chosen at
//! construction, zero-initialized, behind `RwLock` so the dispatcher and
//! the simulation driver can share one store through an `Arc`.
//!
//! Every accessor is bounds-checked; an out-of-range address is an error
//! value, never a panic. All addressing is 0-based.

use std::sync::RwLock;

use crate::error::{RtuError, RtuResult};
use crate::protocol::Address;

/// Thread-safe coil and holding register storage
#[derive(Debug)]
pub struct RegisterStore {
    /// Coils (read/write) - 1 bit each
    coils: RwLock<Vec<bool>>,
    /// Holding registers (read/write) - 16 bits each
    holding: RwLock<Vec<u16>>,
}

impl RegisterStore {
    /// Create a store with the given array sizes, all values zeroed
    pub fn new(coil_count: u16, holding_count: u16) -> RtuResult<Self> {
        if coil_count == 0 || holding_count == 0 {
            return Err(RtuError::configuration(format!(
                "Register store sizes must be non-zero (coils={}, holding={})",
                coil_count, holding_count
            )));
        }

        Ok(Self {
            coils: RwLock::new(vec![false; coil_count as usize]),
            holding: RwLock::new(vec![0u16; holding_count as usize]),
        })
    }

    /// Number of coils in the store
    pub fn coil_count(&self) -> u16 {
        self.coils
            .read()
            .map(|coils| coils.len() as u16)
            .unwrap_or(0)
    }

    /// Number of holding registers in the store
    pub fn holding_count(&self) -> u16 {
        self.holding
            .read()
            .map(|holding| holding.len() as u16)
            .unwrap_or(0)
    }

    /// Read a single coil
    pub fn get_coil(&self, address: Address) -> RtuResult<bool> {
        let coils = self
            .coils
            .read()
            .map_err(|_| RtuError::internal("Failed to lock coils"))?;

        coils
            .get(address as usize)
            .copied()
            .ok_or_else(|| RtuError::invalid_address(address, 1, coils.len() as u16))
    }

    /// Write a single coil
    pub fn set_coil(&self, address: Address, value: bool) -> RtuResult<()> {
        let mut coils = self
            .coils
            .write()
            .map_err(|_| RtuError::internal("Failed to lock coils"))?;

        let limit = coils.len() as u16;
        match coils.get_mut(address as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RtuError::invalid_address(address, 1, limit)),
        }
    }

    /// Read a single holding register
    pub fn get_holding(&self, address: Address) -> RtuResult<u16> {
        let holding = self
            .holding
            .read()
            .map_err(|_| RtuError::internal("Failed to lock holding registers"))?;

        holding
            .get(address as usize)
            .copied()
            .ok_or_else(|| RtuError::invalid_address(address, 1, holding.len() as u16))
    }

    /// Write a single holding register
    pub fn set_holding(&self, address: Address, value: u16) -> RtuResult<()> {
        let mut holding = self
            .holding
            .write()
            .map_err(|_| RtuError::internal("Failed to lock holding registers"))?;

        let limit = holding.len() as u16;
        match holding.get_mut(address as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RtuError::invalid_address(address, 1, limit)),
        }
    }

    /// Read a range of coils (function code 0x01)
    ///
    /// Fails when `start + quantity` runs past the coil array.
    pub fn coil_range(&self, start: Address, quantity: u16) -> RtuResult<Vec<bool>> {
        let coils = self
            .coils
            .read()
            .map_err(|_| RtuError::internal("Failed to lock coils"))?;

        range_check(start, quantity, coils.len() as u16)?;
        let begin = start as usize;
        Ok(coils[begin..begin + quantity as usize].to_vec())
    }

    /// Read a range of holding registers (function code 0x03)
    ///
    /// Fails when `start + quantity` runs past the register array.
    pub fn holding_range(&self, start: Address, quantity: u16) -> RtuResult<Vec<u16>> {
        let holding = self
            .holding
            .read()
            .map_err(|_| RtuError::internal("Failed to lock holding registers"))?;

        range_check(start, quantity, holding.len() as u16)?;
        let begin = start as usize;
        Ok(holding[begin..begin + quantity as usize].to_vec())
    }
}

impl Default for RegisterStore {
    /// Store with 16 coils and 16 holding registers
    fn default() -> Self {
        Self {
            coils: RwLock::new(vec![false; crate::DEFAULT_COIL_COUNT as usize]),
            holding: RwLock::new(vec![0u16; crate::DEFAULT_HOLDING_COUNT as usize]),
        }
    }
}

fn range_check(start: Address, quantity: u16, limit: u16) -> RtuResult<()> {
    if quantity == 0 || (start as u32 + quantity as u32) > limit as u32 {
        return Err(RtuError::invalid_address(start, quantity, limit));
    }
    Ok(())
}
