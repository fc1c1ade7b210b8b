//! Guest memory access trait.
//!
//! All accesses are big-endian and fallible: an access outside the mapped
//! guest regions (or a store into a write-protected one) surfaces as a
//! `MemFault` that the embedder classifies, mirroring what a host signal
//! handler would see on a real mapping.

use thiserror::Error;

/// A failed guest memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("guest memory fault at {addr:#010x} (write={write})")]
pub struct MemFault {
    /// Faulting guest address.
    pub addr: u32,
    /// True for stores, false for loads and instruction fetches.
    pub write: bool,
}

impl MemFault {
    pub fn read(addr: u32) -> Self {
        Self { addr, write: false }
    }

    pub fn write(addr: u32) -> Self {
        Self { addr, write: true }
    }
}

/// Big-endian guest memory as seen by the core.
pub trait Bus {
    fn load8(&mut self, addr: u32) -> Result<u8, MemFault>;
    fn load16(&mut self, addr: u32) -> Result<u16, MemFault>;
    fn load32(&mut self, addr: u32) -> Result<u32, MemFault>;
    fn store8(&mut self, addr: u32, value: u8) -> Result<(), MemFault>;
    fn store16(&mut self, addr: u32, value: u16) -> Result<(), MemFault>;
    fn store32(&mut self, addr: u32, value: u32) -> Result<(), MemFault>;
}
