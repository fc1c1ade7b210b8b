//! Host services reached from guest traps.
//!
//! The dispatcher hands every native-op and EMUL_OP trap to this trait.
//! Implementations get the machine back as a parameter so they can
//! re-enter guest execution (`execute_68k`, `call_macos`, ...) from inside
//! a handler; the nesting unwinds on the host call stack. Every method has
//! a no-op default so embedders override only the services they provide.

use crate::emulop::M68kRegisters;
use crate::engine::Machine;
use crate::Result;

/// Serial driver entry selected by the contiguous serial sub-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialCall {
    Nothing,
    Open,
    PrimeIn,
    PrimeOut,
    Control,
    Status,
    Close,
}

pub trait HostServices {
    /// 68k-interpreter extension trap. `index` is the extension-table
    /// index; out-of-range indices are this handler's to reject.
    fn emul_op(
        &mut self,
        _machine: &mut Machine,
        _regs: &mut M68kRegisters,
        _pc: u32,
        _index: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn patch_name_registry(&mut self, _machine: &mut Machine) -> Result<()> {
        Ok(())
    }

    fn video_install_accel(&mut self, _machine: &mut Machine) -> Result<()> {
        Ok(())
    }

    fn video_vbl(&mut self, _machine: &mut Machine) -> Result<()> {
        Ok(())
    }

    /// Video driver IO; the 16-bit status result lands in GPR3.
    fn video_driver_io(&mut self, _machine: &mut Machine, _args: [u32; 5]) -> Result<i16> {
        Ok(0)
    }

    fn ether_irq(&mut self, _machine: &mut Machine) -> Result<()> {
        Ok(())
    }

    fn ether_init(&mut self, _machine: &mut Machine, _glob: u32) -> Result<u32> {
        Ok(0)
    }

    fn ether_term(&mut self, _machine: &mut Machine) -> Result<()> {
        Ok(())
    }

    fn ether_open(&mut self, _machine: &mut Machine, _args: [u32; 5]) -> Result<u32> {
        Ok(0)
    }

    fn ether_close(&mut self, _machine: &mut Machine, _args: [u32; 3]) -> Result<u32> {
        Ok(0)
    }

    fn ether_wput(&mut self, _machine: &mut Machine, _queue: u32, _msg: u32) -> Result<u32> {
        Ok(0)
    }

    fn ether_rsrv(&mut self, _machine: &mut Machine, _queue: u32) -> Result<u32> {
        Ok(0)
    }

    /// Serial driver entry; the 16-bit result lands in GPR3.
    fn serial_io(
        &mut self,
        _machine: &mut Machine,
        _call: SerialCall,
        _pb: u32,
        _dce: u32,
    ) -> Result<i16> {
        Ok(0)
    }

    /// Post-hook of the Resource Manager thunk; may rewrite the handle's
    /// contents (purgeable CODE resources).
    fn check_load(&mut self, _machine: &mut Machine, _rtype: u32, _id: i16, _handle: u32) -> Result<()> {
        Ok(())
    }

    fn make_executable(&mut self, _machine: &mut Machine, _addr: u32, _len: u32) -> Result<()> {
        Ok(())
    }

    /// First chance at a guest memory fault; return true if a screen
    /// handler claimed it and the faulting instruction should be retried.
    fn screen_fault(&mut self, _machine: &mut Machine, _addr: u32, _pc: u32) -> bool {
        false
    }
}

/// Services that provide nothing; useful for tests and bring-up.
#[derive(Debug, Default)]
pub struct NullServices;

impl HostServices for NullServices {}
