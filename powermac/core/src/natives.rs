//! Native-op selectors, the pre-assembled opcode table, and the dispatcher.

use once_cell::sync::Lazy;

use crate::emulop::SyntheticOp;
use crate::engine::Machine;
use crate::host::{HostServices, SerialCall};
use crate::{EngineError, Result};

/// Host services reachable through EXEC_NATIVE, in selector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCall {
    PatchNameRegistry,
    VideoInstallAccel,
    VideoVbl,
    VideoDoDriverIo,
    EtherIrq,
    EtherInit,
    EtherTerm,
    EtherOpen,
    EtherClose,
    EtherWput,
    EtherRsrv,
    SerialNothing,
    SerialOpen,
    SerialPrimeIn,
    SerialPrimeOut,
    SerialControl,
    SerialStatus,
    SerialClose,
    GetResource,
    Get1Resource,
    GetIndResource,
    Get1IndResource,
    RGetResource,
    DisableInterrupt,
    EnableInterrupt,
    MakeExecutable,
}

pub const NATIVE_OP_MAX: usize = 26;

impl NativeCall {
    pub const ALL: [NativeCall; NATIVE_OP_MAX] = [
        NativeCall::PatchNameRegistry,
        NativeCall::VideoInstallAccel,
        NativeCall::VideoVbl,
        NativeCall::VideoDoDriverIo,
        NativeCall::EtherIrq,
        NativeCall::EtherInit,
        NativeCall::EtherTerm,
        NativeCall::EtherOpen,
        NativeCall::EtherClose,
        NativeCall::EtherWput,
        NativeCall::EtherRsrv,
        NativeCall::SerialNothing,
        NativeCall::SerialOpen,
        NativeCall::SerialPrimeIn,
        NativeCall::SerialPrimeOut,
        NativeCall::SerialControl,
        NativeCall::SerialStatus,
        NativeCall::SerialClose,
        NativeCall::GetResource,
        NativeCall::Get1Resource,
        NativeCall::GetIndResource,
        NativeCall::Get1IndResource,
        NativeCall::RGetResource,
        NativeCall::DisableInterrupt,
        NativeCall::EnableInterrupt,
        NativeCall::MakeExecutable,
    ];

    pub fn selector(self) -> u32 {
        self as u32
    }

    pub fn from_selector(selector: u32) -> Option<Self> {
        Self::ALL.get(selector as usize).copied()
    }

    /// The interrupt gate ops return sequentially; everything else is
    /// invoked as a subroutine and returns through LR.
    fn via_lr(self) -> bool {
        !matches!(self, NativeCall::DisableInterrupt | NativeCall::EnableInterrupt)
    }
}

/// Build the EXEC_NATIVE opcode for one service.
pub fn native_op_opcode(call: NativeCall, via_lr: bool) -> u32 {
    SyntheticOp::ExecNative {
        selector: call.selector(),
        via_lr,
    }
    .encode()
}

/// Pre-assembled opcode per selector, exposed to the ROM patcher so guest
/// trap vectors can be pointed at host services.
pub static NATIVE_OP_TABLE: Lazy<[u32; NATIVE_OP_MAX]> =
    Lazy::new(|| NativeCall::ALL.map(|call| native_op_opcode(call, call.via_lr())));

impl Machine {
    pub(crate) fn native_op(&mut self, host: &mut dyn HostServices, selector: u32) -> Result<()> {
        let Some(call) = NativeCall::from_selector(selector) else {
            eprintln!("FATAL: native op invoked with bogus selector {selector}");
            return Err(EngineError::Fatal(format!(
                "bogus native-op selector {selector}"
            )));
        };
        let timer = self.stats.native_ops.begin();
        let result = self.dispatch_native(host, call);
        self.stats.native_ops.end(timer);
        result
    }

    fn dispatch_native(&mut self, host: &mut dyn HostServices, call: NativeCall) -> Result<()> {
        use NativeCall::*;
        match call {
            PatchNameRegistry => host.patch_name_registry(self),
            VideoInstallAccel => host.video_install_accel(self),
            VideoVbl => host.video_vbl(self),
            VideoDoDriverIo => {
                let args = {
                    let gpr = &self.cpu().regs.gpr;
                    [gpr[3], gpr[4], gpr[5], gpr[6], gpr[7]]
                };
                let status = host.video_driver_io(self, args)?;
                self.cpu_mut().regs.gpr[3] = status as i32 as u32;
                Ok(())
            }
            EtherIrq => host.ether_irq(self),
            EtherInit => {
                let glob = self.cpu().regs.gpr[3];
                let ok = host.ether_init(self, glob)?;
                self.cpu_mut().regs.gpr[3] = ok;
                Ok(())
            }
            EtherTerm => host.ether_term(self),
            EtherOpen => {
                let args = {
                    let gpr = &self.cpu().regs.gpr;
                    [gpr[3], gpr[4], gpr[5], gpr[6], gpr[7]]
                };
                let err = host.ether_open(self, args)?;
                self.cpu_mut().regs.gpr[3] = err;
                Ok(())
            }
            EtherClose => {
                let args = {
                    let gpr = &self.cpu().regs.gpr;
                    [gpr[3], gpr[4], gpr[5]]
                };
                let err = host.ether_close(self, args)?;
                self.cpu_mut().regs.gpr[3] = err;
                Ok(())
            }
            EtherWput => {
                let (queue, msg) = {
                    let gpr = &self.cpu().regs.gpr;
                    (gpr[3], gpr[4])
                };
                let err = host.ether_wput(self, queue, msg)?;
                self.cpu_mut().regs.gpr[3] = err;
                Ok(())
            }
            EtherRsrv => {
                let queue = self.cpu().regs.gpr[3];
                let err = host.ether_rsrv(self, queue)?;
                self.cpu_mut().regs.gpr[3] = err;
                Ok(())
            }
            SerialNothing | SerialOpen | SerialPrimeIn | SerialPrimeOut | SerialControl
            | SerialStatus | SerialClose => {
                let serial_call = match call {
                    SerialNothing => SerialCall::Nothing,
                    SerialOpen => SerialCall::Open,
                    SerialPrimeIn => SerialCall::PrimeIn,
                    SerialPrimeOut => SerialCall::PrimeOut,
                    SerialControl => SerialCall::Control,
                    SerialStatus => SerialCall::Status,
                    _ => SerialCall::Close,
                };
                let (pb, dce) = {
                    let gpr = &self.cpu().regs.gpr;
                    (gpr[3], gpr[4])
                };
                let status = host.serial_io(self, serial_call, pb, dce)?;
                self.cpu_mut().regs.gpr[3] = status as i32 as u32;
                Ok(())
            }
            GetResource | Get1Resource | GetIndResource | Get1IndResource | RGetResource => {
                self.get_resource_thunk(host, call)
            }
            DisableInterrupt => self.disable_interrupt(),
            EnableInterrupt => self.enable_interrupt(),
            MakeExecutable => {
                let (addr, len) = {
                    let gpr = &self.cpu().regs.gpr;
                    (gpr[4], gpr[5])
                };
                host.make_executable(self, addr, len)
            }
        }
    }
}
