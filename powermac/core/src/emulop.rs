//! Synthetic opcode family (primary opcode 6, unused by the PowerPC ISA).
//!
//! Guest code escapes into the host through these words: the ROM patcher
//! plants them in trap vectors and the 68k emulator's extension table, and
//! the trampolines in `exec` build them on the fly. The low six bits select
//! the sub-function; EXEC_NATIVE carries a service selector in bits 21..25
//! (big-endian numbering) and a "return via LR" flag in bit 20.

use ppc_core::{Registers, SPCFLAG_EXEC_RETURN};

use crate::engine::Machine;
use crate::host::HostServices;
use crate::lowmem::{MODE_68K, MODE_EMUL_OP, XLM_68K_R25, XLM_RUN_MODE};
use crate::{EngineError, Result};

/// Primary opcode of the synthetic family.
pub const SYNTHETIC_PRIMARY: u8 = 6;
/// Base encoding: primary opcode 6, everything else zero.
pub const POWERPC_EMUL_OP: u32 = (SYNTHETIC_PRIMARY as u32) << 26;

/// 68k return-from-subroutine opcode.
pub const M68K_RTS: u16 = 0x4e75;
/// First 68k extension opcode: makes the 68k emulator execute the
/// PowerPC EXEC_RETURN word planted in its dispatch table.
pub const M68K_EXEC_RETURN: u16 = 0x7100;

/// A decoded synthetic opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticOp {
    /// Terminate the emulator cleanly.
    EmulReturn,
    /// Make the core return from `execute`.
    ExecReturn,
    /// Invoke a host service; `via_lr` selects the PC advance.
    ExecNative { selector: u32, via_lr: bool },
    /// 68k-interpreter extension trap; `index` keys the external handler.
    EmulOp { index: u32 },
}

impl SyntheticOp {
    /// Decode a synthetic word. `None` if the primary opcode is not 6.
    pub fn decode(word: u32) -> Option<Self> {
        if word >> 26 != SYNTHETIC_PRIMARY as u32 {
            return None;
        }
        Some(match word & 0x3f {
            0 => SyntheticOp::EmulReturn,
            1 => SyntheticOp::ExecReturn,
            2 => SyntheticOp::ExecNative {
                selector: (word >> 6) & 0x1f,
                via_lr: word & (1 << 11) != 0,
            },
            sub => SyntheticOp::EmulOp { index: sub - 3 },
        })
    }

    pub fn encode(self) -> u32 {
        match self {
            SyntheticOp::EmulReturn => POWERPC_EMUL_OP,
            SyntheticOp::ExecReturn => POWERPC_EMUL_OP | 1,
            SyntheticOp::ExecNative { selector, via_lr } => {
                POWERPC_EMUL_OP | ((via_lr as u32) << 11) | ((selector & 0x1f) << 6) | 2
            }
            // Sub-functions 0..=2 are taken, so extension indices start at 3.
            SyntheticOp::EmulOp { index } => {
                debug_assert!(index <= 0x3f - 3);
                POWERPC_EMUL_OP | ((index + 3) & 0x3f)
            }
        }
    }
}

/// 68k register snapshot exchanged with the external EMUL_OP handlers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct M68kRegisters {
    pub d: [u32; 8],
    pub a: [u32; 8],
}

/// Fixed mapping between the 68k snapshot and the PPC register banks:
/// d0..d7 live in GPR8..GPR15, a0..a6 in GPR16..GPR22. a7 (the stack)
/// is GPR1 and is handled by the callers that need it.
pub(crate) fn m68k_from_ppc(regs: &Registers, r: &mut M68kRegisters) {
    for i in 0..8 {
        r.d[i] = regs.gpr[8 + i];
    }
    for i in 0..7 {
        r.a[i] = regs.gpr[16 + i];
    }
}

pub(crate) fn m68k_to_ppc(regs: &mut Registers, r: &M68kRegisters) {
    for i in 0..8 {
        regs.gpr[8 + i] = r.d[i];
    }
    for i in 0..7 {
        regs.gpr[16 + i] = r.a[i];
    }
}

impl Machine {
    /// Dispatch one synthetic opcode handed back by the core.
    ///
    /// PC still points at the word; each sub-function decides how it
    /// advances.
    pub(crate) fn execute_synthetic(
        &mut self,
        host: &mut dyn HostServices,
        word: u32,
    ) -> Result<()> {
        let Some(op) = SyntheticOp::decode(word) else {
            return Err(EngineError::Fatal(format!(
                "opcode {word:#010x} dispatched as synthetic"
            )));
        };
        match op {
            SyntheticOp::EmulReturn => Err(EngineError::Quit),
            SyntheticOp::ExecReturn => {
                self.cpu().spcflags().set(SPCFLAG_EXEC_RETURN);
                Ok(())
            }
            SyntheticOp::ExecNative { selector, via_lr } => {
                self.native_op(host, selector)?;
                let regs = &mut self.cpu_mut().regs;
                regs.pc = if via_lr {
                    regs.lr
                } else {
                    regs.pc.wrapping_add(4)
                };
                Ok(())
            }
            SyntheticOp::EmulOp { index } => {
                let (mut r68, pc68, r25) = {
                    let regs = &self.cpu().regs;
                    let mut r = M68kRegisters::default();
                    m68k_from_ppc(regs, &mut r);
                    r.a[7] = regs.gpr[1];
                    (r, regs.gpr[24], regs.gpr[25])
                };
                self.mem.write_u32(XLM_68K_R25, r25)?;
                self.mem.write_u32(XLM_RUN_MODE, MODE_EMUL_OP)?;
                host.emul_op(self, &mut r68, pc68, index)?;
                {
                    let regs = &mut self.cpu_mut().regs;
                    m68k_to_ppc(regs, &r68);
                    regs.gpr[1] = r68.a[7];
                }
                self.mem.write_u32(XLM_RUN_MODE, MODE_68K)?;
                let regs = &mut self.cpu_mut().regs;
                regs.pc = regs.pc.wrapping_add(4);
                Ok(())
            }
        }
    }
}
