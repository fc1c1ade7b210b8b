//! Context-saving trampolines into nested guest execution.
//!
//! Each entry point pushes whatever register window its guest callee may
//! clobber onto the host stack, re-enters the core, and restores the
//! window on the way out. Nesting to arbitrary depth is ordinary
//! recursion; every frame is consumed exactly once.

use ppc_core::ops::sext16;

use crate::emulop::{m68k_from_ppc, m68k_to_ppc, M68kRegisters, SyntheticOp, M68K_RTS};
use crate::engine::Machine;
use crate::host::HostServices;
use crate::lowmem::{
    ED_EMULATOR_BASE, ED_OPCODE_TABLE, KERNEL_DATA_BASE, MODE_68K, MODE_EMUL_OP, XLM_68K_EXEC_RETURN,
    XLM_68K_R25, XLM_EXEC_RETURN_OPCODE, XLM_NATIVE_PROC, XLM_RUN_MODE, XLM_TRAP_PROC,
};
use crate::natives::{native_op_opcode, NativeCall};
use crate::{EngineError, Result};

/// Refuse `execute_68k` outside EMUL_OP mode instead of corrupting state.
const SAFE_EXEC_68K: bool = true;
/// Save the FPR14..FPR31 window around 68k execution.
const SAVE_FP_EXEC_68K: bool = true;

/// SO bit of CR field 2: the in-ROM 68k emulator's supervisor-mode marker.
const CR_SUPERVISOR_MODE: u32 = 1 << 20;

impl Machine {
    /// Run a PPC routine that ends by returning through LR.
    pub fn execute_ppc(&mut self, host: &mut dyn HostServices, entry: u32) -> Result<()> {
        let saved_lr = self.cpu().regs.lr;
        self.cpu_mut().regs.lr = XLM_EXEC_RETURN_OPCODE;
        self.execute(host, entry)?;
        self.cpu_mut().regs.lr = saved_lr;
        Ok(())
    }

    /// Call a Mac OS PPC routine through its transition vector with up to
    /// seven word arguments; returns the routine's GPR3.
    pub fn execute_macos_code(
        &mut self,
        host: &mut dyn HostServices,
        tvect: u32,
        args: &[u32],
    ) -> Result<u32> {
        if args.len() > 7 {
            return Err(EngineError::Fatal(format!(
                "Mac OS call with {} arguments (limit 7)",
                args.len()
            )));
        }
        let timer = self.stats.macos_calls.begin();

        let (saved_pc, saved_lr, saved_ctr) = {
            let regs = &self.cpu().regs;
            (regs.pc, regs.lr, regs.ctr)
        };
        {
            let regs = &mut self.cpu_mut().regs;
            regs.lr = XLM_EXEC_RETURN_OPCODE;
            regs.gpr[1] = regs.gpr[1].wrapping_sub(64);
        }
        let proc = self.mem.read_u32(tvect)?;
        let toc = self.mem.read_u32(tvect + 4)?;

        // GPR2 plus the argument registers this call will overwrite.
        let mut saved_gprs = [0u32; 8];
        {
            let gpr = &self.cpu().regs.gpr;
            saved_gprs[0] = gpr[2];
            for (i, slot) in saved_gprs[1..=args.len()].iter_mut().enumerate() {
                *slot = gpr[3 + i];
            }
        }
        {
            let gpr = &mut self.cpu_mut().regs.gpr;
            gpr[2] = toc;
            for (i, arg) in args.iter().enumerate() {
                gpr[3 + i] = *arg;
            }
        }
        self.execute(host, proc)?;
        let retval = self.cpu().regs.gpr[3];

        {
            let regs = &mut self.cpu_mut().regs;
            for (i, slot) in saved_gprs[..=args.len()].iter().enumerate() {
                regs.gpr[2 + i] = *slot;
            }
            regs.gpr[1] = regs.gpr[1].wrapping_add(64);
            regs.pc = saved_pc;
            regs.lr = saved_lr;
            regs.ctr = saved_ctr;
        }

        self.stats.macos_calls.end(timer);
        Ok(retval)
    }

    /// Embedder-facing name for a Mac OS call.
    pub fn call_macos(&mut self, host: &mut dyn HostServices, tvect: u32, args: &[u32]) -> Result<u32> {
        self.execute_macos_code(host, tvect, args)
    }

    /// Run a 68k routine (ending in RTS) through the in-ROM 68k emulator.
    ///
    /// Must be called in EMUL_OP mode. `r.a[7]` is unused; the routine
    /// runs on the caller's guest stack.
    pub fn execute_68k(
        &mut self,
        host: &mut dyn HostServices,
        entry: u32,
        r: &mut M68kRegisters,
    ) -> Result<()> {
        if SAFE_EXEC_68K && self.mem.read_u32(XLM_RUN_MODE)? != MODE_EMUL_OP {
            eprintln!("FATAL: execute_68k called outside EMUL_OP mode");
            return Err(EngineError::Fatal(
                "execute_68k called outside EMUL_OP mode".into(),
            ));
        }
        let timer = self.stats.exec_68k.begin();

        let (saved_pc, saved_lr, saved_ctr, saved_cr) = {
            let regs = &self.cpu().regs;
            (regs.pc, regs.lr, regs.ctr, regs.cr)
        };

        // Open a Mac OS stack frame with the classic back chain.
        let old_sp = self.cpu().regs.gpr[1];
        let frame_sp = old_sp.wrapping_sub(56);
        self.cpu_mut().regs.gpr[1] = frame_sp;
        self.mem.write_u32(frame_sp, old_sp)?;

        let mut saved_gprs = [0u32; 19];
        saved_gprs.copy_from_slice(&self.cpu().regs.gpr[13..32]);
        let mut saved_fprs = [0f64; 18];
        if SAVE_FP_EXEC_68K {
            saved_fprs.copy_from_slice(&self.cpu().regs.fpr[14..32]);
        }

        // Seed the 68k emulator's register convention.
        let r25 = self.mem.read_u32(XLM_68K_R25)?;
        let opcode_table = self.mem.kernel_read(ED_OPCODE_TABLE)?;
        let emulator_base = self.mem.kernel_read(ED_EMULATOR_BASE)?;
        {
            let regs = &mut self.cpu_mut().regs;
            regs.cr = CR_SUPERVISOR_MODE;
            m68k_to_ppc(regs, r);
            regs.gpr[23] = 0;
            regs.gpr[24] = entry;
            regs.gpr[25] = r25; // MSB of SR
            regs.gpr[26] = 0;
            regs.gpr[28] = 0; // VBR
            regs.gpr[29] = opcode_table;
            regs.gpr[30] = emulator_base;
            regs.gpr[31] = KERNEL_DATA_BASE + 0x1000;
            regs.gpr[0] = 0;
        }

        // Fake return address: the 68k exec-return opcode.
        let push_sp = frame_sp.wrapping_sub(4);
        self.cpu_mut().regs.gpr[1] = push_sp;
        self.mem.write_u32(push_sp, XLM_68K_EXEC_RETURN)?;

        self.mem.write_u32(XLM_RUN_MODE, MODE_68K)?;

        // First dispatch by hand: fetch the opcode, advance the 68k PC,
        // preload the sign-extended extension word, index the table.
        let opcode = self.mem.read_u16(entry)? as u32;
        let next_pc68 = entry.wrapping_add(2);
        let ext_word = self.mem.read_u16(next_pc68)?;
        let dispatch = {
            let regs = &mut self.cpu_mut().regs;
            regs.gpr[24] = next_pc68;
            regs.gpr[27] = sext16(ext_word);
            regs.gpr[29] = regs.gpr[29].wrapping_add(opcode * 8);
            regs.gpr[29]
        };
        self.execute(host, dispatch)?;

        // GPR25 carries the current 68k interrupt level back out.
        let r25_out = self.cpu().regs.gpr[25];
        self.mem.write_u32(XLM_68K_R25, r25_out)?;
        self.mem.write_u32(XLM_RUN_MODE, MODE_EMUL_OP)?;

        {
            let regs = &mut self.cpu_mut().regs;
            m68k_from_ppc(regs, r);
            regs.gpr[13..32].copy_from_slice(&saved_gprs);
            if SAVE_FP_EXEC_68K {
                regs.fpr[14..32].copy_from_slice(&saved_fprs);
            }
            regs.gpr[1] = regs.gpr[1].wrapping_add(56);
            regs.pc = saved_pc;
            regs.lr = saved_lr;
            regs.ctr = saved_ctr;
            regs.cr = saved_cr;
        }

        self.stats.exec_68k.end(timer);
        Ok(())
    }

    /// Run a 68k A-trap by synthesizing `trap; RTS` in the low-memory
    /// aperture.
    pub fn execute_68k_trap(
        &mut self,
        host: &mut dyn HostServices,
        trap: u16,
        r: &mut M68kRegisters,
    ) -> Result<()> {
        self.mem.write_u16(XLM_TRAP_PROC, trap)?;
        self.mem.write_u16(XLM_TRAP_PROC + 2, M68K_RTS)?;
        self.execute_68k(host, XLM_TRAP_PROC, r)
    }

    /// Invoke one host service through the guest trap mechanism.
    pub fn execute_native(&mut self, host: &mut dyn HostServices, call: NativeCall) -> Result<()> {
        self.mem
            .write_u32(XLM_NATIVE_PROC, native_op_opcode(call, false))?;
        self.mem
            .write_u32(XLM_NATIVE_PROC + 4, SyntheticOp::ExecReturn.encode())?;
        self.flush_code_cache(XLM_NATIVE_PROC, XLM_NATIVE_PROC + 8);
        self.execute_ppc(host, XLM_NATIVE_PROC)
    }
}
