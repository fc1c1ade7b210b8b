//! Interrupt signalling and injection.
//!
//! Devices raise bits in the interrupt-flags bitmask and trigger the main
//! engine's pending flag; the injector runs at the next loop boundary of
//! whichever trampoline is currently inside the core. What injection does
//! depends on the run mode the guest was suspended in.

use ppc_core::ops;

use crate::emulop::M68kRegisters;
use crate::engine::{EngineId, Machine};
use crate::host::HostServices;
use crate::lowmem::{
    INTR_SAVE_GPR_BASE, KD_INTR_LEVEL_PTR, KD_INTR_MASK, KD_INTR_SAVE_AREA, KD_MSR_IMAGE,
    KD_PENDING_LEVEL_AREA, KD_SAVED_R6, KD_SAVED_SP, KERNEL_DATA_BASE, MACOS_STACK_SNIFFER,
    MODE_68K, MODE_EMUL_OP, MODE_NATIVE, PENDING_LEVEL_OFFSET, XLM_68K_R25, XLM_EXEC_RETURN_OPCODE,
    XLM_IRQ_68K_PROC, XLM_IRQ_NEST, XLM_RUN_MODE,
};
use crate::{EngineError, Result};

/// Device interrupt sources ORed into the interrupt-flags bitmask.
pub const INTFLAG_VIA: u32 = 1;
pub const INTFLAG_SERIAL: u32 = 2;
pub const INTFLAG_ETHER: u32 = 4;
pub const INTFLAG_TIMER: u32 = 8;
pub const INTFLAG_AUDIO: u32 = 16;
pub const INTFLAG_ADB: u32 = 32;

/// Inject while the guest is suspended in native PPC code.
const INTERRUPTS_IN_NATIVE_MODE: bool = true;
/// Inject while the guest is suspended inside an EMUL_OP handler.
const INTERRUPTS_IN_EMUL_OP_MODE: bool = true;

/// 68k procedure run for EMUL_OP-mode injection: push a fake exception
/// frame (format word, return address, SR) and jump through vector $64.
const INTERRUPT_68K_PROC: [u8; 18] = [
    0x3f, 0x3c, 0x00, 0x00, // move.w  #$0000,-(sp)
    0x48, 0x7a, 0x00, 0x0a, // pea     @1(pc)
    0x40, 0xe7, // move    sr,-(sp)
    0x20, 0x78, 0x00, 0x64, // move.l  $64,a0
    0x4e, 0xd0, // jmp     (a0)
    0x4e, 0x75, // @1: rts
];

impl Machine {
    pub(crate) fn install_interrupt_proc(&mut self) -> Result<()> {
        self.mem.write_bytes(XLM_IRQ_68K_PROC, &INTERRUPT_68K_PROC)?;
        Ok(())
    }

    /// Raise the disable gate. Balanced by `enable_interrupt`.
    pub fn disable_interrupt(&mut self) -> Result<()> {
        let nest = self.mem.read_i32(XLM_IRQ_NEST)?;
        self.mem.write_u32(XLM_IRQ_NEST, (nest + 1) as u32)?;
        Ok(())
    }

    pub fn enable_interrupt(&mut self) -> Result<()> {
        let nest = self.mem.read_i32(XLM_IRQ_NEST)?;
        self.mem.write_u32(XLM_IRQ_NEST, (nest - 1) as u32)?;
        Ok(())
    }

    /// Deliver a pending interrupt to the guest.
    ///
    /// Called at loop boundaries of the main engine's execution context;
    /// embedders running a device thread call it directly in async mode.
    pub fn handle_interrupt(&mut self, host: &mut dyn HostServices) -> Result<()> {
        if self.mem.read_i32(XLM_IRQ_NEST)? > 0 {
            return Ok(());
        }
        if self.interrupt_flags() == 0 {
            return Ok(());
        }
        let timer = self.stats.interrupts.begin();

        // Keep the Mac OS stack sniffer quiet across the injection.
        self.mem.write_u32(MACOS_STACK_SNIFFER, 0)?;

        match self.mem.read_u32(XLM_RUN_MODE)? {
            MODE_68K => {
                // The 68k emulator is live: raise interrupt level 1 and
                // poke the level-change mask into CR; its dispatcher does
                // the rest.
                let level_ptr = self.mem.kernel_read(KD_INTR_LEVEL_PTR)?;
                self.mem.write_u16(level_ptr, 1)?;
                let mask = self.mem.kernel_read(KD_INTR_MASK)?;
                self.cpu_mut().regs.cr |= mask;
            }
            MODE_NATIVE if INTERRUPTS_IN_NATIVE_MODE => {
                // Not already inside the nanokernel?
                if self.cpu().regs.gpr[1] != KERNEL_DATA_BASE {
                    let level_ptr = self.mem.kernel_read(KD_INTR_LEVEL_PTR)?;
                    self.mem.write_u16(level_ptr, 1)?;
                    let pending = self
                        .mem
                        .kernel_read(KD_PENDING_LEVEL_AREA)?
                        .wrapping_add(PENDING_LEVEL_OFFSET);
                    let mask = self.mem.kernel_read(KD_INTR_MASK)?;
                    let level = self.mem.read_u32(pending)?;
                    self.mem.write_u32(pending, level | mask)?;

                    // The nanokernel re-enables through the native op on
                    // its way out.
                    self.disable_interrupt()?;
                    if self.has_interrupt_engine() {
                        self.set_current(EngineId::Interrupt);
                    }
                    let entry = self.config().rom_type.interrupt_entry();
                    let result = self.interrupt(host, entry);
                    self.set_current(EngineId::Main);
                    result?;
                }
            }
            MODE_EMUL_OP if INTERRUPTS_IN_EMUL_OP_MODE => {
                // Run the 68k interrupt routine directly, but only when
                // the guest interrupt level is 0.
                let level = self.mem.read_u32(XLM_68K_R25)?;
                if level & 7 == 0 {
                    self.mem.write_u32(XLM_68K_R25, 0x21)?;
                    let mut regs = M68kRegisters::default();
                    let result = self.execute_68k(host, XLM_IRQ_68K_PROC, &mut regs);
                    self.mem.write_u32(XLM_68K_R25, level)?;
                    result?;
                }
            }
            _ => {}
        }

        self.stats.interrupts.end(timer);
        Ok(())
    }

    /// Build a nanokernel interrupt frame and run the interrupt routine.
    pub(crate) fn interrupt(&mut self, host: &mut dyn HostServices, entry: u32) -> Result<()> {
        // On a dedicated interrupt engine the register file is scratch;
        // single-engine mode must restore what the main flow was doing.
        let saved = if self.has_interrupt_engine() {
            None
        } else {
            let regs = &self.cpu().regs;
            Some((regs.pc, regs.lr, regs.ctr, regs.gpr[1]))
        };

        // Run the nanokernel on the alternate stack.
        let alt_sp = self.config().alt_stack().wrapping_sub(64);
        self.cpu_mut().regs.gpr[1] = alt_sp;

        self.mem.kernel_write(KD_SAVED_SP, alt_sp)?;
        let old_r6 = self.cpu().regs.gpr[6];
        self.mem.kernel_write(KD_SAVED_R6, old_r6)?;

        let save_area = self.mem.kernel_read(KD_INTR_SAVE_AREA)?;
        if save_area == 0 {
            return Err(EngineError::Fatal(
                "kernel-data interrupt save area is null".into(),
            ));
        }
        for i in 0..7u32 {
            let value = self.cpu().regs.gpr[7 + i as usize];
            self.mem
                .write_u32(save_area + INTR_SAVE_GPR_BASE + 8 * i, value)?;
        }

        let msr_image = self.mem.kernel_read(KD_MSR_IMAGE)?;
        {
            let regs = &mut self.cpu_mut().regs;
            regs.gpr[1] = KERNEL_DATA_BASE;
            regs.gpr[6] = save_area;
            regs.gpr[7] = msr_image;
            regs.gpr[8] = 0;
            regs.gpr[10] = XLM_EXEC_RETURN_OPCODE;
            regs.gpr[12] = XLM_EXEC_RETURN_OPCODE;
            regs.gpr[13] = regs.cr;

            // rlwimi. r7,r7,8,0,0
            let rotated = ops::rlwimi(regs.gpr[7], regs.gpr[7], 8, 0, 0);
            regs.record_cr0(rotated);
            regs.gpr[7] = rotated;

            regs.gpr[11] = 0xf072; // simulated MSR (SRR1)
            regs.cr = (regs.gpr[11] & 0x0fff_0000) | (regs.cr & !0x0fff_0000);
        }

        self.execute(host, entry)?;

        if let Some((pc, lr, ctr, sp)) = saved {
            let regs = &mut self.cpu_mut().regs;
            regs.pc = pc;
            regs.lr = lr;
            regs.ctr = ctr;
            regs.gpr[1] = sp;
        }
        Ok(())
    }
}
