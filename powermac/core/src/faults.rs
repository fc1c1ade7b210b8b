//! Guest memory fault classification.
//!
//! A fault from the core is either a screen write the host's video layer
//! claims, a known-benign Mac OS probe to skip, or a real crash. The probe
//! table lists the install/driver checks various Mac OS versions perform
//! against physical addresses no emulator maps.

use ppc_core::MemFault;

use crate::engine::{EngineId, Machine};
use crate::host::HostServices;
use crate::lowmem::{ROM_AREA_SIZE, ROM_BASE, ROM_SIZE};
use crate::{EngineError, Result};

/// What to do with a classified fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// A handler fixed the cause; re-run the faulting instruction.
    Retry,
    /// Known-benign probe; resume at the next instruction.
    Skip,
}

struct Probe {
    /// Faulting PC, relative to the ROM base.
    pc_offset: u32,
    /// GPR whose contents identify the probe.
    gpr: usize,
    values: &'static [u32],
}

const KNOWN_PROBES: &[Probe] = &[
    // "VM settings" during MacOS 8 installation
    Probe { pc_offset: 0x488160, gpr: 20, values: &[0xf800_0000] },
    // MacOS 8.5 installation
    Probe { pc_offset: 0x488140, gpr: 16, values: &[0xf800_0000] },
    // MacOS 8 serial drivers on startup
    Probe { pc_offset: 0x48e080, gpr: 8, values: &[0xf301_2002, 0xf301_2000] },
    // MacOS 8.1 serial drivers on startup
    Probe { pc_offset: 0x48c5e0, gpr: 20, values: &[0xf301_2002, 0xf301_2000] },
    Probe { pc_offset: 0x4a10a0, gpr: 20, values: &[0xf301_2002, 0xf301_2000] },
];

impl Machine {
    /// Classify a guest fault; `Err` means dump state and die.
    pub fn classify_fault(
        &mut self,
        host: &mut dyn HostServices,
        fault: MemFault,
    ) -> Result<FaultAction> {
        let pc = self.cpu().regs.pc;

        if host.screen_fault(self, fault.addr, pc) {
            return Ok(FaultAction::Retry);
        }

        // Writes into the ROM image are silently dropped.
        if fault.addr.wrapping_sub(ROM_BASE) < ROM_SIZE {
            return Ok(FaultAction::Skip);
        }

        let in_rom = pc.wrapping_sub(ROM_BASE) < ROM_AREA_SIZE;
        let in_ram = pc.wrapping_sub(self.mem.ram_base()) < self.mem.ram_size();
        if in_rom || in_ram {
            for probe in KNOWN_PROBES {
                if pc == ROM_BASE.wrapping_add(probe.pc_offset)
                    && probe.values.contains(&self.cpu().regs.gpr[probe.gpr])
                {
                    return Ok(FaultAction::Skip);
                }
            }
            if self.config().prefs.ignoresegv {
                return Ok(FaultAction::Skip);
            }
        }

        eprintln!("SIGSEGV");
        eprintln!("  pc {pc:#010x}");
        eprintln!("  ea {:#010x}", fault.addr);
        eprintln!(
            " cpu {}",
            match self.current_engine() {
                EngineId::Main => "main",
                EngineId::Interrupt => "interrupts",
            }
        );
        self.dump_registers();
        self.dump_log();
        Err(EngineError::GuestFault {
            addr: fault.addr,
            pc,
        })
    }

    /// Run-loop hook: apply the classification to the current engine.
    pub(crate) fn handle_fault(&mut self, host: &mut dyn HostServices, fault: MemFault) -> Result<()> {
        match self.classify_fault(host, fault)? {
            FaultAction::Retry => Ok(()),
            FaultAction::Skip => {
                let regs = &mut self.cpu_mut().regs;
                regs.pc = regs.pc.wrapping_add(4);
                Ok(())
            }
        }
    }
}
