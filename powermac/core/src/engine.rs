//! Engine lifecycle and the outer run loop.
//!
//! A `Machine` owns one main engine, an optional second engine dedicated
//! to interrupts, the guest address space and the statistics. Exactly one
//! engine is current at any time; everything the glue does addresses the
//! current engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use ppc_core::{Cpu, Exit, SPCFLAG_TRIGGER_INTERRUPT};

use crate::config::MachineConfig;
use crate::emulop::{SyntheticOp, M68K_EXEC_RETURN, SYNTHETIC_PRIMARY};
use crate::host::HostServices;
use crate::lowmem::{
    KERNEL_DATA_BASE, MODE_68K, ROM_BASE, ROM_BOOT_ARG, ROM_SIZE, XLM_68K_EXEC_RETURN,
    XLM_EXEC_RETURN_OPCODE, XLM_IRQ_NEST, XLM_KERNEL_DATA, XLM_NATIVE_OP_TABLE, XLM_RUN_MODE,
};
use crate::mem::GuestMemory;
use crate::natives::NATIVE_OP_TABLE;
use crate::{debug_enabled, EngineError, Result};

/// One PowerPC engine: a core instance plus its translation cache.
pub struct Engine {
    pub cpu: Cpu,
}

impl Engine {
    fn new(translation: bool) -> Self {
        let mut cpu = Cpu::new(translation);
        cpu.register_extension(SYNTHETIC_PRIMARY, "emulop");
        Engine { cpu }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineId {
    Main,
    Interrupt,
}

/// Count/elapsed-time pair for one category of host work.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatBucket {
    pub count: u64,
    pub time: Duration,
}

impl StatBucket {
    pub(crate) fn begin(&mut self) -> Instant {
        self.count += 1;
        Instant::now()
    }

    pub(crate) fn end(&mut self, started: Instant) {
        self.time += started.elapsed();
    }

    fn print(&self, label: &str, total: Duration) {
        println!("Total {label} count : {}", self.count);
        let share = if total.is_zero() {
            0.0
        } else {
            100.0 * self.time.as_secs_f64() / total.as_secs_f64()
        };
        println!(
            "Total {label} time  : {:.1} sec ({share:.1}%)",
            self.time.as_secs_f64()
        );
    }
}

/// Emulation-time statistics, printed at teardown.
#[derive(Debug)]
pub struct EmulStats {
    started: Instant,
    pub interrupts: StatBucket,
    pub exec_68k: StatBucket,
    pub native_ops: StatBucket,
    pub macos_calls: StatBucket,
}

impl EmulStats {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            interrupts: StatBucket::default(),
            exec_68k: StatBucket::default(),
            native_ops: StatBucket::default(),
            macos_calls: StatBucket::default(),
        }
    }
}

pub struct Machine {
    config: MachineConfig,
    pub mem: GuestMemory,
    main: Engine,
    interrupt_engine: Option<Engine>,
    current: EngineId,
    interrupt_flags: AtomicU32,
    pub(crate) stats: EmulStats,
}

impl Machine {
    /// Build the machine: engines, guest memory, and the low-memory words
    /// the guest ABI expects (run mode, trampolines, native-op table).
    pub fn new(config: MachineConfig) -> Result<Self> {
        let mut mem = GuestMemory::new(&config);
        mem.write_u32(XLM_KERNEL_DATA, KERNEL_DATA_BASE)?;
        mem.write_u32(XLM_RUN_MODE, MODE_68K)?;
        mem.write_u32(XLM_IRQ_NEST, 0)?;
        mem.write_u32(XLM_EXEC_RETURN_OPCODE, SyntheticOp::ExecReturn.encode())?;
        mem.write_u32(XLM_68K_EXEC_RETURN, (M68K_EXEC_RETURN as u32) << 16)?;
        for (i, word) in NATIVE_OP_TABLE.iter().enumerate() {
            mem.write_u32(XLM_NATIVE_OP_TABLE + 4 * i as u32, *word)?;
        }

        let translation = config.prefs.jit;
        let mut main = Engine::new(translation);
        main.cpu.regs.gpr[3] = ROM_BOOT_ARG;
        let interrupt_engine = config.multicore.then(|| Engine::new(translation));

        let mut machine = Machine {
            config,
            mem,
            main,
            interrupt_engine,
            current: EngineId::Main,
            interrupt_flags: AtomicU32::new(0),
            stats: EmulStats::new(),
        };
        machine.install_interrupt_proc()?;
        Ok(machine)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn stats(&self) -> &EmulStats {
        &self.stats
    }

    pub fn load_rom(&mut self, image: &[u8]) {
        self.mem.load_rom(image);
        self.flush_code_cache(ROM_BASE, ROM_BASE + ROM_SIZE);
    }

    pub fn current_engine(&self) -> EngineId {
        self.current
    }

    pub(crate) fn set_current(&mut self, id: EngineId) {
        self.current = id;
    }

    pub(crate) fn has_interrupt_engine(&self) -> bool {
        self.interrupt_engine.is_some()
    }

    /// Register file of the current engine.
    pub fn cpu(&self) -> &Cpu {
        match (self.current, self.interrupt_engine.as_ref()) {
            (EngineId::Interrupt, Some(engine)) => &engine.cpu,
            _ => &self.main.cpu,
        }
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        match (self.current, self.interrupt_engine.as_mut()) {
            (EngineId::Interrupt, Some(engine)) => &mut engine.cpu,
            _ => &mut self.main.cpu,
        }
    }

    /// Inspect a specific engine's core (`None` if not configured).
    pub fn engine_cpu(&self, id: EngineId) -> Option<&Cpu> {
        match id {
            EngineId::Main => Some(&self.main.cpu),
            EngineId::Interrupt => self.interrupt_engine.as_ref().map(|engine| &engine.cpu),
        }
    }

    /// Enter the emulation loop at a guest PC on the main engine.
    pub fn run(&mut self, host: &mut dyn HostServices, entry: u32) -> Result<()> {
        self.current = EngineId::Main;
        self.execute(host, entry)
    }

    /// Re-enter the core at `entry` on the current engine and service
    /// everything it hands back until an EXEC_RETURN unwinds to us.
    pub(crate) fn execute(&mut self, host: &mut dyn HostServices, entry: u32) -> Result<()> {
        self.cpu_mut().regs.pc = entry;
        loop {
            let exit = match (self.current, self.interrupt_engine.as_mut()) {
                (EngineId::Interrupt, Some(engine)) => engine.cpu.run(&mut self.mem),
                _ => self.main.cpu.run(&mut self.mem),
            };
            match exit {
                Exit::Return => return Ok(()),
                Exit::Extension(word) => self.execute_synthetic(host, word)?,
                Exit::Interrupt => {
                    // Leave the flag raised while the gate is closed so a
                    // deferred interrupt still lands after re-enable.
                    if self.mem.read_i32(XLM_IRQ_NEST)? <= 0 {
                        self.cpu().spcflags().clear(SPCFLAG_TRIGGER_INTERRUPT);
                        self.handle_interrupt(host)?;
                    }
                }
                Exit::Fault(fault) => self.handle_fault(host, fault)?,
                Exit::Illegal { pc, opcode } => {
                    eprintln!("FATAL: illegal instruction {opcode:#010x} at {pc:#010x}");
                    self.dump_registers();
                    self.dump_log();
                    return Err(EngineError::IllegalInstruction { pc, opcode });
                }
            }
        }
    }

    /// Flag a pending interrupt on the main engine.
    ///
    /// Safe to call from a device thread; delivery happens on the thread
    /// driving the core.
    pub fn trigger_interrupt(&self) {
        self.main.cpu.spcflags().set(SPCFLAG_TRIGGER_INTERRUPT);
    }

    pub fn set_interrupt_flag(&self, flags: u32) {
        self.interrupt_flags.fetch_or(flags, Ordering::SeqCst);
    }

    pub fn clear_interrupt_flag(&self, flags: u32) {
        self.interrupt_flags.fetch_and(!flags, Ordering::SeqCst);
    }

    pub fn interrupt_flags(&self) -> u32 {
        self.interrupt_flags.load(Ordering::SeqCst)
    }

    /// Invalidate cached translations on every engine.
    pub fn flush_code_cache(&mut self, start: u32, end: u32) {
        if debug_enabled() {
            eprintln!("[flush-code-cache] {start:#010x}..{end:#010x}");
        }
        self.main.cpu.invalidate_cache_range(start, end);
        if let Some(engine) = self.interrupt_engine.as_mut() {
            engine.cpu.invalidate_cache_range(start, end);
        }
    }

    /// Dump the current engine's registers to stderr.
    pub fn dump_registers(&self) {
        let regs = &self.cpu().regs;
        eprintln!("### PowerPC registers");
        for row in 0..8 {
            let base = row * 4;
            eprintln!(
                " r{:<2} {:08x}  r{:<2} {:08x}  r{:<2} {:08x}  r{:<2} {:08x}",
                base,
                regs.gpr[base],
                base + 1,
                regs.gpr[base + 1],
                base + 2,
                regs.gpr[base + 2],
                base + 3,
                regs.gpr[base + 3],
            );
        }
        eprintln!(
            "  pc {:08x}   lr {:08x}  ctr {:08x}", regs.pc, regs.lr, regs.ctr
        );
        eprintln!("  cr {:08x}  xer {:08x}", regs.cr, regs.xer);
    }

    /// Dump the current engine's recent-execution log to stderr.
    pub fn dump_log(&self) {
        eprintln!("### Recent instructions");
        self.cpu().exec_log().dump();
    }

    /// Print the emulation-time statistics the way teardown does.
    pub fn print_stats(&self) {
        let total = self.stats.started.elapsed();
        println!("### Statistics for PowerPC emulation parts");
        println!("Total emulation time : {:.1} sec", total.as_secs_f64());
        println!(
            "Total interrupt count: {} ({:.1} Hz)",
            self.stats.interrupts.count,
            self.stats.interrupts.count as f64 / total.as_secs_f64().max(f64::EPSILON)
        );
        self.stats.exec_68k.print("Execute68k[Trap] execution", total);
        self.stats.native_ops.print("NativeOp execution", total);
        self.stats.macos_calls.print("MacOS routine execution", total);
    }
}
