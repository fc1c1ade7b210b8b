//! CPU-engine glue for a Power Macintosh emulator.
//!
//! Bridges a generic PowerPC core (`ppc-core`) and the surrounding
//! emulator: run-mode tracking, the synthetic opcode family guest code
//! escapes through, reentrant trampolines into nested guest execution,
//! asynchronous interrupt injection into the Mac OS nanokernel, the
//! native-op service table, the Resource Manager thunk, and the guest
//! fault classifier.

pub mod config;
pub mod emulop;
pub mod engine;
pub mod faults;
pub mod host;
pub mod interrupt;
pub mod lowmem;
pub mod mem;
pub mod natives;

mod exec;
mod resources;

use thiserror::Error;

pub use config::{MachineConfig, Prefs, RomType};
pub use emulop::{M68kRegisters, SyntheticOp, M68K_EXEC_RETURN, M68K_RTS, POWERPC_EMUL_OP};
pub use engine::{EmulStats, Engine, EngineId, Machine};
pub use faults::FaultAction;
pub use host::{HostServices, NullServices, SerialCall};
pub use mem::GuestMemory;
pub use natives::{native_op_opcode, NativeCall, NATIVE_OP_MAX, NATIVE_OP_TABLE};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A host-side guest memory access missed the mapped regions; this is
    /// a wiring or configuration error, not a guest fault.
    #[error("guest memory access failed: {0}")]
    Mem(#[from] ppc_core::MemFault),
    /// Clean shutdown requested through EMUL_RETURN; unwinds every nested
    /// trampoline so the embedder can quit.
    #[error("emulator shutdown requested")]
    Quit,
    /// A guest fault the classifier refused to skip.
    #[error("unrecoverable guest fault at {addr:#010x} (pc {pc:#010x})")]
    GuestFault { addr: u32, pc: u32 },
    #[error("illegal guest instruction {opcode:#010x} at {pc:#010x}")]
    IllegalInstruction { pc: u32, opcode: u32 },
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
    /// Programmer error (wrong-mode nested entry, bogus selector, ...).
    #[error("{0}")]
    Fatal(String),
}

pub(crate) fn debug_enabled() -> bool {
    std::env::var_os("POWERMAC_CORE_DEBUG").is_some()
}
