//! Interpretive 32-bit PowerPC core.
//!
//! The core is deliberately generic: it knows the base ISA, a 64-entry
//! primary-opcode decode table that embedders may overlay with their own
//! entries, and a run loop that returns to the caller whenever something
//! outside the ISA has to happen (a registered extension opcode, a special
//! flag raised from the host, or a guest memory fault). Everything
//! machine-specific lives in the embedding crate.

pub mod bus;
pub mod cache;
pub mod decode;
pub mod eval;
pub mod ops;
pub mod state;

pub use bus::{Bus, MemFault};
pub use cache::DecodeCache;
pub use decode::{cflow, DecodeTable, Decoded, Instr, PrimaryOp, TableEntry};
pub use eval::{Cpu, Exit};
pub use state::{Registers, Spcflags, SPCFLAG_EXEC_RETURN, SPCFLAG_TRIGGER_INTERRUPT};
