//! Fixed guest-memory layout.
//!
//! The Mac OS side of the glue ABI lives at fixed guest addresses: the
//! run-mode word, the saved 68k status-register byte, the interrupt
//! nesting counter, and a small aperture of host-built words guest code
//! jumps through. The kernel-data block is a ROM-managed structure whose
//! slots the nanokernel and the in-ROM 68k emulator share with us; only
//! the offsets this layer touches are named here.

/// Run-mode values stored at [`XLM_RUN_MODE`].
pub const MODE_68K: u32 = 0;
pub const MODE_NATIVE: u32 = 1;
pub const MODE_EMUL_OP: u32 = 2;

/// Classic low-memory global cleared before interrupt delivery so the
/// Mac OS stack sniffer does not trip over the alternate stack.
pub const MACOS_STACK_SNIFFER: u32 = 0x0110;

/// Pointer to the kernel-data block, mirrored into low memory at startup.
pub const XLM_KERNEL_DATA: u32 = 0x2804;
/// Current run mode (`MODE_68K` / `MODE_NATIVE` / `MODE_EMUL_OP`).
pub const XLM_RUN_MODE: u32 = 0x2810;
/// Saved MSB of the 68k status register (the emulator keeps it in GPR25).
pub const XLM_68K_R25: u32 = 0x2814;
/// Signed interrupt-disable nesting counter; interrupts inject only at 0.
pub const XLM_IRQ_NEST: u32 = 0x2818;

/// One PowerPC EXEC_RETURN opcode; every trampoline points LR here.
pub const XLM_EXEC_RETURN_OPCODE: u32 = 0x2824;
/// One 68k exec-return opcode; pushed as the fake 68k return address.
pub const XLM_68K_EXEC_RETURN: u32 = 0x2828;

/// Original Resource Manager entry points, stashed by the ROM patcher.
pub const XLM_GET_RESOURCE: u32 = 0x2830;
pub const XLM_GET_1_RESOURCE: u32 = 0x2834;
pub const XLM_GET_IND_RESOURCE: u32 = 0x2838;
pub const XLM_GET_1_IND_RESOURCE: u32 = 0x283c;
pub const XLM_R_GET_RESOURCE: u32 = 0x2840;

/// Two-halfword 68k procedure built by `execute_68k_trap`.
pub const XLM_TRAP_PROC: u32 = 0x2850;
/// Two-word PowerPC stream built by `execute_native`.
pub const XLM_NATIVE_PROC: u32 = 0x2858;
/// 68k interrupt procedure copied here at machine construction.
pub const XLM_IRQ_68K_PROC: u32 = 0x2860;
/// Pre-assembled native-op opcode words, one per selector, exposed so the
/// ROM patcher can plant them in guest trap vectors.
pub const XLM_NATIVE_OP_TABLE: u32 = 0x2880;

/// End of the mapped low-memory page group.
pub const LOWMEM_TOP: u32 = 0x3000;

/// ROM mapping.
pub const ROM_BASE: u32 = 0x4080_0000;
pub const ROM_SIZE: u32 = 0x0040_0000;
/// Address window the fault classifier treats as "executing ROM".
pub const ROM_AREA_SIZE: u32 = 0x0050_0000;
/// Boot argument area handed to the ROM entry in GPR3.
pub const ROM_BOOT_ARG: u32 = ROM_BASE + 0x30d000;

/// Kernel-data block (two pages: kernel page + emulator-data page).
pub const KERNEL_DATA_BASE: u32 = 0x68ff_e000;
pub const KERNEL_DATA_SIZE: u32 = 0x2000;

/// Kernel-data slot offsets this layer reads or writes.
pub const KD_SAVED_SP: u32 = 0x004;
pub const KD_SAVED_R6: u32 = 0x018;
/// Pointer to the nanokernel area whose word at +0xdc accumulates the
/// pending interrupt level mask while in native mode.
pub const KD_PENDING_LEVEL_AREA: u32 = 0x658;
/// Pointer to the guest-side interrupt GPR save area.
pub const KD_INTR_SAVE_AREA: u32 = 0x65c;
/// MSR image the nanokernel expects in GPR7 on interrupt entry.
pub const KD_MSR_IMAGE: u32 = 0x660;
/// Mask ORed into CR to signal the 68k emulator an interrupt level change.
pub const KD_INTR_MASK: u32 = 0x674;
/// Pointer to the 16-bit interrupt level word.
pub const KD_INTR_LEVEL_PTR: u32 = 0x67c;
/// Emulator-data page: pointer to the 68k dispatch table.
pub const ED_OPCODE_TABLE: u32 = 0x1074;
/// Emulator-data page: base address of the in-ROM 68k emulator.
pub const ED_EMULATOR_BASE: u32 = 0x1078;

/// Offset of the pending-level word inside the `KD_PENDING_LEVEL_AREA`.
pub const PENDING_LEVEL_OFFSET: u32 = 0xdc;
/// First slot of the GPR7..GPR13 interrupt save window (8-byte stride).
pub const INTR_SAVE_GPR_BASE: u32 = 0x13c;
