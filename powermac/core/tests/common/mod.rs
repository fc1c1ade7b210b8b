//! Shared test world: a small guest RAM, a fake kernel-data block and a
//! miniature in-guest "68k emulator" whose dispatch-table entries are
//! PowerPC stubs, so the nested-entry trampolines run their real dispatch
//! arithmetic end to end.

#![allow(dead_code)]

use powermac_core::lowmem::{
    ED_EMULATOR_BASE, ED_OPCODE_TABLE, KD_INTR_LEVEL_PTR, KD_INTR_MASK, KD_INTR_SAVE_AREA,
    KD_MSR_IMAGE, KD_PENDING_LEVEL_AREA, XLM_RUN_MODE,
};
use powermac_core::{
    HostServices, M68kRegisters, Machine, MachineConfig, Result, SerialCall, SyntheticOp,
    M68K_EXEC_RETURN, M68K_RTS,
};

pub const RAM_BASE: u32 = 0x2000_0000;
pub const RAM_SIZE: u32 = 0x0010_0000;

/// Fake 68k dispatch table: 8 bytes of PPC code per 16-bit opcode.
pub const TABLE_BASE: u32 = RAM_BASE + 0x1000;
/// PPC stub implementing RTS in the 68k emulator's register convention.
pub const RTS_STUB: u32 = RAM_BASE + 0x9_0000;
/// Free space for per-test code and data.
pub const SCRATCH: u32 = RAM_BASE + 0x9_4000;
/// Guest stack used by the nested-entry tests.
pub const STACK_TOP: u32 = RAM_BASE + 0xe_0000;
/// Fake kernel-data targets.
pub const SAVE_AREA: u32 = RAM_BASE + 0xe_8000;
pub const LEVEL_WORD: u32 = RAM_BASE + 0xe_9000;
pub const PENDING_AREA: u32 = RAM_BASE + 0xe_a000;
pub const ALT_STACK: u32 = RAM_BASE + 0xf_0000;

pub const INTR_MASK: u32 = 0x0080_0000;
pub const MSR_IMAGE: u32 = 0x0000_d030;

pub fn config() -> MachineConfig {
    MachineConfig {
        ram_base: RAM_BASE,
        ram_size: RAM_SIZE,
        alt_stack_base: ALT_STACK,
        ..MachineConfig::default()
    }
}

pub fn machine() -> Machine {
    machine_with(config())
}

pub fn machine_with(config: MachineConfig) -> Machine {
    let mut m = Machine::new(config).expect("machine setup");

    // Fake kernel-data block.
    m.mem.kernel_write(ED_OPCODE_TABLE, TABLE_BASE).unwrap();
    m.mem.kernel_write(ED_EMULATOR_BASE, RTS_STUB).unwrap();
    m.mem.kernel_write(KD_INTR_LEVEL_PTR, LEVEL_WORD).unwrap();
    m.mem.kernel_write(KD_INTR_MASK, INTR_MASK).unwrap();
    m.mem.kernel_write(KD_INTR_SAVE_AREA, SAVE_AREA).unwrap();
    m.mem.kernel_write(KD_MSR_IMAGE, MSR_IMAGE).unwrap();
    m.mem
        .kernel_write(KD_PENDING_LEVEL_AREA, PENDING_AREA)
        .unwrap();

    m.cpu_mut().regs.gpr[1] = STACK_TOP;

    // RTS: pop the 68k return address and re-dispatch at it.
    emit(&mut m, RTS_STUB, &rts_stub_code());
    seed_entry_branch(&mut m, M68K_RTS as u32, RTS_STUB);
    // The 68k exec-return extension opcode lands on the PPC EXEC_RETURN.
    seed_entry_words(
        &mut m,
        M68K_EXEC_RETURN as u32,
        &[SyntheticOp::ExecReturn.encode()],
    );
    m
}

/// Dispatch-table slot for a 68k opcode.
pub fn entry_addr(opcode: u32) -> u32 {
    TABLE_BASE + opcode * 8
}

pub fn seed_entry_words(m: &mut Machine, opcode: u32, words: &[u32]) {
    emit(m, entry_addr(opcode), words);
}

pub fn seed_entry_branch(m: &mut Machine, opcode: u32, target: u32) {
    let entry = entry_addr(opcode);
    emit(m, entry, &[b_rel(entry, target)]);
}

pub fn emit(m: &mut Machine, addr: u32, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        m.mem.write_u32(addr + 4 * i as u32, *word).unwrap();
    }
    m.flush_code_cache(addr, addr + 4 * words.len() as u32);
}

fn rts_stub_code() -> Vec<u32> {
    vec![
        lwz(26, 1, 0),               // pop the 68k return address
        addi(1, 1, 4),
        lhz(23, 26, 0),              // next 68k opcode
        addi(24, 26, 2),             // advance the 68k PC
        lha(27, 24, 0),              // preload the extension word
        rlwinm(29, 23, 3, 0, 28),    // opcode * 8
        addis(26, 0, (TABLE_BASE >> 16) as u16),
        ori(26, 26, TABLE_BASE as u16),
        add(29, 29, 26),
        mtctr(29),
        bctr(),
    ]
}

// --- tiny assembler -------------------------------------------------------

pub fn addi(rd: u32, ra: u32, imm: i16) -> u32 {
    (14 << 26) | (rd << 21) | (ra << 16) | (imm as u16 as u32)
}

pub fn addis(rd: u32, ra: u32, imm: u16) -> u32 {
    (15 << 26) | (rd << 21) | (ra << 16) | imm as u32
}

pub fn ori(ra: u32, rs: u32, imm: u16) -> u32 {
    (24 << 26) | (rs << 21) | (ra << 16) | imm as u32
}

pub fn nop() -> u32 {
    ori(0, 0, 0)
}

pub fn lwz(rd: u32, ra: u32, d: i16) -> u32 {
    (32 << 26) | (rd << 21) | (ra << 16) | (d as u16 as u32)
}

pub fn lhz(rd: u32, ra: u32, d: i16) -> u32 {
    (40 << 26) | (rd << 21) | (ra << 16) | (d as u16 as u32)
}

pub fn lha(rd: u32, ra: u32, d: i16) -> u32 {
    (42 << 26) | (rd << 21) | (ra << 16) | (d as u16 as u32)
}

pub fn stw(rs: u32, ra: u32, d: i16) -> u32 {
    (36 << 26) | (rs << 21) | (ra << 16) | (d as u16 as u32)
}

pub fn rlwinm(ra: u32, rs: u32, sh: u32, mb: u32, me: u32) -> u32 {
    (21 << 26) | (rs << 21) | (ra << 16) | (sh << 11) | (mb << 6) | (me << 1)
}

pub fn add(rd: u32, ra: u32, rb: u32) -> u32 {
    (31 << 26) | (rd << 21) | (ra << 16) | (rb << 11) | (266 << 1)
}

pub fn mtctr(rs: u32) -> u32 {
    (31 << 26) | (rs << 21) | (9 << 16) | (467 << 1)
}

pub fn bctr() -> u32 {
    (19 << 26) | (20 << 21) | (528 << 1)
}

pub fn blr() -> u32 {
    (19 << 26) | (20 << 21) | (16 << 1)
}

pub fn b_rel(from: u32, to: u32) -> u32 {
    (18 << 26) | (to.wrapping_sub(from) & 0x03ff_fffc)
}

// --- recording host -------------------------------------------------------

/// Host services that record every call; individual tests opt into extra
/// behavior through the public knobs.
#[derive(Default)]
pub struct Recording {
    pub vbl_calls: u32,
    pub emul_ops: Vec<(u32, u32)>,
    pub modes_inside: Vec<u32>,
    pub check_loads: Vec<(u32, i16, u32)>,
    pub serial_calls: Vec<(SerialCall, u32, u32)>,
    pub driver_io_args: Vec<[u32; 5]>,
    pub driver_io_status: i16,
    pub serial_status: i16,
    pub screen_faults: u32,
    /// On a screen fault, rewrite the faulting instruction to EXEC_RETURN
    /// and claim the fault.
    pub patch_on_screen_fault: bool,
    /// Run this 68k routine from inside every EMUL_OP handler.
    pub nested_68k: Option<u32>,
    pub nested_results: Vec<M68kRegisters>,
}

impl HostServices for Recording {
    fn emul_op(
        &mut self,
        machine: &mut Machine,
        regs: &mut M68kRegisters,
        pc: u32,
        index: u32,
    ) -> Result<()> {
        self.emul_ops.push((pc, index));
        self.modes_inside.push(machine.mem.read_u32(XLM_RUN_MODE)?);
        if let Some(entry) = self.nested_68k {
            let mut inner = M68kRegisters::default();
            machine.execute_68k(self, entry, &mut inner)?;
            self.nested_results.push(inner);
        }
        regs.d[0] = regs.d[0].wrapping_add(1);
        Ok(())
    }

    fn video_vbl(&mut self, _machine: &mut Machine) -> Result<()> {
        self.vbl_calls += 1;
        Ok(())
    }

    fn video_driver_io(&mut self, _machine: &mut Machine, args: [u32; 5]) -> Result<i16> {
        self.driver_io_args.push(args);
        Ok(self.driver_io_status)
    }

    fn serial_io(
        &mut self,
        _machine: &mut Machine,
        call: SerialCall,
        pb: u32,
        dce: u32,
    ) -> Result<i16> {
        self.serial_calls.push((call, pb, dce));
        Ok(self.serial_status)
    }

    fn check_load(
        &mut self,
        _machine: &mut Machine,
        rtype: u32,
        id: i16,
        handle: u32,
    ) -> Result<()> {
        self.check_loads.push((rtype, id, handle));
        Ok(())
    }

    fn screen_fault(&mut self, machine: &mut Machine, _addr: u32, pc: u32) -> bool {
        self.screen_faults += 1;
        if self.patch_on_screen_fault {
            machine
                .mem
                .write_u32(pc, SyntheticOp::ExecReturn.encode())
                .unwrap();
            machine.flush_code_cache(pc, pc + 4);
            true
        } else {
            false
        }
    }
}
