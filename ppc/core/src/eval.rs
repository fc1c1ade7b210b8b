//! Fetch/decode/execute loop.
//!
//! `Cpu::run` executes instructions until something the embedder must
//! handle occurs: a registered extension opcode, the exec-return or
//! pending-interrupt special flag, an illegal opcode, or a guest memory
//! fault. The exec-return flag is honoured before the first instruction of
//! a run; the interrupt flag only after an instruction has retired, so a
//! caller that defers delivery always makes forward progress.

use crate::bus::{Bus, MemFault};
use crate::cache::DecodeCache;
use crate::decode::{self, cflow, DecodeTable, Decoded, Instr, MemWidth, TableEntry, PrimaryOp};
use crate::ops;
use crate::state::{Registers, Spcflags, SPCFLAG_EXEC_RETURN, SPCFLAG_TRIGGER_INTERRUPT};

const EXEC_LOG_LEN: usize = 128;

/// Ring of recently executed (pc, opcode) pairs for crash dumps.
#[derive(Debug)]
pub struct ExecLog {
    entries: [(u32, u32); EXEC_LOG_LEN],
    next: usize,
    len: usize,
}

impl Default for ExecLog {
    fn default() -> Self {
        Self {
            entries: [(0, 0); EXEC_LOG_LEN],
            next: 0,
            len: 0,
        }
    }
}

impl ExecLog {
    fn push(&mut self, pc: u32, opcode: u32) {
        self.entries[self.next] = (pc, opcode);
        self.next = (self.next + 1) % EXEC_LOG_LEN;
        self.len = (self.len + 1).min(EXEC_LOG_LEN);
    }

    /// Print the log, oldest entry first.
    pub fn dump(&self) {
        let start = (self.next + EXEC_LOG_LEN - self.len) % EXEC_LOG_LEN;
        for i in 0..self.len {
            let (pc, opcode) = self.entries[(start + i) % EXEC_LOG_LEN];
            eprintln!("  {pc:08x}: {opcode:08x}");
        }
    }
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The exec-return special flag was raised.
    Return,
    /// The pending-interrupt special flag is raised and an instruction has
    /// retired since entry. The flag is left set for the caller.
    Interrupt,
    /// A registered extension opcode was fetched; PC still points at it.
    Extension(u32),
    /// An instruction decoded to nothing.
    Illegal { pc: u32, opcode: u32 },
    /// A guest memory access failed; PC still points at the instruction.
    Fault(MemFault),
}

enum Step {
    Continue,
    Extension(u32),
    Illegal(u32),
}

/// One PowerPC core: register file, decode table, translation cache.
#[derive(Debug)]
pub struct Cpu {
    pub regs: Registers,
    spcflags: Spcflags,
    table: DecodeTable,
    cache: DecodeCache,
    log: ExecLog,
}

impl Cpu {
    pub fn new(translation: bool) -> Self {
        Self {
            regs: Registers::new(),
            spcflags: Spcflags::new(),
            table: DecodeTable::base(),
            cache: DecodeCache::new(translation),
            log: ExecLog::default(),
        }
    }

    pub fn spcflags(&self) -> &Spcflags {
        &self.spcflags
    }

    /// Overlay a primary opcode with an extension entry. Words with this
    /// primary are handed back from `run` as [`Exit::Extension`].
    pub fn register_extension(&mut self, primary: u8, name: &'static str) {
        self.table.register(
            primary,
            TableEntry {
                name,
                op: PrimaryOp::Extension,
                cflow: cflow::JUMP | cflow::TRAP,
            },
        );
    }

    /// Drop cached translations for `[start, end)`.
    pub fn invalidate_cache_range(&mut self, start: u32, end: u32) {
        self.cache.invalidate_range(start, end);
    }

    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }

    pub fn exec_log(&self) -> &ExecLog {
        &self.log
    }

    /// Run until an embedder-visible event occurs.
    pub fn run(&mut self, bus: &mut dyn Bus) -> Exit {
        if self.spcflags.test_and_clear(SPCFLAG_EXEC_RETURN) {
            return Exit::Return;
        }
        loop {
            let pc = self.regs.pc;
            match self.step(bus) {
                Err(fault) => return Exit::Fault(fault),
                Ok(Step::Extension(opcode)) => return Exit::Extension(opcode),
                Ok(Step::Illegal(opcode)) => return Exit::Illegal { pc, opcode },
                Ok(Step::Continue) => {}
            }
            if self.spcflags.test_and_clear(SPCFLAG_EXEC_RETURN) {
                return Exit::Return;
            }
            if self.spcflags.test(SPCFLAG_TRIGGER_INTERRUPT) {
                return Exit::Interrupt;
            }
        }
    }

    fn step(&mut self, bus: &mut dyn Bus) -> Result<Step, MemFault> {
        let pc = self.regs.pc;
        let word = bus.load32(pc)?;
        self.log.push(pc, word);
        let decoded = match self.cache.get(pc) {
            Some(d) => d,
            None => {
                let d = decode::decode(&self.table, word);
                self.cache.insert(pc, d);
                d
            }
        };
        match decoded {
            Decoded::Extension => Ok(Step::Extension(word)),
            Decoded::Illegal => Ok(Step::Illegal(word)),
            Decoded::Instr(instr) => {
                self.exec(instr, bus)?;
                Ok(Step::Continue)
            }
        }
    }

    fn ea(&self, ra: u8, d: i32, update: bool) -> u32 {
        let base = if ra == 0 && !update {
            0
        } else {
            self.regs.gpr[ra as usize]
        };
        base.wrapping_add(d as u32)
    }

    fn branch_cond(&mut self, bo: u8, bi: u8) -> bool {
        if bo & 0x04 == 0 {
            self.regs.ctr = self.regs.ctr.wrapping_sub(1);
        }
        let ctr_ok = bo & 0x04 != 0 || ((self.regs.ctr != 0) != (bo & 0x02 != 0));
        let cond_ok = bo & 0x10 != 0 || (self.regs.cr_bit(bi as u32) == (bo & 0x08 != 0));
        ctr_ok && cond_ok
    }

    fn compare_signed(&mut self, crf: u8, a: i32, b: i32) {
        let mut bits = match a.cmp(&b) {
            std::cmp::Ordering::Less => 0b1000,
            std::cmp::Ordering::Greater => 0b0100,
            std::cmp::Ordering::Equal => 0b0010,
        };
        if self.regs.xer & crate::state::XER_SO != 0 {
            bits |= 1;
        }
        self.regs.set_cr_field(crf as u32, bits);
    }

    fn compare_unsigned(&mut self, crf: u8, a: u32, b: u32) {
        let mut bits = match a.cmp(&b) {
            std::cmp::Ordering::Less => 0b1000,
            std::cmp::Ordering::Greater => 0b0100,
            std::cmp::Ordering::Equal => 0b0010,
        };
        if self.regs.xer & crate::state::XER_SO != 0 {
            bits |= 1;
        }
        self.regs.set_cr_field(crf as u32, bits);
    }

    fn set_result(&mut self, reg: u8, value: u32, record: bool) {
        self.regs.gpr[reg as usize] = value;
        if record {
            self.regs.record_cr0(value);
        }
    }

    fn exec(&mut self, instr: Instr, bus: &mut dyn Bus) -> Result<(), MemFault> {
        use Instr::*;
        let regs = &self.regs;
        let pc = regs.pc;
        let mut next_pc = pc.wrapping_add(4);
        match instr {
            Nop => {}
            Addi { rd, ra, simm } => {
                let base = if ra == 0 { 0 } else { regs.gpr[ra as usize] };
                self.regs.gpr[rd as usize] = base.wrapping_add(simm as u32);
            }
            Addis { rd, ra, simm } => {
                let base = if ra == 0 { 0 } else { regs.gpr[ra as usize] };
                self.regs.gpr[rd as usize] = base.wrapping_add((simm as u32) << 16);
            }
            Ori { ra, rs, uimm } => {
                let value = regs.gpr[rs as usize] | uimm;
                self.regs.gpr[ra as usize] = value;
            }
            Oris { ra, rs, uimm } => {
                let value = regs.gpr[rs as usize] | (uimm << 16);
                self.regs.gpr[ra as usize] = value;
            }
            Xori { ra, rs, uimm } => {
                let value = regs.gpr[rs as usize] ^ uimm;
                self.regs.gpr[ra as usize] = value;
            }
            Xoris { ra, rs, uimm } => {
                let value = regs.gpr[rs as usize] ^ (uimm << 16);
                self.regs.gpr[ra as usize] = value;
            }
            AndiRc { ra, rs, uimm } => {
                let value = regs.gpr[rs as usize] & uimm;
                self.set_result(ra, value, true);
            }
            AndisRc { ra, rs, uimm } => {
                let value = regs.gpr[rs as usize] & (uimm << 16);
                self.set_result(ra, value, true);
            }
            Rlwinm { ra, rs, sh, mb, me, rc } => {
                let value = ops::rlwinm(regs.gpr[rs as usize], sh as u32, mb as u32, me as u32);
                self.set_result(ra, value, rc);
            }
            Rlwimi { ra, rs, sh, mb, me, rc } => {
                let value = ops::rlwimi(
                    regs.gpr[ra as usize],
                    regs.gpr[rs as usize],
                    sh as u32,
                    mb as u32,
                    me as u32,
                );
                self.set_result(ra, value, rc);
            }
            Cmpi { crf, ra, simm } => {
                self.compare_signed(crf, regs.gpr[ra as usize] as i32, simm);
            }
            Cmpli { crf, ra, uimm } => {
                self.compare_unsigned(crf, regs.gpr[ra as usize], uimm);
            }
            Cmp { crf, ra, rb } => {
                self.compare_signed(crf, regs.gpr[ra as usize] as i32, regs.gpr[rb as usize] as i32);
            }
            Cmpl { crf, ra, rb } => {
                self.compare_unsigned(crf, regs.gpr[ra as usize], regs.gpr[rb as usize]);
            }
            Add { rd, ra, rb, rc } => {
                let value = regs.gpr[ra as usize].wrapping_add(regs.gpr[rb as usize]);
                self.set_result(rd, value, rc);
            }
            Subf { rd, ra, rb, rc } => {
                let value = regs.gpr[rb as usize].wrapping_sub(regs.gpr[ra as usize]);
                self.set_result(rd, value, rc);
            }
            Neg { rd, ra, rc } => {
                let value = (regs.gpr[ra as usize] as i32).wrapping_neg() as u32;
                self.set_result(rd, value, rc);
            }
            And { ra, rs, rb, rc } => {
                let value = regs.gpr[rs as usize] & regs.gpr[rb as usize];
                self.set_result(ra, value, rc);
            }
            Or { ra, rs, rb, rc } => {
                let value = regs.gpr[rs as usize] | regs.gpr[rb as usize];
                self.set_result(ra, value, rc);
            }
            Xor { ra, rs, rb, rc } => {
                let value = regs.gpr[rs as usize] ^ regs.gpr[rb as usize];
                self.set_result(ra, value, rc);
            }
            Slw { ra, rs, rb, rc } => {
                let amount = regs.gpr[rb as usize] & 0x3f;
                let value = if amount > 31 {
                    0
                } else {
                    regs.gpr[rs as usize] << amount
                };
                self.set_result(ra, value, rc);
            }
            Srw { ra, rs, rb, rc } => {
                let amount = regs.gpr[rb as usize] & 0x3f;
                let value = if amount > 31 {
                    0
                } else {
                    regs.gpr[rs as usize] >> amount
                };
                self.set_result(ra, value, rc);
            }
            Srawi { ra, rs, sh, rc } => {
                let value = ((regs.gpr[rs as usize] as i32) >> sh) as u32;
                self.set_result(ra, value, rc);
            }
            Extsb { ra, rs, rc } => {
                let value = ops::sext8(regs.gpr[rs as usize] as u8);
                self.set_result(ra, value, rc);
            }
            Extsh { ra, rs, rc } => {
                let value = ops::sext16(regs.gpr[rs as usize] as u16);
                self.set_result(ra, value, rc);
            }
            Mfcr { rd } => {
                let value = regs.cr;
                self.regs.gpr[rd as usize] = value;
            }
            Mtcrf { crm, rs } => {
                let value = regs.gpr[rs as usize];
                for field in 0..8 {
                    if crm & (0x80 >> field) != 0 {
                        let bits = (value >> (28 - 4 * field)) & 0xf;
                        self.regs.set_cr_field(field, bits);
                    }
                }
            }
            Mfspr { rd, spr } => {
                let value = match spr {
                    1 => regs.xer,
                    8 => regs.lr,
                    9 => regs.ctr,
                    _ => 0,
                };
                self.regs.gpr[rd as usize] = value;
            }
            Mtspr { spr, rs } => {
                let value = regs.gpr[rs as usize];
                match spr {
                    1 => self.regs.xer = value,
                    8 => self.regs.lr = value,
                    9 => self.regs.ctr = value,
                    _ => {}
                }
            }
            B { li, aa, lk } => {
                if lk {
                    self.regs.lr = pc.wrapping_add(4);
                }
                next_pc = if aa { li as u32 } else { pc.wrapping_add(li as u32) };
            }
            Bc { bo, bi, bd, aa, lk } => {
                if lk {
                    self.regs.lr = pc.wrapping_add(4);
                }
                if self.branch_cond(bo, bi) {
                    next_pc = if aa { bd as u32 } else { pc.wrapping_add(bd as u32) };
                }
            }
            Bclr { bo, bi, lk } => {
                let target = self.regs.lr & !3;
                if lk {
                    self.regs.lr = pc.wrapping_add(4);
                }
                if self.branch_cond(bo, bi) {
                    next_pc = target;
                }
            }
            Bcctr { bo, bi, lk } => {
                let target = self.regs.ctr & !3;
                if lk {
                    self.regs.lr = pc.wrapping_add(4);
                }
                if self.branch_cond(bo, bi) {
                    next_pc = target;
                }
            }
            Load { width, rd, ra, d, update, signed } => {
                let addr = self.ea(ra, d, update);
                let value = match width {
                    MemWidth::Byte => {
                        let v = bus.load8(addr)?;
                        if signed { ops::sext8(v) } else { v as u32 }
                    }
                    MemWidth::Half => {
                        let v = bus.load16(addr)?;
                        if signed { ops::sext16(v) } else { v as u32 }
                    }
                    MemWidth::Word => bus.load32(addr)?,
                };
                self.regs.gpr[rd as usize] = value;
                if update {
                    self.regs.gpr[ra as usize] = addr;
                }
            }
            LoadX { width, rd, ra, rb } => {
                let base = if ra == 0 { 0 } else { regs.gpr[ra as usize] };
                let addr = base.wrapping_add(regs.gpr[rb as usize]);
                self.regs.gpr[rd as usize] = match width {
                    MemWidth::Byte => bus.load8(addr)? as u32,
                    MemWidth::Half => bus.load16(addr)? as u32,
                    MemWidth::Word => bus.load32(addr)?,
                };
            }
            Store { width, rs, ra, d, update } => {
                let addr = self.ea(ra, d, update);
                let value = regs.gpr[rs as usize];
                match width {
                    MemWidth::Byte => bus.store8(addr, value as u8)?,
                    MemWidth::Half => bus.store16(addr, value as u16)?,
                    MemWidth::Word => bus.store32(addr, value)?,
                }
                if update {
                    self.regs.gpr[ra as usize] = addr;
                }
            }
            StoreX { width, rs, ra, rb } => {
                let base = if ra == 0 { 0 } else { regs.gpr[ra as usize] };
                let addr = base.wrapping_add(regs.gpr[rb as usize]);
                let value = regs.gpr[rs as usize];
                match width {
                    MemWidth::Byte => bus.store8(addr, value as u8)?,
                    MemWidth::Half => bus.store16(addr, value as u16)?,
                    MemWidth::Word => bus.store32(addr, value)?,
                }
            }
        }
        self.regs.pc = next_pc;
        Ok(())
    }
}
