//! Fault classification: benign probes, ROM writes, the screen hook, and
//! real crashes.

mod common;

use common::*;
use powermac_core::lowmem::ROM_BASE;
use powermac_core::{EngineError, MachineConfig, NullServices, SyntheticOp};

#[test]
fn vm_settings_probe_is_skipped() {
    let mut m = machine();
    let mut host = NullServices;

    // MacOS 8 installer probing physical space from ROM code.
    let pc_offset = 0x48_8160;
    m.mem.patch_rom(pc_offset, &stw(3, 20, 0).to_be_bytes());
    m.mem.patch_rom(
        pc_offset + 4,
        &SyntheticOp::ExecReturn.encode().to_be_bytes(),
    );
    m.cpu_mut().regs.gpr[20] = 0xf800_0000;

    m.run(&mut host, ROM_BASE + pc_offset).unwrap();
    assert_eq!(m.cpu().regs.pc, ROM_BASE + pc_offset + 4, "probe skipped");
}

#[test]
fn probe_with_wrong_register_contents_is_fatal() {
    let mut m = machine();
    let mut host = NullServices;
    let pc_offset = 0x48_8160;
    m.mem.patch_rom(pc_offset, &stw(3, 20, 0).to_be_bytes());
    m.cpu_mut().regs.gpr[20] = 0x1234_5678; // not a known probe pattern

    match m.run(&mut host, ROM_BASE + pc_offset) {
        Err(EngineError::GuestFault { addr, pc }) => {
            assert_eq!(addr, 0x1234_5678);
            assert_eq!(pc, ROM_BASE + pc_offset);
        }
        other => panic!("expected guest fault, got {other:?}"),
    }
}

#[test]
fn rom_writes_are_silently_dropped() {
    let mut m = machine();
    let mut host = NullServices;
    let before = m.mem.read_u32(ROM_BASE + 0x100).unwrap();

    emit(
        &mut m,
        SCRATCH,
        &[stw(3, 4, 0x100), SyntheticOp::ExecReturn.encode()],
    );
    {
        let regs = &mut m.cpu_mut().regs;
        regs.gpr[3] = 0x5555_5555;
        regs.gpr[4] = ROM_BASE;
    }
    m.run(&mut host, SCRATCH).unwrap();

    assert_eq!(m.mem.read_u32(ROM_BASE + 0x100).unwrap(), before);
}

#[test]
fn ignoresegv_pref_skips_unknown_mac_faults() {
    let mut m = machine_with(MachineConfig {
        prefs: powermac_core::Prefs {
            ignoresegv: true,
            ..Default::default()
        },
        ..config()
    });
    let mut host = NullServices;

    emit(
        &mut m,
        SCRATCH,
        &[lwz(3, 4, 0), SyntheticOp::ExecReturn.encode()],
    );
    m.cpu_mut().regs.gpr[4] = 0x7000_0000;
    m.run(&mut host, SCRATCH).unwrap();
}

#[test]
fn unknown_fault_is_fatal_without_the_pref() {
    let mut m = machine();
    let mut host = NullServices;
    emit(&mut m, SCRATCH, &[lwz(3, 4, 0)]);
    m.cpu_mut().regs.gpr[4] = 0x7000_0000;

    match m.run(&mut host, SCRATCH) {
        Err(EngineError::GuestFault { addr, .. }) => assert_eq!(addr, 0x7000_0000),
        other => panic!("expected guest fault, got {other:?}"),
    }
}

#[test]
fn screen_handler_gets_first_claim_and_retries() {
    let mut m = machine();
    let mut host = Recording {
        patch_on_screen_fault: true,
        ..Recording::default()
    };
    emit(&mut m, SCRATCH, &[stw(3, 4, 0)]);
    m.cpu_mut().regs.gpr[4] = 0x7000_0000;

    m.run(&mut host, SCRATCH).unwrap();
    assert_eq!(host.screen_faults, 1, "claimed on first classification");
}
