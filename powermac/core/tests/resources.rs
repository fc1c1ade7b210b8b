//! Resource Manager thunk: original routine plus the check-load hook.

mod common;

use common::*;
use powermac_core::lowmem::{XLM_GET_1_RESOURCE, XLM_GET_RESOURCE};
use powermac_core::NativeCall;

#[test]
fn get_resource_thunk_calls_check_load_with_the_handle() {
    let mut m = machine();
    let mut host = Recording::default();

    // Stash a harmless identity routine as the original GetResource.
    emit(&mut m, SCRATCH, &[blr()]);
    m.mem.write_u32(XLM_GET_RESOURCE, SCRATCH).unwrap();

    {
        let regs = &mut m.cpu_mut().regs;
        regs.gpr[3] = 0x5445_5354; // 'TEST'
        regs.gpr[4] = 42;
    }
    m.execute_native(&mut host, NativeCall::GetResource).unwrap();

    assert_eq!(host.check_loads, vec![(0x5445_5354, 42, 0x5445_5354)]);
    let regs = &m.cpu().regs;
    assert_eq!(regs.gpr[3], 0x5445_5354, "handle handed back in GPR3");
    assert_eq!(regs.gpr[1], STACK_TOP, "thunk frame closed");
}

#[test]
fn resource_id_is_truncated_to_signed_16_bit() {
    let mut m = machine();
    let mut host = Recording::default();
    emit(&mut m, SCRATCH, &[blr()]);
    m.mem.write_u32(XLM_GET_1_RESOURCE, SCRATCH).unwrap();

    {
        let regs = &mut m.cpu_mut().regs;
        regs.gpr[3] = 0x434f_4445; // 'CODE'
        regs.gpr[4] = 0x0001_ffff; // truncates to -1
    }
    m.execute_native(&mut host, NativeCall::Get1Resource).unwrap();

    assert_eq!(host.check_loads, vec![(0x434f_4445, -1, 0x434f_4445)]);
}

#[test]
fn check_load_may_rewrite_the_handle_target() {
    // The hook gets the machine back, so it can patch guest memory the
    // way the real CheckLoad does for purgeable CODE resources.
    struct Patching {
        seen: Option<(u32, i16, u32)>,
    }
    impl powermac_core::HostServices for Patching {
        fn check_load(
            &mut self,
            machine: &mut powermac_core::Machine,
            rtype: u32,
            id: i16,
            handle: u32,
        ) -> powermac_core::Result<()> {
            self.seen = Some((rtype, id, handle));
            machine.mem.write_u32(SCRATCH + 0x800, 0x600d_c0de)?;
            Ok(())
        }
    }

    let mut m = machine();
    let mut host = Patching { seen: None };
    emit(&mut m, SCRATCH, &[blr()]);
    m.mem.write_u32(XLM_GET_RESOURCE, SCRATCH).unwrap();
    m.cpu_mut().regs.gpr[3] = 1;

    m.execute_native(&mut host, NativeCall::GetResource).unwrap();

    assert_eq!(host.seen, Some((1, 0, 1)));
    assert_eq!(m.mem.read_u32(SCRATCH + 0x800).unwrap(), 0x600d_c0de);
}
