//! Resource Manager thunk.
//!
//! The ROM patcher replaces the first instruction of the five Resource
//! Manager entry points with native-op words and stashes the original
//! entries in low memory. Each thunk runs the original routine, then gives
//! the host a chance to inspect (and patch) the returned handle before the
//! guest sees it.

use crate::engine::Machine;
use crate::host::HostServices;
use crate::lowmem::{
    XLM_GET_1_IND_RESOURCE, XLM_GET_1_RESOURCE, XLM_GET_IND_RESOURCE, XLM_GET_RESOURCE,
    XLM_R_GET_RESOURCE,
};
use crate::natives::NativeCall;
use crate::{EngineError, Result};

impl Machine {
    pub(crate) fn get_resource_thunk(
        &mut self,
        host: &mut dyn HostServices,
        call: NativeCall,
    ) -> Result<()> {
        let slot = match call {
            NativeCall::GetResource => XLM_GET_RESOURCE,
            NativeCall::Get1Resource => XLM_GET_1_RESOURCE,
            NativeCall::GetIndResource => XLM_GET_IND_RESOURCE,
            NativeCall::Get1IndResource => XLM_GET_1_IND_RESOURCE,
            NativeCall::RGetResource => XLM_R_GET_RESOURCE,
            other => {
                return Err(EngineError::Fatal(format!(
                    "{other:?} is not a resource thunk"
                )))
            }
        };
        let original = self.mem.read_u32(slot)?;
        self.get_resource_common(host, original)
    }

    /// Shared tail: call the original routine, then `check_load`.
    fn get_resource_common(&mut self, host: &mut dyn HostServices, original: u32) -> Result<()> {
        let (rtype, id) = {
            let gpr = &self.cpu().regs.gpr;
            (gpr[3], gpr[4] as u16 as i16)
        };
        {
            let regs = &mut self.cpu_mut().regs;
            regs.gpr[1] = regs.gpr[1].wrapping_sub(56);
        }
        self.execute_ppc(host, original)?;
        let handle = self.cpu().regs.gpr[3];
        host.check_load(self, rtype, id, handle)?;
        let regs = &mut self.cpu_mut().regs;
        regs.gpr[3] = handle;
        regs.gpr[1] = regs.gpr[1].wrapping_add(56);
        Ok(())
    }
}
