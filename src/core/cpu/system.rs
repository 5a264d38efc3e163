use tracing::debug;

use crate::core::cpu::excp::Sh4Exception;
use crate::core::cpu::instruction::Instruction;
use crate::core::cpu::mmreg::STBCR_STBY;
use crate::core::cpu::{ExecState, OpResult, Sh4, SR_S, SR_T};
use crate::core::memory::SysBus;

/*
  Control flow and system control. Branches never transfer control
  themselves: they arm the delay state and the engine commits the
  target after the slot retires. Conditional BT/BF (no slot) adjust PC
  directly, short of the 2 the engine adds afterwards.
*/
impl Sh4 {
    fn check_privileged(&self) -> OpResult {
        if self.in_privileged_mode() {
            Ok(())
        } else {
            Err(Sh4Exception::GenIllegalInst)
        }
    }

    // ========================= delayed branches ======================

    // BRA label
    pub(crate) fn op_bra(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.delayed_branch = true;
        self.delayed_branch_addr = self.pc.wrapping_add(((i.simm12() << 1) + 4) as u32);
        Ok(())
    }

    // BSR label
    pub(crate) fn op_bsr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.pr = self.pc.wrapping_add(4);
        self.delayed_branch = true;
        self.delayed_branch_addr = self.pc.wrapping_add(((i.simm12() << 1) + 4) as u32);
        Ok(())
    }

    // BRAF Rn
    pub(crate) fn op_braf(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.delayed_branch = true;
        self.delayed_branch_addr = self.pc.wrapping_add(self.regs[i.rn()]).wrapping_add(4);
        Ok(())
    }

    // BSRF Rn
    pub(crate) fn op_bsrf(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.pr = self.pc.wrapping_add(4);
        self.delayed_branch = true;
        self.delayed_branch_addr = self.pc.wrapping_add(self.regs[i.rn()]).wrapping_add(4);
        Ok(())
    }

    // JMP @Rn
    pub(crate) fn op_jmp(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.delayed_branch = true;
        self.delayed_branch_addr = self.regs[i.rn()];
        Ok(())
    }

    // JSR @Rn
    pub(crate) fn op_jsr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.pr = self.pc.wrapping_add(4);
        self.delayed_branch = true;
        self.delayed_branch_addr = self.regs[i.rn()];
        Ok(())
    }

    // RTS
    pub(crate) fn op_rts(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.delayed_branch = true;
        self.delayed_branch_addr = self.pr;
        Ok(())
    }

    /*
      RTE: delayed branch to SPC. SR comes back from SSR before the
      delay slot runs, so the slot executes under the restored SR.
      Software that reads SR from a RTE slot depends on this order.
    */
    pub(crate) fn op_rte(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.delayed_branch = true;
        self.delayed_branch_addr = self.spc;
        let ssr = self.ssr;
        self.set_sr(ssr);
        Ok(())
    }

    // ======================= conditional branches ====================

    // BT label (no delay slot)
    pub(crate) fn op_bt(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.t_bit() != 0 {
            // the engine adds the remaining 2
            self.pc = self.pc.wrapping_add(((i.simm8() << 1) + 2) as u32);
        }
        Ok(())
    }

    // BF label (no delay slot)
    pub(crate) fn op_bf(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.t_bit() == 0 {
            self.pc = self.pc.wrapping_add(((i.simm8() << 1) + 2) as u32);
        }
        Ok(())
    }

    // BT/S label
    pub(crate) fn op_bts(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.t_bit() != 0 {
            self.delayed_branch = true;
            self.delayed_branch_addr = self.pc.wrapping_add(((i.simm8() << 1) + 4) as u32);
        }
        Ok(())
    }

    // BF/S label
    pub(crate) fn op_bfs(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.t_bit() == 0 {
            self.delayed_branch = true;
            self.delayed_branch_addr = self.pc.wrapping_add(((i.simm8() << 1) + 4) as u32);
        }
        Ok(())
    }

    // ============================== traps ============================

    // TRAPA #imm: completion type, SPC points past the instruction
    pub(crate) fn op_trapa(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.tra = i.imm8() << 2;
        self.pc = self.pc.wrapping_add(2);
        Err(Sh4Exception::Trap(i.imm8()))
    }

    // ========================= flag utilities ========================

    // CLRS
    pub(crate) fn op_clrs(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.sr &= !SR_S;
        Ok(())
    }

    // SETS
    pub(crate) fn op_sets(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.sr |= SR_S;
        Ok(())
    }

    // CLRT
    pub(crate) fn op_clrt(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.sr &= !SR_T;
        Ok(())
    }

    // SETT
    pub(crate) fn op_sett(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.sr |= SR_T;
        Ok(())
    }

    // NOP
    pub(crate) fn op_nop(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        Ok(())
    }

    // LDTLB: no TLB is modeled, but the privilege check is real
    pub(crate) fn op_ldtlb(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.check_privileged()?;
        debug!("LDTLB executed with no TLB attached");
        Ok(())
    }

    // SLEEP: stop issuing until an interrupt; STBCR.STBY picks the
    // deeper state
    pub(crate) fn op_sleep(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        self.check_privileged()?;
        if self.exec_state == ExecState::Normal {
            self.exec_state = if self.mmreg.stbcr & STBCR_STBY != 0 {
                ExecState::Standby
            } else {
                ExecState::Sleep
            };
        }
        Ok(())
    }

    // invalid encodings; a delay slot upgrades the exception
    pub(crate) fn op_invalid(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        debug!("invalid opcode {:04X} at PC={:08X}", i.0, self.pc);
        if self.delayed_branch {
            Err(Sh4Exception::SlotIllegalInst)
        } else {
            Err(Sh4Exception::GenIllegalInst)
        }
    }

    // =========================== LDC / STC ===========================

    // LDC Rm, SR
    pub(crate) fn op_ldc_sr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let val = self.regs[i.rn()];
        self.set_sr(val);
        Ok(())
    }

    // LDC Rm, GBR (unprivileged)
    pub(crate) fn op_ldc_gbr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.gbr = self.regs[i.rn()];
        Ok(())
    }

    // LDC Rm, VBR
    pub(crate) fn op_ldc_vbr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.vbr = self.regs[i.rn()];
        Ok(())
    }

    // LDC Rm, SSR
    pub(crate) fn op_ldc_ssr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.ssr = self.regs[i.rn()];
        Ok(())
    }

    // LDC Rm, SPC
    pub(crate) fn op_ldc_spc(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.spc = self.regs[i.rn()];
        Ok(())
    }

    // LDC Rm, DBR
    pub(crate) fn op_ldc_dbr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.dbr = self.regs[i.rn()];
        Ok(())
    }

    // LDC Rm, Rn_BANK: the bank not currently visible
    pub(crate) fn op_ldc_bank(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.rbank[i.bank_reg()] = self.regs[i.rn()];
        Ok(())
    }

    // STC SR, Rn
    pub(crate) fn op_stc_sr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.regs[i.rn()] = self.sr;
        Ok(())
    }

    // STC GBR, Rn (unprivileged)
    pub(crate) fn op_stc_gbr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.regs[i.rn()] = self.gbr;
        Ok(())
    }

    // STC VBR, Rn
    pub(crate) fn op_stc_vbr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.regs[i.rn()] = self.vbr;
        Ok(())
    }

    // STC SSR, Rn
    pub(crate) fn op_stc_ssr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.regs[i.rn()] = self.ssr;
        Ok(())
    }

    // STC SPC, Rn
    pub(crate) fn op_stc_spc(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.regs[i.rn()] = self.spc;
        Ok(())
    }

    // STC SGR, Rn
    pub(crate) fn op_stc_sgr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.regs[i.rn()] = self.sgr;
        Ok(())
    }

    // STC DBR, Rn
    pub(crate) fn op_stc_dbr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.regs[i.rn()] = self.dbr;
        Ok(())
    }

    // STC Rm_BANK, Rn
    pub(crate) fn op_stc_bank(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        self.regs[i.rn()] = self.rbank[i.bank_reg()];
        Ok(())
    }

    // LDC.L @Rm+, SR
    pub(crate) fn op_ldcl_sr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.set_sr(val);
        Ok(())
    }

    // LDC.L @Rm+, GBR
    pub(crate) fn op_ldcl_gbr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.gbr = val;
        Ok(())
    }

    // LDC.L @Rm+, VBR
    pub(crate) fn op_ldcl_vbr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.vbr = val;
        Ok(())
    }

    // LDC.L @Rm+, SSR
    pub(crate) fn op_ldcl_ssr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.ssr = val;
        Ok(())
    }

    // LDC.L @Rm+, SPC
    pub(crate) fn op_ldcl_spc(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.spc = val;
        Ok(())
    }

    // LDC.L @Rm+, DBR
    pub(crate) fn op_ldcl_dbr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.dbr = val;
        Ok(())
    }

    // LDC.L @Rm+, Rn_BANK
    pub(crate) fn op_ldcl_bank(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.rbank[i.bank_reg()] = val;
        Ok(())
    }

    // STC.L SR, @-Rn
    pub(crate) fn op_stcl_sr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.sr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STC.L GBR, @-Rn
    pub(crate) fn op_stcl_gbr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.gbr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STC.L VBR, @-Rn
    pub(crate) fn op_stcl_vbr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.vbr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STC.L SSR, @-Rn
    pub(crate) fn op_stcl_ssr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.ssr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STC.L SPC, @-Rn
    pub(crate) fn op_stcl_spc(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.spc;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STC.L SGR, @-Rn
    pub(crate) fn op_stcl_sgr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.sgr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STC.L DBR, @-Rn
    pub(crate) fn op_stcl_dbr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.dbr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STC.L Rm_BANK, @-Rn
    pub(crate) fn op_stcl_bank(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.check_privileged()?;
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.rbank[i.bank_reg()];
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // =========================== LDS / STS ===========================

    // LDS Rm, MACH
    pub(crate) fn op_lds_mach(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.mach = self.regs[i.rn()];
        Ok(())
    }

    // LDS Rm, MACL
    pub(crate) fn op_lds_macl(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.macl = self.regs[i.rn()];
        Ok(())
    }

    // STS MACH, Rn
    pub(crate) fn op_sts_mach(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.regs[i.rn()] = self.mach;
        Ok(())
    }

    // STS MACL, Rn
    pub(crate) fn op_sts_macl(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.regs[i.rn()] = self.macl;
        Ok(())
    }

    // LDS Rm, PR
    pub(crate) fn op_lds_pr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.pr = self.regs[i.rn()];
        Ok(())
    }

    // STS PR, Rn
    pub(crate) fn op_sts_pr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.regs[i.rn()] = self.pr;
        Ok(())
    }

    // LDS.L @Rm+, MACH
    pub(crate) fn op_ldsl_mach(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.mach = val;
        Ok(())
    }

    // LDS.L @Rm+, MACL
    pub(crate) fn op_ldsl_macl(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.macl = val;
        Ok(())
    }

    // LDS.L @Rm+, PR
    pub(crate) fn op_ldsl_pr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.pr = val;
        Ok(())
    }

    // STS.L MACH, @-Rn
    pub(crate) fn op_stsl_mach(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.mach;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STS.L MACL, @-Rn
    pub(crate) fn op_stsl_macl(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.macl;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STS.L PR, @-Rn
    pub(crate) fn op_stsl_pr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.pr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }
}
