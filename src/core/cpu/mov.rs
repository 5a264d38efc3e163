use crate::core::cpu::excp::Sh4Exception;
use crate::core::cpu::instruction::Instruction;
use crate::core::cpu::ocache::{SQ_AREA_BEGIN, SQ_AREA_END};
use crate::core::cpu::{OpResult, Sh4};
use crate::core::memory::SysBus;

#[inline(always)]
fn sign_extend<const SIZE: usize>(val: u32) -> u32 {
    match SIZE {
        8 => val as u8 as i8 as i32 as u32,
        16 => val as u16 as i16 as i32 as u32,
        _ => val,
    }
}

/*
  MOV in all its addressing modes, plus the cache maintenance ops.
  Loads sign-extend to 32 bits. Register updates of the pre-decrement
  and post-increment forms happen after a successful access, so a
  faulting instruction leaves its address register untouched.
*/
impl Sh4 {
    #[inline(always)]
    fn read_mem_sz<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        addr: u32,
    ) -> Result<u32, Sh4Exception> {
        const { assert!(SIZE == 8 || SIZE == 16 || SIZE == 32) }
        match SIZE {
            8 => self.read_mem_8(bus, addr),
            16 => self.read_mem_16(bus, addr),
            _ => self.read_mem_32(bus, addr),
        }
    }

    #[inline(always)]
    fn write_mem_sz<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        addr: u32,
        value: u32,
    ) -> Result<(), Sh4Exception> {
        const { assert!(SIZE == 8 || SIZE == 16 || SIZE == 32) }
        match SIZE {
            8 => self.write_mem_8(bus, addr, value),
            16 => self.write_mem_16(bus, addr, value),
            _ => self.write_mem_32(bus, addr, value),
        }
    }

    // MOV.B/W/L Rm, @Rn
    pub(crate) fn op_mov_store<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let val = self.regs[i.rm()];
        self.write_mem_sz::<SIZE>(bus, self.regs[i.rn()], val)
    }

    // MOV.B/W/L @Rm, Rn
    pub(crate) fn op_mov_load<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let val = self.read_mem_sz::<SIZE>(bus, self.regs[i.rm()])?;
        self.regs[i.rn()] = sign_extend::<SIZE>(val);
        Ok(())
    }

    // MOV.B/W/L Rm, @-Rn
    pub(crate) fn op_mov_store_dec<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let val = self.regs[i.rm()];
        let addr = self.regs[i.rn()].wrapping_sub((SIZE / 8) as u32);
        self.write_mem_sz::<SIZE>(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // MOV.B/W/L @Rm+, Rn; the load wins when m == n
    pub(crate) fn op_mov_load_inc<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let val = self.read_mem_sz::<SIZE>(bus, self.regs[i.rm()])?;
        self.regs[i.rm()] = self.regs[i.rm()].wrapping_add((SIZE / 8) as u32);
        self.regs[i.rn()] = sign_extend::<SIZE>(val);
        Ok(())
    }

    // MOV.B/W R0, @(disp, Rn)
    pub(crate) fn op_mov_store_disp_r0<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let addr = self.regs[i.rm()].wrapping_add(i.disp4() * (SIZE / 8) as u32);
        let val = self.regs[0];
        self.write_mem_sz::<SIZE>(bus, addr, val)
    }

    // MOV.L Rm, @(disp, Rn)
    pub(crate) fn op_movl_store_disp(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()].wrapping_add(i.disp4() * 4);
        let val = self.regs[i.rm()];
        self.write_mem_32(bus, addr, val)
    }

    // MOV.B/W @(disp, Rm), R0
    pub(crate) fn op_mov_load_disp_r0<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let addr = self.regs[i.rm()].wrapping_add(i.disp4() * (SIZE / 8) as u32);
        let val = self.read_mem_sz::<SIZE>(bus, addr)?;
        self.regs[0] = sign_extend::<SIZE>(val);
        Ok(())
    }

    // MOV.L @(disp, Rm), Rn
    pub(crate) fn op_movl_load_disp(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rm()].wrapping_add(i.disp4() * 4);
        self.regs[i.rn()] = self.read_mem_32(bus, addr)?;
        Ok(())
    }

    // MOV.B/W/L Rm, @(R0, Rn)
    pub(crate) fn op_mov_store_idx<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let addr = self.regs[0].wrapping_add(self.regs[i.rn()]);
        let val = self.regs[i.rm()];
        self.write_mem_sz::<SIZE>(bus, addr, val)
    }

    // MOV.B/W/L @(R0, Rm), Rn
    pub(crate) fn op_mov_load_idx<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let addr = self.regs[0].wrapping_add(self.regs[i.rm()]);
        let val = self.read_mem_sz::<SIZE>(bus, addr)?;
        self.regs[i.rn()] = sign_extend::<SIZE>(val);
        Ok(())
    }

    // MOV.B/W/L R0, @(disp, GBR)
    pub(crate) fn op_mov_store_gbr<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let addr = self.gbr.wrapping_add(i.imm8() * (SIZE / 8) as u32);
        let val = self.regs[0];
        self.write_mem_sz::<SIZE>(bus, addr, val)
    }

    // MOV.B/W/L @(disp, GBR), R0
    pub(crate) fn op_mov_load_gbr<const SIZE: usize>(
        &mut self,
        bus: &mut dyn SysBus,
        i: Instruction,
    ) -> OpResult {
        let addr = self.gbr.wrapping_add(i.imm8() * (SIZE / 8) as u32);
        let val = self.read_mem_sz::<SIZE>(bus, addr)?;
        self.regs[0] = sign_extend::<SIZE>(val);
        Ok(())
    }

    // MOV.W @(disp, PC), Rn
    pub(crate) fn op_movw_pc(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.pc.wrapping_add(4).wrapping_add(i.imm8() * 2);
        let val = self.read_mem_16(bus, addr)?;
        self.regs[i.rn()] = sign_extend::<16>(val);
        Ok(())
    }

    // MOV.L @(disp, PC), Rn; PC is fetched long-aligned
    pub(crate) fn op_movl_pc(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = (self.pc & !3).wrapping_add(4).wrapping_add(i.imm8() * 4);
        self.regs[i.rn()] = self.read_mem_32(bus, addr)?;
        Ok(())
    }

    // MOVA @(disp, PC), R0
    pub(crate) fn op_mova(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.regs[0] = (self.pc & !3).wrapping_add(4).wrapping_add(i.imm8() * 4);
        Ok(())
    }

    // MOVCA.L R0, @Rn: plain store, allocation behavior is not modeled
    pub(crate) fn op_movca(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.regs[0];
        self.write_mem_32(bus, self.regs[i.rn()], val)
    }

    // TAS.B @Rn
    pub(crate) fn op_tas(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()];
        let val = self.read_mem_8(bus, addr)?;
        self.write_mem_8(bus, addr, val | 0x80)?;
        self.set_t(val == 0);
        Ok(())
    }

    // OCBI/OCBP/OCBWB @Rn: cache lines are not modeled, must not fault
    pub(crate) fn op_ocbi(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        Ok(())
    }

    pub(crate) fn op_ocbp(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        Ok(())
    }

    pub(crate) fn op_ocbwb(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        Ok(())
    }

    // PREF @Rn: a prefetch hint everywhere except the store-queue
    // window, where it triggers the queue flush
    pub(crate) fn op_pref(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()];
        if (SQ_AREA_BEGIN..=SQ_AREA_END).contains(&addr) {
            self.sq_flush(bus, addr)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::cpu::excp::Sh4Exception;
    use crate::core::cpu::instruction::Instruction;
    use crate::core::cpu::testing::*;
    use crate::core::cpu::Sh4;

    fn exec(cpu: &mut Sh4, bus: &mut TestBus, word: u16) {
        let op = crate::core::cpu::instruction::decode(word);
        (op.handler)(cpu, bus, Instruction(word)).unwrap();
    }

    fn exec_err(cpu: &mut Sh4, bus: &mut TestBus, word: u16) -> Sh4Exception {
        let op = crate::core::cpu::instruction::decode(word);
        (op.handler)(cpu, bus, Instruction(word)).unwrap_err()
    }

    #[test]
    fn store_and_load_with_sign_extension() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[1] = 0x0C00_0100;
        cpu.regs[2] = 0xFFFF_FF80;
        exec(&mut cpu, &mut bus, 0x2120); // MOV.B R2, @R1
        assert_eq!(bus.get_32(0x0C00_0100) & 0xFF, 0x80);
        exec(&mut cpu, &mut bus, 0x6310); // MOV.B @R1, R3
        assert_eq!(cpu.regs[3], 0xFFFF_FF80);

        cpu.regs[2] = 0x8000;
        exec(&mut cpu, &mut bus, 0x2121); // MOV.W R2, @R1
        exec(&mut cpu, &mut bus, 0x6311); // MOV.W @R1, R3
        assert_eq!(cpu.regs[3], 0xFFFF_8000);

        cpu.regs[2] = 0xDEAD_BEEF;
        exec(&mut cpu, &mut bus, 0x2122); // MOV.L R2, @R1
        exec(&mut cpu, &mut bus, 0x6312); // MOV.L @R1, R3
        assert_eq!(cpu.regs[3], 0xDEAD_BEEF);
    }

    #[test]
    fn predecrement_and_postincrement() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[1] = 0x0C00_0104;
        cpu.regs[2] = 0x1234_5678;
        exec(&mut cpu, &mut bus, 0x2126); // MOV.L R2, @-R1
        assert_eq!(cpu.regs[1], 0x0C00_0100);
        assert_eq!(bus.get_32(0x0C00_0100), 0x1234_5678);

        exec(&mut cpu, &mut bus, 0x6316); // MOV.L @R1+, R3
        assert_eq!(cpu.regs[1], 0x0C00_0104);
        assert_eq!(cpu.regs[3], 0x1234_5678);
    }

    #[test]
    fn faulting_predecrement_leaves_rn_untouched() {
        let (mut cpu, mut bus) = boot();
        bus.fault_addr = Some(0x0C00_0100);
        cpu.regs[1] = 0x0C00_0104;
        cpu.regs[2] = 7;
        let exc = exec_err(&mut cpu, &mut bus, 0x2126); // MOV.L R2, @-R1
        assert_eq!(exc, Sh4Exception::DataAddrWrite(0x0C00_0100));
        assert_eq!(cpu.regs[1], 0x0C00_0104);
    }

    #[test]
    fn postincrement_load_with_same_register() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[1] = 0x0C00_0100;
        bus.put_32(0x0C00_0100, 0xCAFE_F00D);
        exec(&mut cpu, &mut bus, 0x6116); // MOV.L @R1+, R1
        assert_eq!(cpu.regs[1], 0xCAFE_F00D);
    }

    #[test]
    fn displacement_forms() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[1] = 0x0C00_0100;
        cpu.regs[0] = 0xAB;
        exec(&mut cpu, &mut bus, 0x8013); // MOV.B R0, @(3, R1)
        assert_eq!(bus.get_32(0x0C00_0103) & 0xFF, 0xAB);
        exec(&mut cpu, &mut bus, 0x8413); // MOV.B @(3, R1), R0
        assert_eq!(cpu.regs[0], 0xFFFF_FFAB);

        cpu.regs[2] = 0x5555_AAAA;
        exec(&mut cpu, &mut bus, 0x1123); // MOV.L R2, @(3, R1)
        assert_eq!(bus.get_32(0x0C00_010C), 0x5555_AAAA);
        exec(&mut cpu, &mut bus, 0x5313); // MOV.L @(3, R1), R3
        assert_eq!(cpu.regs[3], 0x5555_AAAA);
    }

    #[test]
    fn indexed_and_gbr_forms() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[0] = 0x10;
        cpu.regs[1] = 0x0C00_0100;
        cpu.regs[2] = 0x99;
        exec(&mut cpu, &mut bus, 0x0124); // MOV.B R2, @(R0, R1)
        assert_eq!(bus.get_32(0x0C00_0110) & 0xFF, 0x99);
        exec(&mut cpu, &mut bus, 0x031C); // MOV.B @(R0, R1), R3
        assert_eq!(cpu.regs[3], 0xFFFF_FF99);

        cpu.gbr = 0x0C00_0200;
        cpu.regs[0] = 0x7777_8888;
        exec(&mut cpu, &mut bus, 0xC202); // MOV.L R0, @(2, GBR)
        assert_eq!(bus.get_32(0x0C00_0208), 0x7777_8888);
        cpu.regs[0] = 0;
        exec(&mut cpu, &mut bus, 0xC602); // MOV.L @(2, GBR), R0
        assert_eq!(cpu.regs[0], 0x7777_8888);
    }

    #[test]
    fn pc_relative_loads() {
        let (mut cpu, mut bus) = boot();
        cpu.pc = CODE_BASE;
        bus.put_16(0x0C01_0000 + 4 + 4, 0x8000);
        exec(&mut cpu, &mut bus, 0x9102); // MOV.W @(2, PC), R1
        assert_eq!(cpu.regs[1], 0xFFFF_8000);

        cpu.pc = CODE_BASE + 2; // odd word boundary: base is long-aligned
        bus.put_32(0x0C01_0000 + 4 + 8, 0xFEED_FACE);
        exec(&mut cpu, &mut bus, 0xD202); // MOV.L @(2, PC), R2
        assert_eq!(cpu.regs[2], 0xFEED_FACE);

        cpu.pc = CODE_BASE + 2;
        exec(&mut cpu, &mut bus, 0xC702); // MOVA @(2, PC), R0
        assert_eq!(cpu.regs[0], CODE_BASE + 4 + 8);
    }

    #[test]
    fn tas_sets_bit7_and_flags_zero() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[1] = 0x0C00_0100;
        exec(&mut cpu, &mut bus, 0x411B); // TAS.B @R1
        assert_eq!(cpu.t_bit(), 1);
        assert_eq!(bus.get_32(0x0C00_0100) & 0xFF, 0x80);
        exec(&mut cpu, &mut bus, 0x411B);
        assert_eq!(cpu.t_bit(), 0);
    }

    #[test]
    fn cache_ops_do_not_fault() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[1] = 0xDEAD_BEEF; // arbitrary address
        exec(&mut cpu, &mut bus, 0x0193); // OCBI @R1
        exec(&mut cpu, &mut bus, 0x01A3); // OCBP @R1
        exec(&mut cpu, &mut bus, 0x01B3); // OCBWB @R1
        exec(&mut cpu, &mut bus, 0x0183); // PREF @R1
    }

    #[test]
    fn store_queue_flush_through_pref() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[0] = 0xE000_0000;
        // write eight longs into SQ0
        let values = [
            0xDEAD_BEEFu32,
            0xCAFE_BABE,
            0x0123_4567,
            0x89AB_CDEF,
            0x5555_5555,
            0xAAAA_AAAA,
            0x0BAD_F00D,
            0xFEED_FACE,
        ];
        for (k, v) in values.iter().enumerate() {
            cpu.write_mem_32(&mut bus, 0xE000_0000 + (k as u32) * 4, *v).unwrap();
        }
        // QACR0 area bits 0x14 -> physical 0x50000000
        cpu.mmreg.qacr0 = 0x14;
        exec(&mut cpu, &mut bus, 0x0083); // PREF @R0
        for (k, v) in values.iter().enumerate() {
            assert_eq!(bus.get_32(0x5000_0000 + (k as u32) * 4), *v);
        }
    }

    #[test]
    fn sq_flush_in_user_mode_with_sqmd_faults() {
        let (mut cpu, mut bus) = boot();
        cpu.mmreg.mmucr = crate::core::cpu::mmreg::MMUCR_SQMD;
        cpu.set_sr(0); // user mode
        cpu.regs[0] = 0xE000_0000;
        let exc = exec_err(&mut cpu, &mut bus, 0x0083);
        assert!(matches!(exc, Sh4Exception::InstAddrError(_)));
    }
}
