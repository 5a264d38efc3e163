use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::core::cpu::excp::{Intc, Sh4Exception};
use crate::core::cpu::fpu::Fpu;
use crate::core::cpu::instruction::{decode, Group, InstOpcode, Instruction};
use crate::core::cpu::mmreg::{MemMappedRegs, ADDR_EXPEVT, ADDR_INTEVT, ADDR_TRA, MMUCR_SQMD};
use crate::core::cpu::ocache::{OpCache, OC_RAM_AREA_BEGIN, OC_RAM_AREA_END, SQ_ADDR_MASK, SQ_AREA_BEGIN, SQ_AREA_END, SQ_SELECT_BIT};
use crate::core::cpu::tmu::{Tmu, TMU_REG_BEGIN, TMU_REG_END};
use crate::core::memory::{MemException, SysBus};

pub mod alu;
pub mod excp;
pub mod fpu;
pub mod instruction;
pub mod mmreg;
pub mod mov;
pub mod ocache;
pub mod system;
pub mod tmu;

pub const RESET_PC: u32 = 0xA000_0000;

/*
  SR:
    30  MD     privileged mode
    29  RB     register bank select (effective only with MD=1)
    28  BL     block exceptions/interrupts
    15  FD     FPU disable
    9   M      division state
    8   Q      division state
    7-4 IMASK  interrupt mask level
    1   S      MAC saturation
    0   T      condition flag
*/
pub const SR_T: u32 = 1 << 0;
pub const SR_S: u32 = 1 << 1;
pub const SR_IMASK_SHIFT: u32 = 4;
pub const SR_IMASK: u32 = 0xF << SR_IMASK_SHIFT;
pub const SR_Q: u32 = 1 << 8;
pub const SR_M: u32 = 1 << 9;
pub const SR_FD: u32 = 1 << 15;
pub const SR_BL: u32 = 1 << 28;
pub const SR_RB: u32 = 1 << 29;
pub const SR_MD: u32 = 1 << 30;

const SR_DEFINED_BITS: u32 = SR_MD | SR_RB | SR_BL | SR_FD | SR_IMASK | SR_M | SR_Q | SR_S | SR_T;

pub const SR_RESET_VALUE: u32 = SR_MD | SR_RB | SR_BL | SR_FD | SR_IMASK;
pub const FPSCR_RESET_VALUE: u32 = 0x41;

/// Physical address bits of the external space; P0-P3 map onto it by
/// dropping the segment bits.
const EXT_ADDR_MASK: u32 = 0x1FFF_FFFF;

/// Everything at or above this is on-chip control register space.
const P4_REG_BEGIN: u32 = 0xFC00_0000;

/// Consecutive faulting instruction fetches before the core declares
/// the guest wedged (the handler address itself keeps faulting).
const FETCH_FAULT_LIMIT: u32 = 128;

pub type OpResult = Result<(), Sh4Exception>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExecState {
    Normal,
    Sleep,
    Standby,
}

pub struct Sh4 {
    /// R0..R15 as currently visible.
    pub(crate) regs: [u32; 16],
    /// The R0..R7 bank that is not currently visible.
    pub(crate) rbank: [u32; 8],
    pub(crate) sr: u32,
    pub(crate) ssr: u32,
    pub(crate) spc: u32,
    pub(crate) gbr: u32,
    pub(crate) vbr: u32,
    pub(crate) sgr: u32,
    pub(crate) dbr: u32,
    pub(crate) mach: u32,
    pub(crate) macl: u32,
    pub(crate) pr: u32,
    pub(crate) pc: u32,
    pub(crate) tra: u32,
    pub(crate) expevt: u32,
    pub(crate) intevt: u32,
    pub(crate) fpu: Fpu,
    pub(crate) intc: Intc,
    pub(crate) tmu: Tmu,
    pub(crate) ocache: OpCache,
    pub(crate) mmreg: MemMappedRegs,
    pub(crate) delayed_branch: bool,
    pub(crate) delayed_branch_addr: u32,
    pub(crate) exec_state: ExecState,
    cycles_accum: u64,
    last_inst_group: Group,
    fetch_fault_streak: u32,
}

impl Sh4 {
    pub fn new(pedantic_fpu: bool) -> Self {
        instruction::build_decode_lut();

        let mut cpu = Sh4 {
            regs: [0; 16],
            rbank: [0; 8],
            sr: SR_RESET_VALUE,
            ssr: 0,
            spc: 0,
            gbr: 0,
            vbr: 0,
            sgr: 0,
            dbr: 0,
            mach: 0,
            macl: 0,
            pr: 0,
            pc: RESET_PC,
            tra: 0,
            expevt: 0,
            intevt: 0,
            fpu: Fpu::new(pedantic_fpu),
            intc: Intc::new(),
            tmu: Tmu::new(),
            ocache: OpCache::new(),
            mmreg: MemMappedRegs::new(),
            delayed_branch: false,
            delayed_branch_addr: 0,
            exec_state: ExecState::Normal,
            cycles_accum: 0,
            last_inst_group: Group::Co,
            fetch_fault_streak: 0,
        };
        cpu.power_on_reset();
        cpu
    }

    pub fn power_on_reset(&mut self) {
        self.regs = [0; 16];
        self.rbank = [0; 8];
        self.manual_reset();
        self.expevt = excp::EXCP_POWER_ON_RESET;
    }

    /// Control state reset; general registers keep their contents.
    pub fn manual_reset(&mut self) {
        self.set_sr(SR_RESET_VALUE);
        self.ssr = 0;
        self.spc = 0;
        self.gbr = 0;
        self.vbr = 0;
        self.sgr = 0;
        self.dbr = 0;
        self.mach = 0;
        self.macl = 0;
        self.pr = 0;
        self.pc = RESET_PC;
        self.tra = 0;
        self.expevt = excp::EXCP_MANUAL_RESET;
        self.intevt = 0;
        self.fpu.reset();
        self.intc.clear_all();
        self.tmu.reset();
        self.ocache.reset();
        self.mmreg.reset();
        self.delayed_branch = false;
        self.delayed_branch_addr = 0;
        self.exec_state = ExecState::Normal;
        self.cycles_accum = 0;
        // the first instruction after reset always costs its cycle
        self.last_inst_group = Group::Co;
        self.fetch_fault_streak = 0;
        fpu::set_host_rounding(self.fpu.fpscr);
    }

    // =========================== registers ===========================

    #[inline(always)]
    pub(crate) fn t_bit(&self) -> u32 {
        self.sr & SR_T
    }

    #[inline(always)]
    pub(crate) fn set_t(&mut self, value: bool) {
        if value {
            self.sr |= SR_T;
        } else {
            self.sr &= !SR_T;
        }
    }

    fn bank1_selected(sr: u32) -> bool {
        sr & SR_MD != 0 && sr & SR_RB != 0
    }

    fn bank_switch(&mut self) {
        for i in 0..8 {
            std::mem::swap(&mut self.regs[i], &mut self.rbank[i]);
        }
    }

    /// The only way SR may be written: flips the visible R0..R7 bank
    /// when the effective bank selection changes.
    pub fn set_sr(&mut self, new_val: u32) {
        let old = self.sr;
        self.sr = new_val & SR_DEFINED_BITS;
        if Self::bank1_selected(old) != Self::bank1_selected(self.sr) {
            self.bank_switch();
        }
    }

    pub fn get_sr(&self) -> u32 {
        self.sr
    }

    pub fn get_pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn in_privileged_mode(&self) -> bool {
        self.sr & SR_MD != 0
    }

    /// All 24 general registers in a fixed layout: R0..R7 of bank 0,
    /// R0..R7 of bank 1, then R8..R15.
    pub fn get_gpr_array(&self) -> [u32; 24] {
        let mut out = [0; 24];
        let (visible, other) = if Self::bank1_selected(self.sr) { (8, 0) } else { (0, 8) };
        for i in 0..8 {
            out[visible + i] = self.regs[i];
            out[other + i] = self.rbank[i];
        }
        out[16..24].copy_from_slice(&self.regs[8..16]);
        out
    }

    pub fn set_gpr_array(&mut self, gpr: [u32; 24]) {
        let (visible, other) = if Self::bank1_selected(self.sr) { (8, 0) } else { (0, 8) };
        for i in 0..8 {
            self.regs[i] = gpr[visible + i];
            self.rbank[i] = gpr[other + i];
        }
        self.regs[8..16].copy_from_slice(&gpr[16..24]);
    }

    pub fn get_fpu(&self) -> Fpu {
        self.fpu.clone()
    }

    pub fn set_fpu(&mut self, fpu: Fpu) {
        self.fpu = fpu;
        fpu::set_host_rounding(self.fpu.fpscr);
    }

    pub fn assert_irl(&mut self, level: u8) {
        self.intc.assert_irq(excp::IrqSource::Irl(level));
    }

    pub fn clear_irl(&mut self, level: u8) {
        self.intc.clear_irq(excp::IrqSource::Irl(level));
    }

    // ========================= memory access =========================

    fn data_read_fault(e: MemException) -> Sh4Exception {
        match e {
            MemException::AddrErrorRead(a) => Sh4Exception::DataAddrRead(a),
            MemException::AddrErrorWrite(a) => Sh4Exception::DataAddrWrite(a),
        }
    }

    pub(crate) fn read_mem_8(&mut self, bus: &mut dyn SysBus, addr: u32) -> Result<u32, Sh4Exception> {
        match addr {
            OC_RAM_AREA_BEGIN..=OC_RAM_AREA_END if OpCache::ora_enabled(self.mmreg.ccr) => {
                Ok(self.ocache.ora_read::<8>(self.mmreg.ccr, addr))
            }
            SQ_AREA_BEGIN..=SQ_AREA_END => Ok((self.ocache.sq_read_32(addr) >> ((addr & 3) * 8)) & 0xFF),
            P4_REG_BEGIN.. => Ok(self.mmreg_read(addr) & 0xFF),
            _ => bus.read_8(addr & EXT_ADDR_MASK).map(|v| v as u32).map_err(Self::data_read_fault),
        }
    }

    pub(crate) fn read_mem_16(&mut self, bus: &mut dyn SysBus, addr: u32) -> Result<u32, Sh4Exception> {
        if addr & 1 != 0 {
            return Err(Sh4Exception::DataAddrRead(addr));
        }
        match addr {
            OC_RAM_AREA_BEGIN..=OC_RAM_AREA_END if OpCache::ora_enabled(self.mmreg.ccr) => {
                Ok(self.ocache.ora_read::<16>(self.mmreg.ccr, addr))
            }
            SQ_AREA_BEGIN..=SQ_AREA_END => Ok((self.ocache.sq_read_32(addr) >> ((addr & 2) * 8)) & 0xFFFF),
            P4_REG_BEGIN.. => Ok(self.mmreg_read(addr) & 0xFFFF),
            _ => bus.read_16(addr & EXT_ADDR_MASK).map(|v| v as u32).map_err(Self::data_read_fault),
        }
    }

    pub(crate) fn read_mem_32(&mut self, bus: &mut dyn SysBus, addr: u32) -> Result<u32, Sh4Exception> {
        if addr & 3 != 0 {
            return Err(Sh4Exception::DataAddrRead(addr));
        }
        match addr {
            OC_RAM_AREA_BEGIN..=OC_RAM_AREA_END if OpCache::ora_enabled(self.mmreg.ccr) => {
                Ok(self.ocache.ora_read::<32>(self.mmreg.ccr, addr))
            }
            SQ_AREA_BEGIN..=SQ_AREA_END => Ok(self.ocache.sq_read_32(addr)),
            P4_REG_BEGIN.. => Ok(self.mmreg_read(addr)),
            _ => bus.read_32(addr & EXT_ADDR_MASK).map_err(Self::data_read_fault),
        }
    }

    pub(crate) fn write_mem_8(&mut self, bus: &mut dyn SysBus, addr: u32, value: u32) -> Result<(), Sh4Exception> {
        match addr {
            OC_RAM_AREA_BEGIN..=OC_RAM_AREA_END if OpCache::ora_enabled(self.mmreg.ccr) => {
                self.ocache.ora_write::<8>(self.mmreg.ccr, addr, value);
                Ok(())
            }
            SQ_AREA_BEGIN..=SQ_AREA_END => {
                self.ocache.sq_write_8(addr, value as u8);
                Ok(())
            }
            P4_REG_BEGIN.. => {
                self.mmreg_write(addr, value);
                Ok(())
            }
            _ => bus.write_8(addr & EXT_ADDR_MASK, value as u8).map_err(Self::data_read_fault),
        }
    }

    pub(crate) fn write_mem_16(&mut self, bus: &mut dyn SysBus, addr: u32, value: u32) -> Result<(), Sh4Exception> {
        if addr & 1 != 0 {
            return Err(Sh4Exception::DataAddrWrite(addr));
        }
        match addr {
            OC_RAM_AREA_BEGIN..=OC_RAM_AREA_END if OpCache::ora_enabled(self.mmreg.ccr) => {
                self.ocache.ora_write::<16>(self.mmreg.ccr, addr, value);
                Ok(())
            }
            SQ_AREA_BEGIN..=SQ_AREA_END => {
                self.ocache.sq_write_16(addr, value as u16);
                Ok(())
            }
            P4_REG_BEGIN.. => {
                self.mmreg_write(addr, value);
                Ok(())
            }
            _ => bus.write_16(addr & EXT_ADDR_MASK, value as u16).map_err(Self::data_read_fault),
        }
    }

    pub(crate) fn write_mem_32(&mut self, bus: &mut dyn SysBus, addr: u32, value: u32) -> Result<(), Sh4Exception> {
        if addr & 3 != 0 {
            return Err(Sh4Exception::DataAddrWrite(addr));
        }
        match addr {
            OC_RAM_AREA_BEGIN..=OC_RAM_AREA_END if OpCache::ora_enabled(self.mmreg.ccr) => {
                self.ocache.ora_write::<32>(self.mmreg.ccr, addr, value);
                Ok(())
            }
            SQ_AREA_BEGIN..=SQ_AREA_END => {
                self.ocache.sq_write_32(addr, value);
                Ok(())
            }
            P4_REG_BEGIN.. => {
                self.mmreg_write(addr, value);
                Ok(())
            }
            _ => bus.write_32(addr & EXT_ADDR_MASK, value).map_err(Self::data_read_fault),
        }
    }

    fn mmreg_read(&mut self, addr: u32) -> u32 {
        match addr {
            ADDR_TRA => self.tra,
            ADDR_EXPEVT => self.expevt,
            ADDR_INTEVT => self.intevt,
            TMU_REG_BEGIN..=TMU_REG_END => self.tmu.read_reg(addr & !3),
            _ => self.mmreg.read(addr & !3),
        }
    }

    fn mmreg_write(&mut self, addr: u32, value: u32) {
        match addr {
            ADDR_TRA => self.tra = value,
            ADDR_EXPEVT => self.expevt = value,
            ADDR_INTEVT => self.intevt = value,
            TMU_REG_BEGIN..=TMU_REG_END => self.tmu.write_reg(addr & !3, value, &mut self.intc),
            _ => self.mmreg.write(addr & !3, value),
        }
    }

    /// PREF @Rn with an address inside the SQ window: burst the
    /// selected queue out to the physical address assembled from the
    /// source address and QACR0/1.
    pub(crate) fn sq_flush(&mut self, bus: &mut dyn SysBus, addr: u32) -> OpResult {
        if self.mmreg.mmucr & MMUCR_SQMD != 0 && !self.in_privileged_mode() {
            return Err(Sh4Exception::InstAddrError(addr));
        }
        let qacr = if addr & SQ_SELECT_BIT == 0 { self.mmreg.qacr0 } else { self.mmreg.qacr1 };
        let target = (addr & SQ_ADDR_MASK) | ((qacr & 0x1F) << 26);
        let words = self.ocache.sq_contents(addr);
        for (i, word) in words.iter().enumerate() {
            bus.write_32(target + (i as u32) * 4, *word)
                .map_err(Self::data_read_fault)?;
        }
        Ok(())
    }

    // ======================== execution engine =======================

    fn read_inst(&mut self, bus: &mut dyn SysBus) -> Result<u16, ()> {
        let pc = self.pc;
        let fetch = if pc & 1 != 0 {
            Err(Sh4Exception::InstAddrError(pc))
        } else {
            self.read_mem_16(bus, pc).map_err(|_| Sh4Exception::InstAddrError(pc))
        };
        match fetch {
            Ok(word) => {
                self.fetch_fault_streak = 0;
                Ok(word as u16)
            }
            Err(exc) => {
                self.fetch_fault_streak += 1;
                if self.fetch_fault_streak > FETCH_FAULT_LIMIT {
                    self.integrity_panic("instruction fetch fault loop");
                }
                self.delayed_branch = false;
                self.enter_exception(&exc);
                Err(())
            }
        }
    }

    /// Runs one instruction through the slot rules: slot-illegal and
    /// FPU-disable checks first, then the handler, then either commit a
    /// pending delayed branch or advance PC by 2. A faulting handler
    /// leaves PC to the exception entry; a memory fault in a delay slot
    /// keeps the branch pending so the re-executed slot can commit it.
    pub(crate) fn do_exec_inst(&mut self, bus: &mut dyn SysBus, inst: Instruction, op: &InstOpcode) {
        if self.delayed_branch && op.pc_relative {
            self.delayed_branch = false;
            self.enter_exception(&Sh4Exception::SlotIllegalInst);
            return;
        }
        if op.is_fpu && self.sr & SR_FD != 0 {
            let exc = if self.delayed_branch {
                Sh4Exception::SlotFpuDisable
            } else {
                Sh4Exception::GenFpuDisable
            };
            self.delayed_branch = false;
            self.enter_exception(&exc);
            return;
        }

        let branch_pending = self.delayed_branch;
        let branch_target = self.delayed_branch_addr;

        match (op.handler)(self, bus, inst) {
            Ok(()) => {
                if branch_pending {
                    self.pc = branch_target;
                    self.delayed_branch = false;
                } else {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Err(exc) => {
                if !(branch_pending && exc.is_memory_fault()) {
                    self.delayed_branch = false;
                }
                self.enter_exception(&exc);
            }
        }
    }

    fn tick_peripherals(&mut self, cycles: u64) {
        let Sh4 { tmu, intc, .. } = self;
        tmu.tick(cycles, intc);
    }

    /// Executes instructions until at least `n_cycles` of CPU time have
    /// been consumed, with carry-over between calls. Returns the cycles
    /// to credit the external scheduler (always `n_cycles`; the unspent
    /// remainder is carried in the accumulator).
    pub fn run_cycles(&mut self, bus: &mut dyn SysBus, n_cycles: u64) -> u64 {
        let mut budget = n_cycles + self.cycles_accum;

        loop {
            self.check_interrupts();
            if self.exec_state != ExecState::Normal {
                // asleep: the budget idles away, events keep the world turning
                self.cycles_accum = 0;
                return n_cycles;
            }

            let Ok(word) = self.read_inst(bus) else { continue };
            let op = decode(word);

            if op.issue as u64 > budget {
                self.cycles_accum = budget;
                return n_cycles;
            }
            budget -= op.issue as u64;
            self.tick_peripherals(op.issue as u64);

            self.do_exec_inst(bus, Instruction(word), op);
            self.last_inst_group = op.group;

            if op.group != Group::Co {
                /*
                 * Dual issue: fetch the next instruction and execute it in
                 * the same cycle slot when the groups allow it. A fetch
                 * exception here is dealt with on the next go-around.
                 */
                let Ok(word2) = self.read_inst(bus) else { continue };
                let second = decode(word2);
                if op.group.can_pair_with(second.group) {
                    self.do_exec_inst(bus, Instruction(word2), second);
                    self.last_inst_group = second.group;
                }
            }

            if budget == 0 {
                self.cycles_accum = 0;
                return n_cycles;
            }
        }
    }

    /// Executes exactly one instruction and returns its cycle cost,
    /// which is zero when it pairs with the previously retired one.
    pub fn single_step(&mut self, bus: &mut dyn SysBus) -> u64 {
        self.check_interrupts();
        if self.exec_state != ExecState::Normal {
            return 1;
        }

        let Ok(word) = self.read_inst(bus) else { return 0 };
        let op = decode(word);

        let cycles = if self.last_inst_group.can_pair_with(op.group) {
            0
        } else {
            op.issue as u64
        };
        self.tick_peripherals(cycles);

        self.do_exec_inst(bus, Instruction(word), op);
        self.last_inst_group = op.group;
        cycles
    }

    pub fn run_until(&mut self, bus: &mut dyn SysBus, stop_addr: u32) -> u64 {
        let mut cycles = 0;
        while self.pc != stop_addr {
            cycles += self.single_step(bus);
        }
        cycles
    }

    // ===================== diagnostics / snapshot ====================

    pub fn dump_regs(&self) -> String {
        let mut out = String::new();
        for i in 0..16 {
            out.push_str(&format!("R{:<2} = {:08X}\n", i, self.regs[i]));
        }
        for i in 0..8 {
            out.push_str(&format!("R{}_BANK = {:08X}\n", i, self.rbank[i]));
        }
        out.push_str(&format!(
            "SR = {:08X} SSR = {:08X} SPC = {:08X} SGR = {:08X}\n",
            self.sr, self.ssr, self.spc, self.sgr
        ));
        out.push_str(&format!(
            "GBR = {:08X} VBR = {:08X} DBR = {:08X} PR = {:08X}\n",
            self.gbr, self.vbr, self.dbr, self.pr
        ));
        out.push_str(&format!(
            "MACH = {:08X} MACL = {:08X} PC = {:08X}\n",
            self.mach, self.macl, self.pc
        ));
        out.push_str(&format!(
            "FPSCR = {:08X} FPUL = {:08X}\n",
            self.fpu.fpscr, self.fpu.fpul
        ));
        out
    }

    /// Internal consistency violation: dump the architectural state and
    /// abort. Guest-visible events never come through here.
    fn integrity_panic(&self, why: &str) -> ! {
        error!("integrity error: {}", why);
        panic!("integrity error: {}\n{}", why, self.dump_regs());
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            gpr: self.get_gpr_array(),
            sr: self.sr,
            ssr: self.ssr,
            spc: self.spc,
            gbr: self.gbr,
            vbr: self.vbr,
            sgr: self.sgr,
            dbr: self.dbr,
            mach: self.mach,
            macl: self.macl,
            pr: self.pr,
            pc: self.pc,
            tra: self.tra,
            expevt: self.expevt,
            intevt: self.intevt,
            fpu: self.fpu.clone(),
            tmu: self.tmu.clone(),
            ocache: self.ocache.clone(),
            mmreg: self.mmreg.clone(),
            delayed_branch: self.delayed_branch,
            delayed_branch_addr: self.delayed_branch_addr,
            exec_state: self.exec_state,
        }
    }

    /// Restores a snapshot. The decode LUT is recomputed, never stored.
    pub fn restore(&mut self, snap: &CpuSnapshot) {
        instruction::build_decode_lut();
        self.sr = snap.sr & SR_DEFINED_BITS;
        self.set_gpr_array(snap.gpr);
        self.ssr = snap.ssr;
        self.spc = snap.spc;
        self.gbr = snap.gbr;
        self.vbr = snap.vbr;
        self.sgr = snap.sgr;
        self.dbr = snap.dbr;
        self.mach = snap.mach;
        self.macl = snap.macl;
        self.pr = snap.pr;
        self.pc = snap.pc;
        self.tra = snap.tra;
        self.expevt = snap.expevt;
        self.intevt = snap.intevt;
        self.fpu = snap.fpu.clone();
        self.tmu = snap.tmu.clone();
        self.ocache = snap.ocache.clone();
        self.mmreg = snap.mmreg.clone();
        self.delayed_branch = snap.delayed_branch;
        self.delayed_branch_addr = snap.delayed_branch_addr;
        self.exec_state = snap.exec_state;
        self.cycles_accum = 0;
        self.last_inst_group = Group::Co;
        self.fetch_fault_streak = 0;
        fpu::set_host_rounding(self.fpu.fpscr);
        info!("cpu state restored, PC = {:08X}", self.pc);
    }
}

/// The complete architectural state, serialized for save-states.
#[derive(Clone, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub gpr: [u32; 24],
    pub sr: u32,
    pub ssr: u32,
    pub spc: u32,
    pub gbr: u32,
    pub vbr: u32,
    pub sgr: u32,
    pub dbr: u32,
    pub mach: u32,
    pub macl: u32,
    pub pr: u32,
    pub pc: u32,
    pub tra: u32,
    pub expevt: u32,
    pub intevt: u32,
    pub fpu: Fpu,
    pub tmu: Tmu,
    pub ocache: OpCache,
    pub mmreg: MemMappedRegs,
    pub delayed_branch: bool,
    pub delayed_branch_addr: u32,
    pub exec_state: ExecState,
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn power_on_reset_state() {
        let cpu = Sh4::new(false);
        assert_eq!(cpu.get_pc(), 0xA0000000);
        assert_eq!(cpu.get_sr(), SR_MD | SR_RB | SR_BL | SR_FD | SR_IMASK);
        assert_eq!(cpu.fpu.fpscr, FPSCR_RESET_VALUE);
        assert_eq!(cpu.expevt, 0);
        assert!(!cpu.delayed_branch);
        assert!(cpu.fpu.fr.iter().all(|f| *f == 0));
        assert!(cpu.fpu.xf.iter().all(|f| *f == 0));
    }

    #[test]
    fn first_fetch_after_reset_is_at_the_reset_vector() {
        let mut cpu = Sh4::new(false);
        let mut bus = TestBus::new();
        // NOP at physical 0x00000000
        bus.put_16(0, 0x0009);
        cpu.single_step(&mut bus);
        assert_eq!(bus.reads[0], 0);
        assert_eq!(cpu.get_pc(), 0xA0000002);
    }

    #[test]
    fn gpr_round_trip_across_bank_configurations() {
        let mut cpu = Sh4::new(false);
        for bank1 in [false, true] {
            let sr = if bank1 { SR_MD | SR_RB } else { SR_MD };
            cpu.set_sr(sr);
            for i in 0..16 {
                let v = 0x1000_0000 + i as u32;
                cpu.regs[i] = v;
                assert_eq!(cpu.regs[i], v);
            }
        }
    }

    #[test]
    fn sr_write_swaps_the_visible_bank() {
        let mut cpu = Sh4::new(false);
        cpu.set_sr(SR_MD); // bank 0 visible
        cpu.regs[0] = 0xAAAA_0000;
        cpu.rbank[0] = 0xBBBB_0000;

        cpu.set_sr(SR_MD | SR_RB); // bank 1 visible
        assert_eq!(cpu.regs[0], 0xBBBB_0000);
        assert_eq!(cpu.rbank[0], 0xAAAA_0000);

        // RB has no effect in user mode
        cpu.set_sr(SR_RB);
        assert_eq!(cpu.regs[0], 0xAAAA_0000);
    }

    #[test]
    fn gpr_array_layout_is_bank0_bank1_then_high() {
        let mut cpu = Sh4::new(false);
        cpu.set_sr(SR_MD); // bank 0 visible
        cpu.regs[0] = 1;
        cpu.rbank[0] = 2;
        cpu.regs[8] = 3;
        let arr = cpu.get_gpr_array();
        assert_eq!(arr[0], 1);
        assert_eq!(arr[8], 2);
        assert_eq!(arr[16], 3);

        // the array is bank-configuration independent
        cpu.set_sr(SR_MD | SR_RB);
        let arr2 = cpu.get_gpr_array();
        assert_eq!(arr, arr2);
    }

    #[test]
    fn mov_add_cmp_sequence() {
        // MOV #0x7F, R3 ; ADD #-1, R3 ; CMP/EQ #0x7E, R0
        let (mut cpu, mut bus) = boot();
        cpu.regs[0] = 0x7E;
        load_program(&mut bus, CODE_BASE, &[0xE37F, 0x73FF, 0x887E]);
        step_n(&mut cpu, &mut bus, 3);
        assert_eq!(cpu.regs[3], 0x7E);
        assert_eq!(cpu.t_bit(), 1);
    }

    #[test]
    fn delayed_branch_sequence() {
        // BRA +8 ; NOP (slot) ; filler ; filler ; MOV #1, R0 at +0xA
        let (mut cpu, mut bus) = boot();
        cpu.regs[0] = 0;
        load_program(
            &mut bus,
            CODE_BASE,
            &[0xA003, 0x0009, 0x0009, 0x0009, 0x0009, 0xE001],
        );
        step_n(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.get_pc(), CODE_BASE + 0xA);
        assert_eq!(cpu.regs[0], 0);
        step_n(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.regs[0], 1);
    }

    #[test]
    fn branch_in_delay_slot_is_slot_illegal() {
        let (mut cpu, mut bus) = boot();
        cpu.vbr = 0x8C020000;
        // BRA +8 with another BRA in the slot
        load_program(&mut bus, CODE_BASE, &[0xA003, 0xA003]);
        step_n(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.expevt, excp::EXCP_SLOT_ILLEGAL_INST);
        assert_eq!(cpu.get_pc(), 0x8C020100);
        // the branch was not committed and the slot's PC was saved
        assert_eq!(cpu.spc, CODE_BASE + 2);
        assert!(!cpu.delayed_branch);
    }

    #[test]
    fn memory_fault_in_delay_slot_preserves_the_branch() {
        let (mut cpu, mut bus) = boot();
        cpu.vbr = 0x8C020000;
        cpu.regs[1] = 0x0C00_0102; // misaligned for MOV.L
        // BRA +8 ; MOV.L @R1, R2 (faults)
        load_program(&mut bus, CODE_BASE, &[0xA003, 0x6212]);
        step_n(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.expevt, excp::EXCP_DATA_ADDR_READ);
        assert!(cpu.delayed_branch);
        assert_eq!(cpu.delayed_branch_addr, CODE_BASE + 4 + 6);
    }

    #[test]
    fn invalid_opcode_raises_general_illegal() {
        let (mut cpu, mut bus) = boot();
        cpu.vbr = 0x8C020000;
        load_program(&mut bus, CODE_BASE, &[0xFFFD]);
        step_n(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.expevt, excp::EXCP_GEN_ILLEGAL_INST);
        assert_eq!(cpu.spc, CODE_BASE);
        assert_eq!(cpu.ssr & SR_MD, SR_MD);
        assert_eq!(cpu.get_pc(), 0x8C020100);
    }

    #[test]
    fn exception_entry_sets_block_and_privilege() {
        let (mut cpu, mut bus) = boot();
        cpu.set_sr(0); // user mode
        cpu.pc = CODE_BASE;
        load_program(&mut bus, CODE_BASE, &[0xFFFD]);
        let r15_before = cpu.regs[15];
        step_n(&mut cpu, &mut bus, 1);
        assert_ne!(cpu.sr & SR_BL, 0);
        assert_ne!(cpu.sr & SR_MD, 0);
        assert_ne!(cpu.sr & SR_RB, 0);
        assert_eq!(cpu.sr & SR_FD, 0);
        assert_eq!(cpu.sgr, r15_before);
    }

    #[test]
    fn interrupt_gated_by_imask_and_bl() {
        let (mut cpu, mut bus) = boot();
        cpu.vbr = 0x8C020000;
        load_program(&mut bus, CODE_BASE, &[0x0009, 0x0009]);
        load_program(&mut bus, 0x8C020600, &[0x0009, 0x0009]);
        // IMASK = 15 blocks a priority-13 interrupt
        cpu.set_sr(SR_MD | SR_IMASK);
        cpu.assert_irl(2);
        cpu.single_step(&mut bus);
        assert_eq!(cpu.get_pc(), CODE_BASE + 2);

        // dropping the mask lets it in; the handler's first instruction
        // retires within the same step
        cpu.set_sr(SR_MD);
        cpu.single_step(&mut bus);
        assert_eq!(cpu.get_pc(), 0x8C020602);
        assert_eq!(cpu.intevt, 0x240);
        assert_eq!(cpu.spc, CODE_BASE + 2);

        // BL blocks everything
        let (mut cpu, mut bus) = boot();
        load_program(&mut bus, CODE_BASE, &[0x0009]);
        cpu.set_sr(SR_MD | SR_BL);
        cpu.assert_irl(0);
        cpu.single_step(&mut bus);
        assert_eq!(cpu.get_pc(), CODE_BASE + 2);
    }

    #[test]
    fn run_cycles_carries_the_remainder() {
        let (mut cpu, mut bus) = boot();
        // straight CO ops: STS MACH, Rn costs 1 but pairs with nothing
        load_program(&mut bus, CODE_BASE, &[0x0002; 64]); // STC SR, R0: CO, issue 2
        let credited = cpu.run_cycles(&mut bus, 5);
        assert_eq!(credited, 5);
        // 2+2 spent, 1 carried; two instructions retired
        assert_eq!(cpu.get_pc(), CODE_BASE + 4);
        let credited = cpu.run_cycles(&mut bus, 3);
        assert_eq!(credited, 3);
        // 1 carried + 3 = 4: two more instructions
        assert_eq!(cpu.get_pc(), CODE_BASE + 8);
    }

    #[test]
    fn co_only_sequence_costs_the_sum_of_issues() {
        let (mut cpu, mut bus) = boot();
        load_program(&mut bus, CODE_BASE, &[0x0002; 8]); // 8x STC SR, R0 (CO, 2)
        cpu.run_cycles(&mut bus, 16);
        assert_eq!(cpu.get_pc(), CODE_BASE + 16);
    }

    #[test]
    fn ex_ls_pairs_dual_issue() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[1] = 0x8C00_0100;
        // alternating EX (ADD #1, R0) and LS (MOV.L @R1, R2): pairs, so
        // 8 instructions take 4 cycles
        load_program(
            &mut bus,
            CODE_BASE,
            &[0x7001, 0x6212, 0x7001, 0x6212, 0x7001, 0x6212, 0x7001, 0x6212],
        );
        cpu.run_cycles(&mut bus, 4);
        assert_eq!(cpu.get_pc(), CODE_BASE + 16);
        assert_eq!(cpu.regs[0], 4);
    }

    #[test]
    fn sleep_idles_until_interrupt() {
        let (mut cpu, mut bus) = boot();
        cpu.vbr = 0x8C020000;
        load_program(&mut bus, CODE_BASE, &[0x001B, 0x0009]); // SLEEP; NOP
        load_program(&mut bus, 0x8C020600, &[0x0009, 0x0009]);
        cpu.set_sr(SR_MD); // unmask interrupts
        cpu.single_step(&mut bus);
        assert_eq!(cpu.exec_state, ExecState::Sleep);
        let pc_after_sleep = cpu.get_pc();
        // budget burns with no execution
        cpu.run_cycles(&mut bus, 100);
        assert_eq!(cpu.get_pc(), pc_after_sleep);
        // an interrupt wakes it into the handler
        cpu.assert_irl(0);
        cpu.run_cycles(&mut bus, 1);
        assert_eq!(cpu.exec_state, ExecState::Normal);
        assert_eq!(cpu.intevt, 0x200);
    }

    #[test]
    fn snapshot_round_trips() {
        let (mut cpu, mut bus) = boot();
        cpu.regs[3] = 0xCAFE;
        cpu.gbr = 0x1234;
        cpu.fpu.fpul = 99;
        load_program(&mut bus, CODE_BASE, &[0xE107]); // MOV #7, R1
        cpu.single_step(&mut bus);
        let snap = cpu.snapshot();

        let mut other = Sh4::new(false);
        other.restore(&snap);
        assert_eq!(other.regs[3], 0xCAFE);
        assert_eq!(other.regs[1], 7);
        assert_eq!(other.gbr, 0x1234);
        assert_eq!(other.fpu.fpul, 99);
        assert_eq!(other.get_pc(), cpu.get_pc());
        assert_eq!(other.get_gpr_array(), cpu.get_gpr_array());
    }

    #[test]
    fn run_until_stops_at_the_address() {
        let (mut cpu, mut bus) = boot();
        load_program(&mut bus, CODE_BASE, &[0x0009; 8]);
        let cycles = cpu.run_until(&mut bus, CODE_BASE + 8);
        assert_eq!(cpu.get_pc(), CODE_BASE + 8);
        // NOP is MT and MT pairs with itself, so only the first one
        // (which follows the reset CO state) costs a cycle
        assert_eq!(cycles, 1);
    }

    #[test]
    fn pc_stays_even() {
        let (mut cpu, mut bus) = boot();
        load_program(&mut bus, CODE_BASE, &[0x0009; 32]);
        for _ in 0..32 {
            cpu.single_step(&mut bus);
            assert_eq!(cpu.get_pc() & 1, 0);
        }
    }
}
