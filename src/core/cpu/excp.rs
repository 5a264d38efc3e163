use tracing::debug;

use crate::core::cpu::{Sh4, RESET_PC, SR_BL, SR_FD, SR_IMASK, SR_IMASK_SHIFT, SR_MD, SR_RB};

/*
  EXPEVT codes. Several events share a code; the re-execution/completion
  distinction and the read/write distinction live in the event itself.
*/
pub const EXCP_POWER_ON_RESET: u32 = 0x000;
pub const EXCP_MANUAL_RESET: u32 = 0x020;
pub const EXCP_INST_ADDR_ERR: u32 = 0x0e0;
pub const EXCP_DATA_ADDR_READ: u32 = 0x0e0;
pub const EXCP_DATA_ADDR_WRITE: u32 = 0x100;
pub const EXCP_FPU: u32 = 0x120;
pub const EXCP_TRAP: u32 = 0x160;
pub const EXCP_GEN_ILLEGAL_INST: u32 = 0x180;
pub const EXCP_SLOT_ILLEGAL_INST: u32 = 0x1a0;
pub const EXCP_GEN_FPU_DISABLE: u32 = 0x800;
pub const EXCP_SLOT_FPU_DISABLE: u32 = 0x820;

/// Synchronous architectural events an instruction can produce. These
/// are not host errors: the engine turns them into an exception entry
/// and keeps running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sh4Exception {
    PowerOnReset,
    ManualReset,
    InstAddrError(u32),
    GenIllegalInst,
    SlotIllegalInst,
    GenFpuDisable,
    SlotFpuDisable,
    DataAddrRead(u32),
    DataAddrWrite(u32),
    FpuExc,
    Trap(u32),
}

pub struct ExcpMeta {
    pub prio_level: u8,
    pub prio_order: u8,
    pub offset: u32,
}

impl Sh4Exception {
    pub fn code(&self) -> u32 {
        use Sh4Exception::*;
        match self {
            PowerOnReset => EXCP_POWER_ON_RESET,
            ManualReset => EXCP_MANUAL_RESET,
            InstAddrError(_) => EXCP_INST_ADDR_ERR,
            GenIllegalInst => EXCP_GEN_ILLEGAL_INST,
            SlotIllegalInst => EXCP_SLOT_ILLEGAL_INST,
            GenFpuDisable => EXCP_GEN_FPU_DISABLE,
            SlotFpuDisable => EXCP_SLOT_FPU_DISABLE,
            DataAddrRead(_) => EXCP_DATA_ADDR_READ,
            DataAddrWrite(_) => EXCP_DATA_ADDR_WRITE,
            FpuExc => EXCP_FPU,
            Trap(_) => EXCP_TRAP,
        }
    }

    /// Priority level/order and vector offset. Ties on level break on
    /// order (lower first).
    pub fn meta(&self) -> ExcpMeta {
        use Sh4Exception::*;
        match self {
            PowerOnReset => ExcpMeta { prio_level: 1, prio_order: 1, offset: 0 },
            ManualReset => ExcpMeta { prio_level: 1, prio_order: 2, offset: 0 },
            InstAddrError(_) => ExcpMeta { prio_level: 2, prio_order: 1, offset: 0x100 },
            GenIllegalInst => ExcpMeta { prio_level: 2, prio_order: 4, offset: 0x100 },
            SlotIllegalInst => ExcpMeta { prio_level: 2, prio_order: 4, offset: 0x100 },
            GenFpuDisable => ExcpMeta { prio_level: 2, prio_order: 4, offset: 0x100 },
            SlotFpuDisable => ExcpMeta { prio_level: 2, prio_order: 4, offset: 0x100 },
            DataAddrRead(_) => ExcpMeta { prio_level: 2, prio_order: 5, offset: 0x100 },
            DataAddrWrite(_) => ExcpMeta { prio_level: 2, prio_order: 5, offset: 0x100 },
            FpuExc => ExcpMeta { prio_level: 2, prio_order: 8, offset: 0x100 },
            Trap(_) => ExcpMeta { prio_level: 2, prio_order: 4, offset: 0x100 },
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Sh4Exception::PowerOnReset | Sh4Exception::ManualReset)
    }

    /// Memory faults in a delay slot leave the pending branch intact so
    /// that re-executing the slot can still commit it.
    pub fn is_memory_fault(&self) -> bool {
        matches!(
            self,
            Sh4Exception::DataAddrRead(_) | Sh4Exception::DataAddrWrite(_)
        )
    }
}

/*
  INTEVT codes for the interrupt sources the core knows about. External
  IRLs encode level n as 0x200 + 0x20*n; the on-chip timer channels have
  their own codes.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqSource {
    Irl(u8),
    Tmu0,
    Tmu1,
    Tmu2,
}

impl IrqSource {
    pub fn code(&self) -> u32 {
        match self {
            IrqSource::Irl(n) => 0x200 + 0x20 * (*n as u32),
            IrqSource::Tmu0 => 0x400,
            IrqSource::Tmu1 => 0x420,
            IrqSource::Tmu2 => 0x440,
        }
    }

    /// Interrupt priority level compared against SR.IMASK. IRL level n
    /// requests priority 15-n; the timer channels sit at a fixed
    /// mid-range priority.
    pub fn priority(&self) -> u8 {
        match self {
            IrqSource::Irl(n) => 15 - n,
            IrqSource::Tmu0 | IrqSource::Tmu1 | IrqSource::Tmu2 => 4,
        }
    }
}

/// Level-triggered interrupt lines as seen by the CPU. The external
/// controller (or the TMU) asserts and clears them.
pub struct Intc {
    pending: Vec<IrqSource>,
}

impl Intc {
    pub fn new() -> Self {
        Intc { pending: Vec::new() }
    }

    pub fn assert_irq(&mut self, src: IrqSource) {
        if !self.pending.contains(&src) {
            self.pending.push(src);
        }
    }

    pub fn clear_irq(&mut self, src: IrqSource) {
        self.pending.retain(|s| *s != src);
    }

    pub fn clear_all(&mut self) {
        self.pending.clear();
    }

    /// Highest-priority pending source, if any.
    pub fn highest_pending(&self) -> Option<IrqSource> {
        self.pending.iter().copied().max_by_key(|s| s.priority())
    }
}

impl Sh4 {
    /// Rewrites CPU state so the next fetch lands in the handler:
    /// SPC/SSR/SGR hold the return context, SR gains BL|MD|RB and
    /// drops FD (routed through the SR write path so the register bank
    /// can flip), and PC is aimed at VBR plus the event's offset.
    pub fn enter_exception(&mut self, exc: &Sh4Exception) {
        debug!("exception {:?} at PC={:08X}", exc, self.pc);
        let meta = exc.meta();

        self.spc = self.pc;
        self.ssr = self.sr;
        self.sgr = self.regs[15];

        let mut sr = self.sr | SR_BL | SR_MD | SR_RB;
        sr &= !SR_FD;
        self.set_sr(sr);

        self.expevt = exc.code();

        self.pc = if exc.is_reset() {
            RESET_PC
        } else {
            self.vbr.wrapping_add(meta.offset)
        };
    }

    /// Interrupt entry: same save/restore dance, but the code goes to
    /// INTEVT and the vector offset is always 0x600.
    pub fn enter_interrupt(&mut self, src: IrqSource) {
        debug!("interrupt {:?} at PC={:08X}", src, self.pc);

        self.spc = self.pc;
        self.ssr = self.sr;
        self.sgr = self.regs[15];

        let mut sr = self.sr | SR_BL | SR_MD | SR_RB;
        sr &= !SR_FD;
        self.set_sr(sr);

        self.intevt = src.code();
        self.pc = self.vbr.wrapping_add(0x600);
    }

    /// Checks for an unblocked pending interrupt and enters it. Wakes
    /// the CPU out of SLEEP/STANDBY. Returns true if one was taken.
    pub(crate) fn check_interrupts(&mut self) -> bool {
        if self.sr & SR_BL != 0 {
            return false;
        }
        let imask = ((self.sr & SR_IMASK) >> SR_IMASK_SHIFT) as u8;
        if let Some(src) = self.intc.highest_pending()
            && src.priority() > imask
        {
            self.exec_state = crate::core::cpu::ExecState::Normal;
            self.enter_interrupt(src);
            return true;
        }
        false
    }
}
