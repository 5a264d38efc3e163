use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::cpu::excp::{Intc, IrqSource};

/*
  TMU register block:

  FFD80000h  TOCR   8bit
  FFD80004h  TSTR   8bit   bit n starts channel n
  FFD80008h  TCOR0  32bit  reload value
  FFD8000Ch  TCNT0  32bit  down counter
  FFD80010h  TCR0   16bit  prescaler / UNF / UNIE
  FFD80014h  TCOR1 ... FFD80028h TCR2
*/
pub const TMU_REG_BEGIN: u32 = 0xFFD8_0000;
pub const TMU_REG_END: u32 = 0xFFD8_002B;

const TCR_TPSC_MASK: u16 = 0x7;
const TCR_UNIE: u16 = 1 << 5;
const TCR_UNF: u16 = 1 << 8;

/// Cycles of CPU clock per timer tick for each TPSC setting. The
/// peripheral clock is CPU/4 and the prescaler divides it further.
fn cycles_per_tick(tcr: u16) -> u64 {
    let pdiv = match tcr & TCR_TPSC_MASK {
        0 => 4,
        1 => 16,
        2 => 64,
        3 => 256,
        4 => 1024,
        // RTC / external inputs are not wired up; count slowly
        _ => 1024,
    };
    4 * pdiv
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Tmu {
    tocr: u8,
    tstr: u8,
    tcor: [u32; 3],
    tcnt: [u32; 3],
    tcr: [u16; 3],
    // CPU cycles not yet turned into timer ticks
    frac: [u64; 3],
}

impl Tmu {
    pub fn new() -> Self {
        let mut tmu = Tmu {
            tocr: 0,
            tstr: 0,
            tcor: [0; 3],
            tcnt: [0; 3],
            tcr: [0; 3],
            frac: [0; 3],
        };
        tmu.reset();
        tmu
    }

    pub fn reset(&mut self) {
        self.tocr = 0;
        self.tstr = 0;
        self.tcor = [0xFFFF_FFFF; 3];
        self.tcnt = [0xFFFF_FFFF; 3];
        self.tcr = [0; 3];
        self.frac = [0; 3];
    }

    fn irq_for(ch: usize) -> IrqSource {
        match ch {
            0 => IrqSource::Tmu0,
            1 => IrqSource::Tmu1,
            _ => IrqSource::Tmu2,
        }
    }

    /// Advances the running channels by `cpu_cycles`, reloading on
    /// underflow and asserting the channel interrupt when enabled.
    pub fn tick(&mut self, cpu_cycles: u64, intc: &mut Intc) {
        for ch in 0..3 {
            if self.tstr & (1 << ch) == 0 {
                continue;
            }
            self.frac[ch] += cpu_cycles;
            let per_tick = cycles_per_tick(self.tcr[ch]);
            let mut ticks = self.frac[ch] / per_tick;
            self.frac[ch] %= per_tick;

            while ticks > 0 {
                let step = ticks.min(self.tcnt[ch] as u64 + 1) as u32;
                if (self.tcnt[ch] as u64) >= ticks {
                    self.tcnt[ch] -= ticks as u32;
                    break;
                }
                // underflow: reload and flag
                ticks -= step as u64;
                self.tcnt[ch] = self.tcor[ch];
                self.tcr[ch] |= TCR_UNF;
                if self.tcr[ch] & TCR_UNIE != 0 {
                    debug!("TMU{} underflow interrupt", ch);
                    intc.assert_irq(Self::irq_for(ch));
                }
            }
        }
    }

    pub fn read_reg(&self, address: u32) -> u32 {
        match address {
            0xFFD8_0000 => self.tocr as u32,
            0xFFD8_0004 => self.tstr as u32,
            0xFFD8_0008 => self.tcor[0],
            0xFFD8_000C => self.tcnt[0],
            0xFFD8_0010 => self.tcr[0] as u32,
            0xFFD8_0014 => self.tcor[1],
            0xFFD8_0018 => self.tcnt[1],
            0xFFD8_001C => self.tcr[1] as u32,
            0xFFD8_0020 => self.tcor[2],
            0xFFD8_0024 => self.tcnt[2],
            0xFFD8_0028 => self.tcr[2] as u32,
            _ => 0,
        }
    }

    pub fn write_reg(&mut self, address: u32, value: u32, intc: &mut Intc) {
        match address {
            0xFFD8_0000 => self.tocr = value as u8 & 1,
            0xFFD8_0004 => self.tstr = value as u8 & 7,
            0xFFD8_0008 => self.tcor[0] = value,
            0xFFD8_000C => self.tcnt[0] = value,
            0xFFD8_0010 => self.write_tcr(0, value as u16, intc),
            0xFFD8_0014 => self.tcor[1] = value,
            0xFFD8_0018 => self.tcnt[1] = value,
            0xFFD8_001C => self.write_tcr(1, value as u16, intc),
            0xFFD8_0020 => self.tcor[2] = value,
            0xFFD8_0024 => self.tcnt[2] = value,
            0xFFD8_0028 => self.write_tcr(2, value as u16, intc),
            _ => debug!("write to unknown TMU register {:08X}", address),
        }
    }

    fn write_tcr(&mut self, ch: usize, value: u16, intc: &mut Intc) {
        // UNF can only be cleared by software; clearing it drops the irq
        let unf = self.tcr[ch] & value & TCR_UNF;
        self.tcr[ch] = (value & 0x3F) | unf;
        if unf == 0 {
            intc.clear_irq(Self::irq_for(ch));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_counts_down_and_reloads() {
        let mut tmu = Tmu::new();
        let mut intc = Intc::new();
        // channel 0: reload 1, count 1, fastest prescaler, irq enabled
        tmu.write_reg(0xFFD8_0008, 1, &mut intc);
        tmu.write_reg(0xFFD8_000C, 1, &mut intc);
        tmu.write_reg(0xFFD8_0010, TCR_UNIE as u32, &mut intc);
        tmu.write_reg(0xFFD8_0004, 1, &mut intc);

        // 16 cpu cycles = 1 tick at TPSC=0: 1 -> 0, no underflow yet
        tmu.tick(16, &mut intc);
        assert_eq!(tmu.read_reg(0xFFD8_000C), 0);
        assert_eq!(intc.highest_pending(), None);

        // next tick underflows, reloads from TCOR and raises the irq
        tmu.tick(16, &mut intc);
        assert_eq!(tmu.read_reg(0xFFD8_000C), 1);
        assert!(tmu.read_reg(0xFFD8_0010) & TCR_UNF as u32 != 0);
        assert_eq!(intc.highest_pending(), Some(IrqSource::Tmu0));

        // clearing UNF acknowledges the interrupt
        tmu.write_reg(0xFFD8_0010, TCR_UNIE as u32, &mut intc);
        assert_eq!(intc.highest_pending(), None);
    }

    #[test]
    fn stopped_channel_does_not_count() {
        let mut tmu = Tmu::new();
        let mut intc = Intc::new();
        tmu.write_reg(0xFFD8_000C, 100, &mut intc);
        tmu.tick(1_000_000, &mut intc);
        assert_eq!(tmu.read_reg(0xFFD8_000C), 100);
    }
}
