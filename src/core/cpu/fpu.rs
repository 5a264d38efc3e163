use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::core::cpu::excp::Sh4Exception;
use crate::core::cpu::instruction::Instruction;
use crate::core::cpu::{OpResult, Sh4, FPSCR_RESET_VALUE};
use crate::core::memory::SysBus;

/*
  FPSCR:
    21  FR      register bank select
    20  SZ      transfer size (0 = 32-bit, 1 = 64-bit pair)
    19  PR      precision (0 = single, 1 = double)
    18  DN      denormals are zero
    17-12 CAUSE (E,V,Z,O,U,I from the top)
    11-7  ENABLE
    6-2   FLAG
    1-0   RM    rounding (00 nearest, 01 toward zero)
*/
pub const FPSCR_RM_MASK: u32 = 0x3;
pub const FPSCR_FLAG_I: u32 = 1 << 2;
pub const FPSCR_FLAG_U: u32 = 1 << 3;
pub const FPSCR_FLAG_O: u32 = 1 << 4;
pub const FPSCR_FLAG_Z: u32 = 1 << 5;
pub const FPSCR_FLAG_V: u32 = 1 << 6;
pub const FPSCR_ENABLE_I: u32 = 1 << 7;
pub const FPSCR_ENABLE_U: u32 = 1 << 8;
pub const FPSCR_ENABLE_O: u32 = 1 << 9;
pub const FPSCR_ENABLE_Z: u32 = 1 << 10;
pub const FPSCR_ENABLE_V: u32 = 1 << 11;
pub const FPSCR_CAUSE_I: u32 = 1 << 12;
pub const FPSCR_CAUSE_U: u32 = 1 << 13;
pub const FPSCR_CAUSE_O: u32 = 1 << 14;
pub const FPSCR_CAUSE_Z: u32 = 1 << 15;
pub const FPSCR_CAUSE_V: u32 = 1 << 16;
pub const FPSCR_CAUSE_E: u32 = 1 << 17;
pub const FPSCR_CAUSE_MASK: u32 = 0x3F << 12;
pub const FPSCR_DN: u32 = 1 << 18;
pub const FPSCR_PR: u32 = 1 << 19;
pub const FPSCR_SZ: u32 = 1 << 20;
pub const FPSCR_FR: u32 = 1 << 21;

const FPSCR_WRITE_MASK: u32 = 0x003F_FFFF;

const FPU_QNAN: u32 = 0x7FBF_FFFF;

// libc does not expose fenv.h bindings, so declare the C function and the
// x86_64 rounding-mode constants (matching glibc's bits/fenv.h) directly.
#[cfg(target_arch = "x86_64")]
const FE_TONEAREST: libc::c_int = 0x0000;
#[cfg(target_arch = "x86_64")]
const FE_TOWARDZERO: libc::c_int = 0x0c00;

#[cfg(target_arch = "x86_64")]
unsafe extern "C" {
    fn fesetround(mode: libc::c_int) -> libc::c_int;
}

/// Propagates FPSCR.RM into the host floating-point environment so the
/// arithmetic handlers round the way the guest asked for.
pub(crate) fn set_host_rounding(fpscr: u32) {
    let mode = if fpscr & FPSCR_RM_MASK == 1 {
        FE_TOWARDZERO
    } else {
        FE_TONEAREST
    };
    unsafe {
        fesetround(mode);
    }
}

/// The FPU register file. `fr` is the bank addressed by opcode bits,
/// `xf` the other one; FPSCR.FR swaps them wholesale. Values live as
/// raw bits so moves never disturb NaN payloads.
#[derive(Clone, Serialize, Deserialize)]
pub struct Fpu {
    pub fr: [u32; 16],
    pub xf: [u32; 16],
    pub fpscr: u32,
    pub fpul: u32,
    pub pedantic: bool,
}

impl Fpu {
    pub fn new(pedantic: bool) -> Self {
        Fpu {
            fr: [0; 16],
            xf: [0; 16],
            fpscr: FPSCR_RESET_VALUE,
            fpul: 0,
            pedantic,
        }
    }

    pub fn reset(&mut self) {
        self.fr = [0; 16];
        self.xf = [0; 16];
        self.fpscr = FPSCR_RESET_VALUE;
        self.fpul = 0;
    }

    pub fn bank_switch(&mut self) {
        std::mem::swap(&mut self.fr, &mut self.xf);
    }

    #[inline(always)]
    pub fn pr(&self) -> bool {
        self.fpscr & FPSCR_PR != 0
    }

    #[inline(always)]
    pub fn sz(&self) -> bool {
        self.fpscr & FPSCR_SZ != 0
    }

    #[inline(always)]
    pub fn get_fr(&self, n: usize) -> f32 {
        f32::from_bits(self.fr[n])
    }

    #[inline(always)]
    pub fn set_fr(&mut self, n: usize, val: f32) {
        self.fr[n] = val.to_bits();
    }

    /// DR pair: the even register holds the high word.
    #[inline(always)]
    pub fn get_dr(&self, n: usize) -> f64 {
        f64::from_bits(((self.fr[n] as u64) << 32) | self.fr[n + 1] as u64)
    }

    #[inline(always)]
    pub fn set_dr(&mut self, n: usize, val: f64) {
        let bits = val.to_bits();
        self.fr[n] = (bits >> 32) as u32;
        self.fr[n + 1] = bits as u32;
    }

    fn clear_cause(&mut self) {
        self.fpscr &= !FPSCR_CAUSE_MASK;
    }
}

/*
  FSCA tables: sine and cosine sampled at 65536 steps per revolution,
  computed once and immutable afterwards. The instruction is a straight
  table lookup, so keeping these stable keeps FSCA bit-exact.
*/
static FSCA_SIN_TBL: OnceLock<Vec<u32>> = OnceLock::new();
static FSCA_COS_TBL: OnceLock<Vec<u32>> = OnceLock::new();

pub const FSCA_TBL_LEN: usize = 65536;

pub fn fsca_tables() -> (&'static [u32], &'static [u32]) {
    let sin = FSCA_SIN_TBL.get_or_init(|| {
        (0..FSCA_TBL_LEN)
            .map(|i| {
                let angle = i as f64 * (std::f64::consts::TAU / FSCA_TBL_LEN as f64);
                (angle.sin() as f32).to_bits()
            })
            .collect()
    });
    let cos = FSCA_COS_TBL.get_or_init(|| {
        (0..FSCA_TBL_LEN)
            .map(|i| {
                let angle = i as f64 * (std::f64::consts::TAU / FSCA_TBL_LEN as f64);
                (angle.cos() as f32).to_bits()
            })
            .collect()
    });
    (sin, cos)
}

impl Sh4 {
    /// The only way FPSCR may be written: swaps the banks on an FR flip
    /// and keeps the host rounding mode in sync with RM.
    pub fn set_fpscr(&mut self, val: u32) {
        let old = self.fpu.fpscr;
        self.fpu.fpscr = val & FPSCR_WRITE_MASK;
        if (old ^ self.fpu.fpscr) & FPSCR_FR != 0 {
            self.fpu.bank_switch();
        }
        set_host_rounding(self.fpu.fpscr);
    }

    pub fn get_fpscr(&self) -> u32 {
        self.fpu.fpscr
    }

    /// Pedantic-mode bookkeeping for an invalid operation on a single
    /// register: qNaN out, or the FPU exception when enabled.
    fn fr_invalid(&mut self, dst: usize) -> OpResult {
        self.fpu.fpscr |= FPSCR_FLAG_V | FPSCR_CAUSE_V;
        if self.fpu.fpscr & FPSCR_ENABLE_V != 0 {
            Err(Sh4Exception::FpuExc)
        } else {
            self.fpu.fr[dst] = FPU_QNAN;
            Ok(())
        }
    }

    // ======================== load immediates ========================

    // FLDI0 FRn; undefined with PR set, treated as an illegal encoding
    pub(crate) fn op_fldi0(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.fpu.pr() {
            return self.op_invalid(bus, i);
        }
        self.fpu.fr[i.rn()] = 0;
        Ok(())
    }

    // FLDI1 FRn; the hardware accepts this one in either precision
    pub(crate) fn op_fldi1(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.fr[i.rn()] = 1.0f32.to_bits();
        Ok(())
    }

    // FLDS FRm, FPUL
    pub(crate) fn op_flds(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.fpul = self.fpu.fr[i.rn()];
        Ok(())
    }

    // FSTS FPUL, FRn
    pub(crate) fn op_fsts(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.fr[i.rn()] = self.fpu.fpul;
        Ok(())
    }

    // =========================== register moves ======================

    /*
      FMOV FRm, FRn and the four DR/XD pairings under SZ=1. Bit 8 of the
      word marks an XD destination, bit 4 an XD source.
    */
    pub(crate) fn op_fmov(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.fpu.sz() {
            let dst = i.drn();
            let src = i.drm();
            let (lo, hi) = if i.0 & 1 << 4 != 0 {
                (self.fpu.xf[src], self.fpu.xf[src + 1])
            } else {
                (self.fpu.fr[src], self.fpu.fr[src + 1])
            };
            if i.0 & 1 << 8 != 0 {
                self.fpu.xf[dst] = lo;
                self.fpu.xf[dst + 1] = hi;
            } else {
                self.fpu.fr[dst] = lo;
                self.fpu.fr[dst + 1] = hi;
            }
        } else {
            self.fpu.fr[i.rn()] = self.fpu.fr[i.rm()];
        }
        Ok(())
    }

    /// A 64-bit transfer keeps the memory image of the pair: the low
    /// address holds the odd register.
    fn fmov_load_pair(&mut self, bus: &mut dyn SysBus, addr: u32, i: Instruction) -> OpResult {
        let dst = i.drn();
        let lo = self.read_mem_32(bus, addr)?;
        let hi = self.read_mem_32(bus, addr.wrapping_add(4))?;
        if i.0 & 1 << 8 != 0 {
            self.fpu.xf[dst + 1] = lo;
            self.fpu.xf[dst] = hi;
        } else {
            self.fpu.fr[dst + 1] = lo;
            self.fpu.fr[dst] = hi;
        }
        Ok(())
    }

    fn fmov_store_pair(&mut self, bus: &mut dyn SysBus, addr: u32, i: Instruction) -> OpResult {
        let src = i.drm();
        let (lo, hi) = if i.0 & 1 << 4 != 0 {
            (self.fpu.xf[src + 1], self.fpu.xf[src])
        } else {
            (self.fpu.fr[src + 1], self.fpu.fr[src])
        };
        self.write_mem_32(bus, addr, lo)?;
        self.write_mem_32(bus, addr.wrapping_add(4), hi)
    }

    // FMOV.S @Rm, FRn / FMOV @Rm, DRn / XDn
    pub(crate) fn op_fmov_load(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rm()];
        if self.fpu.sz() {
            self.fmov_load_pair(bus, addr, i)
        } else {
            self.fpu.fr[i.rn()] = self.read_mem_32(bus, addr)?;
            Ok(())
        }
    }

    // FMOV.S @(R0, Rm), FRn / DRn / XDn
    pub(crate) fn op_fmov_load_idx(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[0].wrapping_add(self.regs[i.rm()]);
        if self.fpu.sz() {
            self.fmov_load_pair(bus, addr, i)
        } else {
            self.fpu.fr[i.rn()] = self.read_mem_32(bus, addr)?;
            Ok(())
        }
    }

    // FMOV.S @Rm+, FRn / DRn / XDn
    pub(crate) fn op_fmov_load_inc(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rm()];
        if self.fpu.sz() {
            self.fmov_load_pair(bus, addr, i)?;
            self.regs[i.rm()] = self.regs[i.rm()].wrapping_add(8);
        } else {
            self.fpu.fr[i.rn()] = self.read_mem_32(bus, addr)?;
            self.regs[i.rm()] = self.regs[i.rm()].wrapping_add(4);
        }
        Ok(())
    }

    // FMOV.S FRm, @Rn / FMOV DRm / XDm, @Rn
    pub(crate) fn op_fmov_store(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()];
        if self.fpu.sz() {
            self.fmov_store_pair(bus, addr, i)
        } else {
            let val = self.fpu.fr[i.rm()];
            self.write_mem_32(bus, addr, val)
        }
    }

    // FMOV.S FRm, @-Rn / DRm / XDm
    pub(crate) fn op_fmov_store_dec(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.fpu.sz() {
            let addr = self.regs[i.rn()].wrapping_sub(8);
            self.fmov_store_pair(bus, addr, i)?;
            self.regs[i.rn()] = addr;
        } else {
            let addr = self.regs[i.rn()].wrapping_sub(4);
            let val = self.fpu.fr[i.rm()];
            self.write_mem_32(bus, addr, val)?;
            self.regs[i.rn()] = addr;
        }
        Ok(())
    }

    // FMOV.S FRm, @(R0, Rn) / DRm / XDm
    pub(crate) fn op_fmov_store_idx(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[0].wrapping_add(self.regs[i.rn()]);
        if self.fpu.sz() {
            self.fmov_store_pair(bus, addr, i)
        } else {
            let val = self.fpu.fr[i.rm()];
            self.write_mem_32(bus, addr, val)
        }
    }

    // ========================== arithmetic ===========================

    // FABS FRn / DRn: the sign lives in the even register either way
    pub(crate) fn op_fabs(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        let n = if self.fpu.pr() { i.drn() } else { i.rn() };
        self.fpu.fr[n] &= 0x7FFF_FFFF;
        Ok(())
    }

    // FNEG FRn / DRn
    pub(crate) fn op_fneg(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        let n = if self.fpu.pr() { i.drn() } else { i.rn() };
        self.fpu.fr[n] ^= 0x8000_0000;
        Ok(())
    }

    // FADD FRm, FRn / DRm, DRn
    pub(crate) fn op_fadd(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        if self.fpu.pr() {
            let result = self.fpu.get_dr(i.drn()) + self.fpu.get_dr(i.drm());
            self.fpu.set_dr(i.drn(), result);
        } else {
            let result = self.fpu.get_fr(i.rn()) + self.fpu.get_fr(i.rm());
            self.fpu.set_fr(i.rn(), result);
        }
        Ok(())
    }

    // FSUB FRm, FRn / DRm, DRn
    pub(crate) fn op_fsub(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        if self.fpu.pr() {
            let result = self.fpu.get_dr(i.drn()) - self.fpu.get_dr(i.drm());
            self.fpu.set_dr(i.drn(), result);
        } else {
            let result = self.fpu.get_fr(i.rn()) - self.fpu.get_fr(i.rm());
            self.fpu.set_fr(i.rn(), result);
        }
        Ok(())
    }

    // FMUL FRm, FRn / DRm, DRn
    pub(crate) fn op_fmul(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        if self.fpu.pr() {
            let result = self.fpu.get_dr(i.drn()) * self.fpu.get_dr(i.drm());
            self.fpu.set_dr(i.drn(), result);
        } else {
            let result = self.fpu.get_fr(i.rn()) * self.fpu.get_fr(i.rm());
            self.fpu.set_fr(i.rn(), result);
        }
        Ok(())
    }

    // FDIV FRm, FRn / DRm, DRn
    pub(crate) fn op_fdiv(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        if self.fpu.pr() {
            let divisor = self.fpu.get_dr(i.drm());
            if self.fpu.pedantic && divisor == 0.0 {
                self.fpu.fpscr |= FPSCR_FLAG_Z | FPSCR_CAUSE_Z;
                if self.fpu.fpscr & FPSCR_ENABLE_Z != 0 {
                    return Err(Sh4Exception::FpuExc);
                }
            }
            let result = self.fpu.get_dr(i.drn()) / divisor;
            self.fpu.set_dr(i.drn(), result);
        } else {
            let divisor = self.fpu.get_fr(i.rm());
            if self.fpu.pedantic && divisor == 0.0 {
                self.fpu.fpscr |= FPSCR_FLAG_Z | FPSCR_CAUSE_Z;
                if self.fpu.fpscr & FPSCR_ENABLE_Z != 0 {
                    return Err(Sh4Exception::FpuExc);
                }
            }
            let result = self.fpu.get_fr(i.rn()) / divisor;
            self.fpu.set_fr(i.rn(), result);
        }
        Ok(())
    }

    // FMAC FR0, FRm, FRn (single precision only)
    pub(crate) fn op_fmac(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.fpu.pr() {
            return self.op_invalid(bus, i);
        }
        self.fpu.clear_cause();
        let result = self.fpu.get_fr(0) * self.fpu.get_fr(i.rm()) + self.fpu.get_fr(i.rn());
        self.fpu.set_fr(i.rn(), result);
        Ok(())
    }

    // FSQRT FRn / DRn
    pub(crate) fn op_fsqrt(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        if self.fpu.pr() {
            let val = self.fpu.get_dr(i.drn());
            if self.fpu.pedantic && val < 0.0 {
                return self.fr_invalid(i.drn());
            }
            self.fpu.set_dr(i.drn(), val.sqrt());
        } else {
            let val = self.fpu.get_fr(i.rn());
            if self.fpu.pedantic && val < 0.0 {
                return self.fr_invalid(i.rn());
            }
            self.fpu.set_fr(i.rn(), val.sqrt());
        }
        Ok(())
    }

    // FSRRA FRn: reciprocal square root, single precision only
    pub(crate) fn op_fsrra(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.fpu.pr() {
            return self.op_invalid(bus, i);
        }
        self.fpu.clear_cause();
        let val = self.fpu.get_fr(i.rn());
        if self.fpu.pedantic && val < 0.0 {
            return self.fr_invalid(i.rn());
        }
        self.fpu.set_fr(i.rn(), 1.0 / val.sqrt());
        Ok(())
    }

    // FCMP/EQ FRm, FRn / DRm, DRn
    pub(crate) fn op_fcmp_eq(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        let t = if self.fpu.pr() {
            self.fpu.get_dr(i.drn()) == self.fpu.get_dr(i.drm())
        } else {
            self.fpu.get_fr(i.rn()) == self.fpu.get_fr(i.rm())
        };
        self.set_t(t);
        Ok(())
    }

    // FCMP/GT FRm, FRn / DRm, DRn
    pub(crate) fn op_fcmp_gt(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        let t = if self.fpu.pr() {
            self.fpu.get_dr(i.drn()) > self.fpu.get_dr(i.drm())
        } else {
            self.fpu.get_fr(i.rn()) > self.fpu.get_fr(i.rm())
        };
        self.set_t(t);
        Ok(())
    }

    // ========================== conversions ==========================

    // FLOAT FPUL, FRn / DRn
    pub(crate) fn op_float(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        if self.fpu.pr() {
            self.fpu.set_dr(i.drn(), self.fpu.fpul as i32 as f64);
        } else {
            self.fpu.set_fr(i.rn(), self.fpu.fpul as i32 as f32);
        }
        Ok(())
    }

    // FTRC FRm, FPUL / DRm, FPUL: always truncates toward zero no
    // matter what RM says
    pub(crate) fn op_ftrc(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        self.fpu.fpul = if self.fpu.pr() {
            let val = self.fpu.get_dr(i.drn());
            if val.is_nan() { 0x8000_0000 } else { val as i32 as u32 }
        } else {
            let val = self.fpu.get_fr(i.rn());
            if val.is_nan() { 0x8000_0000 } else { val as i32 as u32 }
        };
        Ok(())
    }

    // FCNVDS DRm, FPUL (double mode only)
    pub(crate) fn op_fcnvds(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if !self.fpu.pr() {
            return self.op_invalid(bus, i);
        }
        self.fpu.clear_cause();
        self.fpu.fpul = (self.fpu.get_dr(i.drn()) as f32).to_bits();
        Ok(())
    }

    // FCNVSD FPUL, DRn (double mode only)
    pub(crate) fn op_fcnvsd(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if !self.fpu.pr() {
            return self.op_invalid(bus, i);
        }
        self.fpu.clear_cause();
        let val = f32::from_bits(self.fpu.fpul) as f64;
        self.fpu.set_dr(i.drn(), val);
        Ok(())
    }

    // ========================== vector units =========================

    // FIPR FVm, FVn: dot product into the last lane of FVn
    pub(crate) fn op_fipr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        let m = i.fvm() * 4;
        let n = i.fvn() * 4;
        let mut dot = 0.0f32;
        for k in 0..4 {
            dot += self.fpu.get_fr(m + k) * self.fpu.get_fr(n + k);
        }
        self.fpu.set_fr(n + 3, dot);
        Ok(())
    }

    // FTRV XMTRX, FVn: 4x4 matrix in XF (column major) times FVn
    pub(crate) fn op_ftrv(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.clear_cause();
        let n = i.fvn() * 4;
        let mut vec = [0.0f32; 4];
        for (k, v) in vec.iter_mut().enumerate() {
            *v = self.fpu.get_fr(n + k);
        }
        for row in 0..4 {
            let mut sum = 0.0f32;
            for col in 0..4 {
                sum += f32::from_bits(self.fpu.xf[row + col * 4]) * vec[col];
            }
            self.fpu.set_fr(n + row, sum);
        }
        Ok(())
    }

    // FSCA FPUL, DRn: table-driven sine/cosine of a 16-bit angle
    pub(crate) fn op_fsca(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        if self.fpu.pr() {
            return self.op_invalid(bus, i);
        }
        self.fpu.clear_cause();
        if self.fpu.pedantic {
            self.fpu.fpscr |= FPSCR_CAUSE_I | FPSCR_FLAG_I;
        }
        let (sin_tbl, cos_tbl) = fsca_tables();
        let angle = (self.fpu.fpul & (FSCA_TBL_LEN as u32 - 1)) as usize;
        let n = i.drn();
        self.fpu.fr[n] = sin_tbl[angle];
        self.fpu.fr[n + 1] = cos_tbl[angle];
        Ok(())
    }

    // ========================= mode switches =========================

    // FRCHG: flip the register banks
    pub(crate) fn op_frchg(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        let val = self.fpu.fpscr ^ FPSCR_FR;
        self.set_fpscr(val);
        Ok(())
    }

    // FSCHG: flip the transfer size
    pub(crate) fn op_fschg(&mut self, _bus: &mut dyn SysBus, _i: Instruction) -> OpResult {
        let val = self.fpu.fpscr ^ FPSCR_SZ;
        self.set_fpscr(val);
        Ok(())
    }

    // ========================== LDS / STS ============================

    // LDS Rm, FPSCR
    pub(crate) fn op_lds_fpscr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.regs[i.rn()];
        self.set_fpscr(val);
        Ok(())
    }

    // STS FPSCR, Rn
    pub(crate) fn op_sts_fpscr(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.regs[i.rn()] = self.fpu.fpscr;
        Ok(())
    }

    // LDS Rm, FPUL
    pub(crate) fn op_lds_fpul(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.fpu.fpul = self.regs[i.rn()];
        Ok(())
    }

    // STS FPUL, Rn
    pub(crate) fn op_sts_fpul(&mut self, _bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        self.regs[i.rn()] = self.fpu.fpul;
        Ok(())
    }

    // LDS.L @Rm+, FPSCR
    pub(crate) fn op_ldsl_fpscr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.set_fpscr(val);
        Ok(())
    }

    // LDS.L @Rm+, FPUL
    pub(crate) fn op_ldsl_fpul(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let val = self.read_mem_32(bus, self.regs[i.rn()])?;
        self.regs[i.rn()] = self.regs[i.rn()].wrapping_add(4);
        self.fpu.fpul = val;
        Ok(())
    }

    // STS.L FPSCR, @-Rn
    pub(crate) fn op_stsl_fpscr(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.fpu.fpscr;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }

    // STS.L FPUL, @-Rn
    pub(crate) fn op_stsl_fpul(&mut self, bus: &mut dyn SysBus, i: Instruction) -> OpResult {
        let addr = self.regs[i.rn()].wrapping_sub(4);
        let val = self.fpu.fpul;
        self.write_mem_32(bus, addr, val)?;
        self.regs[i.rn()] = addr;
        Ok(())
    }
}
