use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::clock::{Clock, ClockConfig, Event, EventType};
use crate::core::config::Config;
use crate::core::cpu::{CpuSnapshot, Sh4};
use crate::core::memory::bus::Bus;
use crate::core::memory::ArrayMemory;

pub const EMU_NAME: &str = "r-dc";
pub const EMU_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const EMU_BUILD_DATE_TIME: &str = build_time::build_time_utc!();

const THROTTLE_RES: u64 = 100;
const THROTTLE_ADJ_FACTOR: f32 = 1.8;
const STATS_INTERVAL_S: u64 = 10;

/// Largest run slice when nothing is scheduled; keeps the event queue
/// responsive to newly scheduled work.
const DEFAULT_SLICE: u64 = 4096;

/// Glue between the CPU core, the bus and the event clock: the
/// Run/Step/RunUntil surface the outside world drives.
pub struct Emulator {
    cpu: Sh4,
    bus: Bus,
    clock: Clock,
    throttle_enabled: bool,
    last_throttle_timestamp: Instant,
    stats_cycles: u64,
}

impl Emulator {
    pub fn new(boot: ArrayMemory, flash: ArrayMemory, config: &Config) -> Self {
        info!("building emulator ...");
        let cpu = Sh4::new(config.pedantic_fpu);
        let bus = Bus::new(boot, flash);
        let clock = Clock::new(ClockConfig::DREAMCAST);

        let mut emu = Self {
            cpu,
            bus,
            clock,
            throttle_enabled: config.throttle,
            last_throttle_timestamp: Instant::now(),
            stats_cycles: 0,
        };
        if emu.throttle_enabled {
            emu.reschedule_throttling();
        }
        emu.schedule_stats();
        emu
    }

    pub fn cpu(&self) -> &Sh4 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Sh4 {
        &mut self.cpu
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Runs forever (or until the host kills us).
    pub fn emulate(&mut self) {
        info!("starting execution at PC={:08X}", self.cpu.get_pc());
        loop {
            self.run_slice();
        }
    }

    /// Executes up to the next scheduled event and services it.
    pub fn run_slice(&mut self) {
        let budget = self
            .clock
            .cycles_until_next_event()
            .unwrap_or(DEFAULT_SLICE)
            .clamp(1, DEFAULT_SLICE);
        let credited = self.cpu.run_cycles(&mut self.bus, budget);
        self.clock.advance_time(credited);
        self.stats_cycles += credited;
        for event in self.clock.next_events() {
            self.process_event(event);
        }
    }

    /// Executes exactly one instruction, crediting the clock and
    /// draining any event whose deadline fell inside it.
    pub fn step(&mut self) -> u64 {
        let cycles = self.cpu.single_step(&mut self.bus);
        self.clock.advance_time(cycles);
        self.stats_cycles += cycles;
        for event in self.clock.next_events() {
            self.process_event(event);
        }
        cycles
    }

    pub fn run_until(&mut self, stop_addr: u32) {
        while self.cpu.get_pc() != stop_addr {
            self.step();
        }
    }

    fn process_event(&mut self, event: Event) {
        match event.event_type {
            EventType::DoThrottle => {
                if self.throttle_enabled {
                    let elapsed_micros = self.last_throttle_timestamp.elapsed().as_micros() as u64;
                    self.reschedule_throttling();
                    const EXPECTED_MICROS: u64 = 1_000_000 / THROTTLE_RES;
                    if elapsed_micros < EXPECTED_MICROS {
                        thread::sleep(Duration::from_micros(
                            ((EXPECTED_MICROS as f32 - elapsed_micros as f32) * THROTTLE_ADJ_FACTOR)
                                as u64,
                        ));
                    }
                }
            }
            EventType::StatsReport => {
                let mhz = self.stats_cycles as f64 / (STATS_INTERVAL_S as f64 * 1_000_000.0);
                info!("guest speed ~{:.1} Mcycles/s, PC={:08X}", mhz, self.cpu.get_pc());
                self.stats_cycles = 0;
                self.schedule_stats();
            }
        }
    }

    fn reschedule_throttling(&mut self) {
        self.last_throttle_timestamp = Instant::now();
        let cpu_hz = self.clock.get_clock_config().cpu_hz;
        self.clock.schedule(EventType::DoThrottle, cpu_hz / THROTTLE_RES);
    }

    fn schedule_stats(&mut self) {
        let cpu_hz = self.clock.get_clock_config().cpu_hz;
        self.clock.schedule(EventType::StatsReport, cpu_hz * STATS_INTERVAL_S);
    }

    /// Full machine snapshot: the architectural register set and the
    /// store queues, everything a save-state needs. The decode LUT is
    /// rebuilt on restore, never serialized.
    pub fn snapshot(&self) -> EmuSnapshot {
        EmuSnapshot {
            cpu: self.cpu.snapshot(),
            clock_time: self.clock.current_time(),
        }
    }

    pub fn restore(&mut self, snap: &EmuSnapshot) {
        self.cpu.restore(&snap.cpu);
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmuSnapshot {
    pub cpu: CpuSnapshot,
    pub clock_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::{BOOT_ROM_LEN, FLASH_ROM_LEN};

    fn boot_with(program: &[u16]) -> Emulator {
        let mut image = vec![0u8; BOOT_ROM_LEN];
        for (i, w) in program.iter().enumerate() {
            image[i * 2] = *w as u8;
            image[i * 2 + 1] = (*w >> 8) as u8;
        }
        let boot = ArrayMemory::new(&image, true);
        let flash = ArrayMemory::zeroed(FLASH_ROM_LEN);
        let config = Config { throttle: false, ..Config::default() };
        Emulator::new(boot, flash, &config)
    }

    #[test]
    fn steps_execute_from_the_reset_vector() {
        // MOV #3, R1 ; ADD #4, R1
        let mut emu = boot_with(&[0xE103, 0x7104]);
        emu.step();
        emu.step();
        // after reset MD|RB selects bank 1, so R1 is slot 9 of the array
        assert_eq!(emu.cpu().get_gpr_array()[9], 7);
        assert_eq!(emu.cpu().get_pc(), 0xA0000004);
    }

    #[test]
    fn run_until_stops_at_the_target() {
        let mut emu = boot_with(&[0x0009, 0x0009, 0x0009, 0xE105]);
        emu.run_until(0xA0000006);
        assert_eq!(emu.cpu().get_pc(), 0xA0000006);
    }

    #[test]
    fn snapshot_restore_resumes_identically() {
        let mut emu = boot_with(&[0xE10A, 0x7101, 0x7101, 0x7101]);
        emu.step();
        emu.step();
        let snap = emu.snapshot();

        let mut other = boot_with(&[0xE10A, 0x7101, 0x7101, 0x7101]);
        other.restore(&snap);
        emu.step();
        other.step();
        assert_eq!(emu.cpu().get_pc(), other.cpu().get_pc());
        assert_eq!(emu.cpu().get_gpr_array(), other.cpu().get_gpr_array());
    }
}
