use tracing::warn;

use crate::core::memory::{
    get_memory_map, ArrayMemory, MemException, MemResult, MemoryMap, MemorySection, SysBus,
    MAIN_RAM_LEN, VIDEO_RAM_LEN,
};

/// The external memory system seen by the CPU: boot ROM, flash, video
/// RAM and main RAM, keyed on physical addresses. Peripheral register
/// blocks (Holly, AICA, ...) are not modeled; accesses to them are
/// logged and read back as zero.
pub struct Bus {
    boot: ArrayMemory,
    flash: ArrayMemory,
    ram: ArrayMemory,
    vram: ArrayMemory,
}

impl Bus {
    pub fn new(boot: ArrayMemory, flash: ArrayMemory) -> Self {
        Bus {
            boot,
            flash,
            ram: ArrayMemory::zeroed(MAIN_RAM_LEN),
            vram: ArrayMemory::zeroed(VIDEO_RAM_LEN),
        }
    }

    /// Copies a raw image into the address space, used by program
    /// loaders. The target region must be writable RAM.
    pub fn load_binary(&mut self, address: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            let MemoryMap(section, offset) = get_memory_map(address + i as u32);
            match section {
                MemorySection::MainRAM => self.ram.memory[offset as usize] = *b,
                MemorySection::VideoRAM => self.vram.memory[offset as usize] = *b,
                _ => warn!("load_binary outside of RAM at {:08X}", address + i as u32),
            }
        }
    }

    fn read<const SIZE: usize>(&mut self, address: u32) -> MemResult<u32> {
        let MemoryMap(section, offset) = get_memory_map(address);
        match section {
            MemorySection::BootRom => Ok(self.boot.read::<SIZE>(offset as usize)),
            MemorySection::FlashRom => Ok(self.flash.read::<SIZE>(offset as usize)),
            MemorySection::VideoRAM => Ok(self.vram.read::<SIZE>(offset as usize)),
            MemorySection::MainRAM => Ok(self.ram.read::<SIZE>(offset as usize)),
            MemorySection::Unmapped => {
                warn!("read<{}> from unmapped address {:08X}", SIZE, address);
                Ok(0)
            }
        }
    }

    fn write<const SIZE: usize>(&mut self, address: u32, value: u32) -> MemResult<()> {
        let MemoryMap(section, offset) = get_memory_map(address);
        match section {
            MemorySection::BootRom => {
                warn!("write<{}> to boot ROM at {:08X} ignored", SIZE, address);
                Ok(())
            }
            MemorySection::FlashRom => {
                if self.flash.read_only {
                    warn!("write<{}> to read-only flash at {:08X} ignored", SIZE, address);
                } else {
                    self.flash.write::<SIZE>(offset as usize, value);
                }
                Ok(())
            }
            MemorySection::VideoRAM => {
                self.vram.write::<SIZE>(offset as usize, value);
                Ok(())
            }
            MemorySection::MainRAM => {
                self.ram.write::<SIZE>(offset as usize, value);
                Ok(())
            }
            MemorySection::Unmapped => {
                warn!("write<{}> of {:08X} to unmapped address {:08X}", SIZE, value, address);
                Ok(())
            }
        }
    }
}

impl SysBus for Bus {
    fn read_8(&mut self, address: u32) -> MemResult<u8> {
        Ok(self.read::<8>(address)? as u8)
    }

    fn read_16(&mut self, address: u32) -> MemResult<u16> {
        if address & 1 != 0 {
            return Err(MemException::AddrErrorRead(address));
        }
        Ok(self.read::<16>(address)? as u16)
    }

    fn read_32(&mut self, address: u32) -> MemResult<u32> {
        if address & 3 != 0 {
            return Err(MemException::AddrErrorRead(address));
        }
        self.read::<32>(address)
    }

    fn write_8(&mut self, address: u32, value: u8) -> MemResult<()> {
        self.write::<8>(address, value as u32)
    }

    fn write_16(&mut self, address: u32, value: u16) -> MemResult<()> {
        if address & 1 != 0 {
            return Err(MemException::AddrErrorWrite(address));
        }
        self.write::<16>(address, value as u32)
    }

    fn write_32(&mut self, address: u32, value: u32) -> MemResult<()> {
        if address & 3 != 0 {
            return Err(MemException::AddrErrorWrite(address));
        }
        self.write::<32>(address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::BOOT_ROM_LEN;

    fn make_bus() -> Bus {
        let boot = ArrayMemory::new(&vec![0u8; BOOT_ROM_LEN], true);
        let flash = ArrayMemory::zeroed(crate::core::memory::FLASH_ROM_LEN);
        Bus::new(boot, flash)
    }

    #[test]
    fn ram_read_write() {
        let mut bus = make_bus();
        bus.write_32(0x0C000100, 0xDEADBEEF).unwrap();
        assert_eq!(bus.read_32(0x0C000100).unwrap(), 0xDEADBEEF);
        // mirror
        assert_eq!(bus.read_32(0x0D000100).unwrap(), 0xDEADBEEF);
        assert_eq!(bus.read_8(0x0C000103).unwrap(), 0xDE);
    }

    #[test]
    fn boot_rom_is_read_only() {
        let mut bus = make_bus();
        bus.write_32(0x00000000, 0x12345678).unwrap();
        assert_eq!(bus.read_32(0x00000000).unwrap(), 0);
    }

    #[test]
    fn misaligned_access_faults() {
        let mut bus = make_bus();
        assert_eq!(bus.read_32(0x0C000002), Err(MemException::AddrErrorRead(0x0C000002)));
        assert_eq!(
            bus.write_16(0x0C000001, 1),
            Err(MemException::AddrErrorWrite(0x0C000001))
        );
    }
}
