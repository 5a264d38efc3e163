use clap::Parser;
use tracing::{error, info};

use crate::core::config::Config;
use crate::core::emu::{Emulator, EMU_BUILD_DATE_TIME, EMU_NAME, EMU_VERSION};
use crate::core::memory::{ArrayMemory, BOOT_ROM_LEN, FLASH_ROM_LEN};

mod core;
mod log;

#[derive(Parser)]
#[command(name = EMU_NAME, version = EMU_VERSION)]
struct Args {
    /// Boot ROM image (overrides the config file)
    bios: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log filter, e.g. "info" or "r_dc::core::cpu=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Execute this many instructions, dump the registers and exit
    /// (0 = run forever)
    #[arg(long, default_value_t = 0)]
    steps: u64,
}

fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("cannot load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(bios) = args.bios {
        config.bios = bios;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    let _logger = log::Logger::new(&config.log_level);
    info!("Welcome to {} v{} compiled on {}", EMU_NAME, EMU_VERSION, EMU_BUILD_DATE_TIME);

    let boot = match ArrayMemory::load_from_file(&config.bios, BOOT_ROM_LEN, true) {
        Ok(rom) => rom,
        Err(e) => {
            error!("cannot load boot ROM {}: {}", config.bios, e);
            std::process::exit(1);
        }
    };
    info!("boot ROM MD5: {}", boot.md5);

    let flash = match &config.flash {
        Some(path) => match ArrayMemory::load_from_file(path, FLASH_ROM_LEN, false) {
            Ok(rom) => {
                info!("flash MD5: {}", rom.md5);
                rom
            }
            Err(e) => {
                error!("cannot load flash {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => ArrayMemory::zeroed(FLASH_ROM_LEN),
    };

    let mut emu = Emulator::new(boot, flash, &config);
    if args.steps > 0 {
        for _ in 0..args.steps {
            emu.step();
        }
        println!("{}", emu.cpu().dump_regs());
    } else {
        emu.emulate();
    }
}
