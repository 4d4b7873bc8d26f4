// Thin CLI front-end (spec.md 1): argument parsing, wiring, and a run loop,
// nothing more. HEX/ELF loaders, the GDB-RSP adapter, a VCD-file CLI, and
// the scripting host are the embedder's job.

use std::env;
use std::fs;
use std::process;

use avrsim::device::Atmega328p;
use avrsim::mcu::{DeviceConfig, McuState};
use avrsim::Mcu;

const PM_SIZE: usize = 0x8000;
const DM_SIZE: usize = 0x900;
const RAMSTART: usize = 0x100;
const RAMEND: usize = 0x8ff;
const FLASHEND: usize = 0x7fff;
const SPM_PAGESIZE: usize = 128;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let firmware_path = args.next().unwrap_or_else(|| {
        eprintln!("usage: avrsim <firmware.bin> [max-ticks]");
        process::exit(2);
    });
    let max_ticks: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(u64::MAX);

    let firmware = fs::read(&firmware_path).unwrap_or_else(|err| {
        eprintln!("failed to read {firmware_path}: {err}");
        process::exit(2);
    });

    let config = DeviceConfig {
        firmware,
        firmware_base: 0,
        pm_size: PM_SIZE,
        dm_size: DM_SIZE,
        ramstart: RAMSTART,
        ramend: RAMEND,
        flashstart: 0,
        flashend: FLASHEND,
        spm_pagesize: SPM_PAGESIZE,
        fuses: [0x62, 0xd9, 0xff, 0, 0, 0],
        lock: 0xff,
    };

    let mut mcu = Mcu::new(Box::new(Atmega328p), config).unwrap_or_else(|err| {
        eprintln!("device init failed: {err}");
        process::exit(1);
    });

    let mut ticks = 0u64;
    while ticks < max_ticks {
        mcu.tick();
        ticks += 1;
        match mcu.state {
            McuState::Stop => process::exit(0),
            McuState::TestFail => process::exit(1),
            _ => {}
        }
    }

    log::info!("reached max-ticks={max_ticks} with state={:?}", mcu.state);
}
