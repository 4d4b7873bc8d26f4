// The MCU aggregate (spec.md 3) -- the re-architected stand-in for the
// source's single giant struct full of raw pointers. Indices replace
// pointers throughout; the five-step tick order from spec.md 5 lives here.

use crate::decode;
use crate::device::DeviceVariant;
use crate::error::{SimError, SimResult};
use crate::instructions::Instruction;
use crate::interrupt::InterruptController;
use crate::memory::{DataSpace, ProgramSpace};
use crate::timer::Timer8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McuState {
    Running,
    Stopped,
    Sleeping,
    Step,
    Stop,
    TestFail,
}

pub struct DeviceConfig {
    pub firmware: Vec<u8>,
    pub firmware_base: usize,
    pub pm_size: usize,
    pub dm_size: usize,
    pub ramstart: usize,
    pub ramend: usize,
    pub flashstart: usize,
    pub flashend: usize,
    pub spm_pagesize: usize,
    pub fuses: [u8; 6],
    pub lock: u8,
}

pub struct Mcu {
    pub dm: DataSpace,
    pub pm: ProgramSpace,
    pub pc: u32,
    pub pc_bits: u8,
    pub in_mcinst: bool,
    pub ic_left: u16,
    pub read_from_mpm: bool,
    pub state: McuState,
    pub interrupt: InterruptController,
    pub timer0: Timer8,
    pub device: Box<dyn DeviceVariant>,
    pub freq: u32,
    pub lock: u8,
    pub cycles: u64,
}

impl Mcu {
    pub fn new(device: Box<dyn DeviceVariant>, config: DeviceConfig) -> SimResult<Self> {
        let fuse_cfg = device.set_fuse(&config.fuses)?;
        let lock = device.set_lock(config.lock);

        // ATmega328P's 32KB flash fits a 16-bit Z pointer, so it carries no
        // RAMPZ/RAMPY/RAMPX/EIND -- ELPM/EICALL/EIJMP are IllegalOnDevice on
        // this variant (spec.md 4.1, 4.6).
        let mut dm = DataSpace::new(config.dm_size, device.sfr_off(), config.ramstart, config.ramend);
        dm.spmcsr = Some(dm.io_addr(0x37));

        let mut pm = ProgramSpace::new(config.pm_size, config.flashstart, config.flashend, config.spm_pagesize);
        pm.load_image(config.firmware_base, &config.firmware);

        let timer0 = Timer8::new(
            dm.io_addr(0x26),
            dm.io_addr(0x27),
            dm.io_addr(0x28),
            dm.io_addr(0x24),
            dm.io_addr(0x25),
            dm.io_addr(0x15),
            dm.io_addr(0x6e),
            dm.io_addr(0x0b),
            dm.io_addr(0x0a),
        );

        let interrupt = InterruptController::new(0, device.vector_stride());

        Ok(Mcu {
            dm,
            pm,
            pc: fuse_cfg.reset_vector,
            pc_bits: device.pc_bits(),
            in_mcinst: false,
            ic_left: 0,
            read_from_mpm: false,
            state: McuState::Running,
            interrupt,
            timer0,
            device,
            freq: fuse_cfg.freq,
            lock,
            cycles: 0,
        })
    }

    pub fn pc_bytes(&self) -> u8 {
        if self.pc_bits > 16 {
            3
        } else {
            2
        }
    }

    fn fetch_word(&mut self, addr: usize) -> u16 {
        let word = self.pm.fetch_word(addr, self.read_from_mpm);
        self.read_from_mpm = false;
        word
    }

    /// One simulated clock cycle, in the fixed order from spec.md 5.
    pub fn tick(&mut self) {
        self.cycles += 1;

        // (1)+(2): peripherals observe the start-of-tick DM snapshot, then
        // mutate timer state and raise IRQ lines.
        let device: *const dyn DeviceVariant = &*self.device;
        unsafe {
            (*device).tick_timers(self);
            (*device).provide_irqs(self);
        }

        // (3): decode/execute, or consume one intermediate cycle.
        let pc = self.pc as usize;
        let word = self.fetch_word(pc);
        let next_word = if crate::memory::is_32bit(word) {
            self.pm.fetch_word(pc + 2, false)
        } else {
            0
        };
        match decode::decode(word, next_word) {
            Some(instruction) => {
                self.run(instruction);
            }
            None => {
                log::error!("unknown instruction word {word:#06x} at pc {pc:#x}");
                self.state = McuState::Stop;
            }
        }

        // (4): interrupt controller may inject a vector call.
        if self.state == McuState::Running && !self.in_mcinst {
            let pc_bytes = self.pc_bytes();
            let mut pc = self.pc;
            if self.interrupt.step(&mut self.dm, &mut pc, pc_bytes) {
                self.pc = pc;
                if self.interrupt.trap_at_isr {
                    self.state = McuState::Stopped;
                }
            }
        }

        // (5): VCD sampling is the embedder's responsibility -- it reads
        // `self.dm` between ticks, per spec.md 6.
    }

    fn run(&mut self, instruction: Instruction) {
        crate::exec::execute(self, instruction);
    }

    pub fn load_program(&mut self, base: usize, image: &[u8]) {
        self.pm.load_image(base, image);
    }
}

impl std::fmt::Debug for Mcu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mcu")
            .field("pc", &self.pc)
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .finish()
    }
}

pub fn config_error(msg: impl Into<String>) -> SimError {
    SimError::Config(msg.into())
}
