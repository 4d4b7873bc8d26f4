// Peripheral scripting callback surface (spec.md 6). A user-defined
// peripheral is a `tick(mcu)` entry point plus the handful of memory-access
// primitives it's allowed to use; `Mcu` implements them directly so a
// scripting host gets exactly the core's own primitives and no more.

use crate::mcu::{McuState, Mcu};

pub trait ScriptMemory {
    fn read_reg(&self, index: usize) -> u8;
    fn write_reg(&mut self, index: usize, value: u8);

    /// `io_reg` is the I/O-space offset; the core adds `sfr_off` itself.
    fn read_io(&self, io_reg: usize) -> u8;
    fn write_io(&mut self, io_reg: usize, value: u8);

    /// `addr` is an absolute DM index, so this reaches a GP register or an
    /// I/O register alike -- callers pass `index` or `sfr_off + io_reg`.
    fn read_bit(&self, addr: usize, bit: u8) -> bool;
    fn write_bit(&mut self, addr: usize, bit: u8, value: bool);

    fn freq(&self) -> u32;
    fn request_stop(&mut self);
    fn request_test_fail(&mut self);
    fn log(&self, message: &str);
}

impl ScriptMemory for Mcu {
    fn read_reg(&self, index: usize) -> u8 {
        self.dm.read(index)
    }

    fn write_reg(&mut self, index: usize, value: u8) {
        self.dm.write(index, value);
    }

    fn read_io(&self, io_reg: usize) -> u8 {
        self.dm.read(self.dm.io_addr(io_reg))
    }

    fn write_io(&mut self, io_reg: usize, value: u8) {
        let addr = self.dm.io_addr(io_reg);
        self.dm.write(addr, value);
    }

    fn read_bit(&self, addr: usize, bit: u8) -> bool {
        crate::conversions::bit(self.dm.read(addr), bit)
    }

    fn write_bit(&mut self, addr: usize, bit: u8, value: bool) {
        let mut byte = self.dm.read(addr);
        if value {
            byte |= 1 << bit;
        } else {
            byte &= !(1 << bit);
        }
        self.dm.write(addr, byte);
    }

    fn freq(&self) -> u32 {
        self.freq
    }

    fn request_stop(&mut self) {
        self.state = McuState::Stop;
    }

    fn request_test_fail(&mut self) {
        self.state = McuState::TestFail;
    }

    fn log(&self, message: &str) {
        log::info!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Atmega328p;
    use crate::mcu::DeviceConfig;

    fn test_mcu() -> Mcu {
        let config = DeviceConfig {
            firmware: vec![0, 0],
            firmware_base: 0,
            pm_size: 0x8000,
            dm_size: 0x900,
            ramstart: 0x100,
            ramend: 0x8ff,
            flashstart: 0,
            flashend: 0x7fff,
            spm_pagesize: 128,
            fuses: [0x62, 0xd9, 0xff, 0, 0, 0],
            lock: 0xff,
        };
        Mcu::new(Box::new(Atmega328p), config).unwrap()
    }

    #[test]
    fn reg_round_trips_through_the_script_surface() {
        let mut mcu = test_mcu();
        mcu.write_reg(5, 0x42);
        assert_eq!(mcu.read_reg(5), 0x42);
    }

    #[test]
    fn io_offset_reaches_the_same_byte_as_a_raw_dm_write() {
        let mut mcu = test_mcu();
        mcu.write_io(0x25, 0x01); // TCCR0B
        assert_eq!(mcu.dm.read(mcu.dm.io_addr(0x25)), 0x01);
        assert_eq!(ScriptMemory::read_io(&mcu, 0x25), 0x01);
    }

    #[test]
    fn bit_helpers_flip_a_single_bit_without_disturbing_the_rest() {
        let mut mcu = test_mcu();
        mcu.write_reg(0, 0b0000_0000);
        mcu.write_bit(0, 3, true);
        assert_eq!(mcu.read_reg(0), 0b0000_1000);
        assert!(mcu.read_bit(0, 3));
        mcu.write_bit(0, 3, false);
        assert_eq!(mcu.read_reg(0), 0);
    }

    #[test]
    fn request_stop_and_test_fail_set_mcu_state() {
        let mut mcu = test_mcu();
        mcu.request_test_fail();
        assert_eq!(mcu.state, McuState::TestFail);
        mcu.request_stop();
        assert_eq!(mcu.state, McuState::Stop);
    }

    #[test]
    fn freq_reflects_the_fuse_derived_clock() {
        let mcu = test_mcu();
        assert_eq!(ScriptMemory::freq(&mcu), mcu.freq);
    }
}
