// ATmega328P fuse/bootloader/clock-source decode (spec.md 4.9) and the
// device's timer-to-interrupt wiring (spec.md 4.8's `provide_irqs` slot).

use super::{Bootloader, ClockSource, DeviceVariant, FuseConfig};
use crate::error::SimError;
use crate::mcu::Mcu;
use crate::timer::{OCF0A, OCF0B, TOV0};

pub const TIMER0_COMPA_IRQ: usize = 14;
pub const TIMER0_COMPB_IRQ: usize = 15;
pub const TIMER0_OVF_IRQ: usize = 16;

pub struct Atmega328p;

impl DeviceVariant for Atmega328p {
    fn name(&self) -> &'static str {
        "ATmega328P"
    }

    fn regs(&self) -> usize {
        32
    }

    fn io_regs(&self) -> usize {
        224
    }

    fn sfr_off(&self) -> usize {
        32
    }

    fn pc_bits(&self) -> u8 {
        16
    }

    fn reduced_core(&self) -> bool {
        false
    }

    fn xmega(&self) -> bool {
        false
    }

    fn vector_stride(&self) -> u16 {
        2
    }

    fn set_fuse(&self, fuses: &[u8; 6]) -> Result<FuseConfig, SimError> {
        let low = fuses[0];
        let high = fuses[1];

        let cksel = low & 0x0f;
        let (clk_source, freq) = match cksel {
            0 => (ClockSource::ExternalClock, 0),
            1 => {
                return Err(SimError::Config(
                    "CKSEL=1 is a reserved fuse configuration on ATmega328P".into(),
                ))
            }
            2 => (ClockSource::InternalCalibratedRc8MHz, 8_000_000),
            3 => (ClockSource::Internal128kHzRc, 128_000),
            4 | 5 => (ClockSource::ExternalLowFreqCrystal, 32_768),
            6 | 7 => (ClockSource::FullSwingCrystal, 20_000_000),
            8..=15 => {
                let freq = match cksel & 0x0e {
                    8 => 900_000,
                    10 => 3_000_000,
                    12 => 8_000_000,
                    14 => 16_000_000,
                    _ => {
                        return Err(SimError::Config(format!(
                            "CKSEL={cksel:#x} is a reserved low-power-crystal fuse range"
                        )))
                    }
                };
                (ClockSource::LowPowerCrystal, freq)
            }
            _ => unreachable!(),
        };

        let bootsz = (high >> 1) & 0x03;
        let size = match bootsz {
            3 => 512,
            2 => 1024,
            1 => 2048,
            0 => 4096,
            _ => unreachable!(),
        };
        let end = 0x7fff;
        let start = end + 1 - size;
        let bootrst = high & 0x01;
        let reset_vector = if bootrst == 1 { 0x0000 } else { start as u32 };

        Ok(FuseConfig {
            clk_source,
            freq,
            bootloader: Bootloader { start, end, size },
            reset_vector,
        })
    }

    fn tick_timers(&self, mcu: &mut Mcu) {
        let pind = mcu.dm.read(mcu.timer0.portd);
        mcu.timer0.tick(&mut mcu.dm, pind);
    }

    fn provide_irqs(&self, mcu: &mut Mcu) {
        // The TIFR bit is only cleared once the interrupt controller
        // actually dispatches this IRQ (spec.md 4.8), not just because it
        // was seen pending here -- a polling program with I=0 must still
        // see it set.
        let tifr0 = mcu.timer0.tifr0;
        let (tov0, ocf0a, ocf0b) = mcu.timer0.pending_irqs(&mcu.dm);
        if tov0 {
            mcu.interrupt.raise_with_clear(TIMER0_OVF_IRQ, tifr0, TOV0);
        }
        if ocf0a {
            mcu.interrupt.raise_with_clear(TIMER0_COMPA_IRQ, tifr0, OCF0A);
        }
        if ocf0b {
            mcu.interrupt.raise_with_clear(TIMER0_COMPB_IRQ, tifr0, OCF0B);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cksel_one_is_rejected() {
        let fuses = [0xe1u8, 0xd9, 0xff, 0, 0, 0];
        assert!(matches!(Atmega328p.set_fuse(&fuses), Err(SimError::Config(_))));
    }

    #[test]
    fn default_fuses_give_internal_8mhz_and_bootrst_at_bootloader() {
        // Factory-default ATmega328P fuses: low=0x62, high=0xD9.
        let fuses = [0x62u8, 0xd9, 0xff, 0, 0, 0];
        let cfg = Atmega328p.set_fuse(&fuses).unwrap();
        assert_eq!(cfg.clk_source, ClockSource::InternalCalibratedRc8MHz);
        assert_eq!(cfg.freq, 8_000_000);
        assert_eq!(cfg.bootloader.size, 4096);
        assert_eq!(cfg.bootloader.end, 0x7fff);
        assert_eq!(cfg.reset_vector, 0x0000);
    }
}
