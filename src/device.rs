// Device dispatch (spec.md 3, 9). The source holds four function-pointer
// slots (`set_fuse`, `set_lock`, `tick_timers`, `provide_irqs`) selected once
// at initialization. Re-expressed per spec.md 9's re-architecture note as a
// capability trait: one implementation per supported variant, picked once
// and boxed into the MCU aggregate. Per-peripheral *state* (the timer's
// counters) still lives on `Mcu` itself, not on the variant -- the variant
// is stateless behavior, not storage.

use crate::error::SimError;
use crate::mcu::Mcu;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    ExternalClock,
    InternalCalibratedRc8MHz,
    Internal128kHzRc,
    ExternalLowFreqCrystal,
    FullSwingCrystal,
    LowPowerCrystal,
}

#[derive(Debug, Clone, Copy)]
pub struct Bootloader {
    pub start: usize,
    pub end: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FuseConfig {
    pub clk_source: ClockSource,
    pub freq: u32,
    pub bootloader: Bootloader,
    pub reset_vector: u32,
}

/// Capability interface satisfied by each supported device variant
/// (spec.md 9's re-architected function-pointer dispatch).
pub trait DeviceVariant {
    fn name(&self) -> &'static str;
    fn regs(&self) -> usize;
    fn io_regs(&self) -> usize;
    fn sfr_off(&self) -> usize;
    fn pc_bits(&self) -> u8;
    fn reduced_core(&self) -> bool;
    fn xmega(&self) -> bool;
    /// Words per interrupt-vector-table entry: 2 for most AVRs, 4 on
    /// devices with extended vectors (spec.md 4.8).
    fn vector_stride(&self) -> u16;

    /// Decode the 6 fuse bytes into clock source, frequency, bootloader
    /// section and reset vector (spec.md 4.9). Returns SimError::Config on
    /// a reserved fuse combination; the MCU never starts in that case.
    fn set_fuse(&self, fuses: &[u8; 6]) -> Result<FuseConfig, SimError>;

    /// Lock bits are a pass-through record today (spec.md 4.10): no
    /// write-protection enforcement is modeled, only storage of the
    /// configured byte for observability.
    fn set_lock(&self, lock: u8) -> u8 {
        lock
    }

    /// Advance this device's peripherals by one tick (spec.md 5 step 2).
    fn tick_timers(&self, mcu: &mut Mcu);

    /// Translate peripheral-internal flag registers into the interrupt
    /// controller's pending-IRQ table, gated by their enable bits
    /// (spec.md 4.8's `irq[i]` inputs).
    fn provide_irqs(&self, mcu: &mut Mcu);
}

pub mod atmega328p;
pub use atmega328p::Atmega328p;
