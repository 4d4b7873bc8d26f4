// Interrupt controller (spec.md 4.8). Owns the pending-IRQ table and the
// vector-selection/dispatch logic; the MCU aggregate calls `step` once per
// retired instruction, after the executor has run.

use crate::memory::DataSpace;
use crate::sreg::{read_flag, set_flag, SregFlag};

pub const MAX_IRQS: usize = 64;

pub struct InterruptController {
    pub irq: [bool; MAX_IRQS],
    /// TIFR-style {io address, bitmask} to clear when this IRQ is actually
    /// dispatched (spec.md 4.8 treats `irq[i]` as the same flag software
    /// polls in TIFR; it must only disappear when the ISR is entered, not
    /// merely because it was pending this tick).
    tifr_clear: [Option<(usize, u8)>; MAX_IRQS],
    pub ivt_base: u32,
    /// Bytes between consecutive vector-table entries: 2 on devices whose
    /// vectors are a single RJMP word, 4 on devices with extended (JMP)
    /// vectors (spec.md 4.8; scenario E pins the ATmega328P value of 2).
    pub vector_stride: u16,
    /// Granted by RETI: the main program gets one instruction before IRQs
    /// are re-checked (spec.md 4.6, 4.8).
    pub exec_main: bool,
    /// When set, entering any ISR additionally transitions state to
    /// Stopped (spec.md 4.8).
    pub trap_at_isr: bool,
}

impl InterruptController {
    pub fn new(ivt_base: u32, vector_stride: u16) -> Self {
        InterruptController {
            irq: [false; MAX_IRQS],
            tifr_clear: [None; MAX_IRQS],
            ivt_base,
            vector_stride,
            exec_main: false,
            trap_at_isr: false,
        }
    }

    pub fn raise(&mut self, index: usize) {
        self.irq[index] = true;
    }

    /// Like `raise`, but also records the TIFR flag location that should
    /// clear at the moment this IRQ is dispatched (not before).
    pub fn raise_with_clear(&mut self, index: usize, tifr_addr: usize, bit: u8) {
        self.irq[index] = true;
        self.tifr_clear[index] = Some((tifr_addr, bit));
    }

    /// One controller evaluation after an instruction retires (spec.md
    /// 4.8). Returns `Some(entered_isr)` when a vector was taken, `None`
    /// otherwise. `pc_bytes` is 2 or 3 depending on `pc_bits`.
    pub fn step(&mut self, dm: &mut DataSpace, pc: &mut u32, pc_bytes: u8) -> bool {
        if self.exec_main {
            self.exec_main = false;
            return false;
        }
        let sreg = dm.sreg();
        if !read_flag(sreg, SregFlag::I) {
            return false;
        }
        let selected = self.irq.iter().position(|&pending| pending);
        let index = match selected {
            Some(i) => i,
            None => return false,
        };
        dm.push_pc(*pc, pc_bytes);
        let mut sreg = dm.sreg();
        set_flag(&mut sreg, SregFlag::I, false);
        dm.set_sreg(sreg);
        self.irq[index] = false;
        if let Some((addr, bit)) = self.tifr_clear[index].take() {
            let flags = dm.read(addr);
            dm.write(addr, flags & !bit);
        }
        *pc = self.ivt_base + (index as u32) * (self.vector_stride as u32);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_pending_index_wins() {
        let mut ctl = InterruptController::new(0, 2);
        ctl.raise(5);
        ctl.raise(2);
        let mut dm = DataSpace::new(0x900, 0x20, 0x100, 0x8ff);
        dm.set_sp(0x08ff);
        let mut sreg = 0u8;
        set_flag(&mut sreg, SregFlag::I, true);
        dm.set_sreg(sreg);
        let mut pc = 0x100;
        assert!(ctl.step(&mut dm, &mut pc, 2));
        assert_eq!(pc, 2 * 2); // index 2, stride 2 bytes
        assert!(!ctl.irq[2]);
        assert!(ctl.irq[5]);
        assert!(!read_flag(dm.sreg(), SregFlag::I));
    }

    #[test]
    fn exec_main_suppresses_one_check() {
        let mut ctl = InterruptController::new(0, 2);
        ctl.raise(0);
        ctl.exec_main = true;
        let mut dm = DataSpace::new(0x900, 0x20, 0x100, 0x8ff);
        let mut sreg = 0u8;
        set_flag(&mut sreg, SregFlag::I, true);
        dm.set_sreg(sreg);
        let mut pc = 0;
        assert!(!ctl.step(&mut dm, &mut pc, 2));
        assert!(ctl.irq[0]); // still pending, will fire next time
    }

    #[test]
    fn disabled_global_interrupt_blocks_dispatch() {
        let mut ctl = InterruptController::new(0, 2);
        ctl.raise(0);
        let mut dm = DataSpace::new(0x900, 0x20, 0x100, 0x8ff);
        let mut pc = 0;
        assert!(!ctl.step(&mut dm, &mut pc, 2));
    }
}
