// End-to-end scenarios driven entirely through the public `Mcu` surface --
// black-box tests that run a whole program through, against a handful of
// hand-assembled instruction words.

use avrsim::device::Atmega328p;
use avrsim::mcu::{DeviceConfig, McuState};
use avrsim::Mcu;

fn build_mcu(firmware: Vec<u8>) -> Mcu {
    let config = DeviceConfig {
        firmware,
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
fn spm_fill_then_write_stages_a_word_into_flash() {
    let mut mcu = build_mcu(vec![0xe8, 0x95, 0xe8, 0x95]); // two SPM words back to back
    let spmcsr = mcu.dm.io_addr(0x37);

    mcu.dm.write(30, 0x10); // Zl
    mcu.dm.write(31, 0x00); // Zh -> Z = 0x0010
    mcu.dm.write(0, 0xab); // R0
    mcu.dm.write(1, 0xcd); // R1
    mcu.dm.write(spmcsr, 0x01); // SPMEN alone -> stage into the page buffer
    mcu.tick();
    assert_eq!(mcu.pc, 2);
    assert_eq!(mcu.dm.read(spmcsr), 0);

    mcu.dm.write(spmcsr, 0x04); // PGWRT -> commit the staged page
    mcu.tick();
    assert_eq!(mcu.pm.read_byte(0x10), 0xab);
    assert_eq!(mcu.pm.read_byte(0x11), 0xcd);
}

#[test]
fn spm_erase_clears_the_whole_page() {
    let mut mcu = build_mcu(vec![0xe8, 0x95]);
    mcu.pm.write_byte(128, 0x55);
    mcu.pm.write_byte(200, 0x66);

    let spmcsr = mcu.dm.io_addr(0x37);
    mcu.dm.write(spmcsr, 0x02); // PGERS
    mcu.dm.write(30, 0x80); // Zl = 128
    mcu.dm.write(31, 0x00);
    mcu.tick();

    assert_eq!(mcu.pm.read_byte(128), 0xff);
    assert_eq!(mcu.pm.read_byte(200), 0xff);
    assert_eq!(mcu.dm.read(spmcsr), 0);
}

#[test]
fn xch_swaps_register_and_memory_at_z() {
    let mut mcu = build_mcu(vec![0x04, 0x93]); // XCH R16, Z
    mcu.dm.write(30, 0x50); // Zl
    mcu.dm.write(31, 0x01); // Zh -> Z = 0x0150, inside SRAM
    mcu.dm.write(0x150, 0x0f);
    mcu.dm.write(16, 0xf0);
    mcu.tick();
    assert_eq!(mcu.dm.read(0x150), 0xf0);
    assert_eq!(mcu.dm.read(16), 0x0f);
}

#[test]
fn las_ors_memory_with_the_register_and_returns_the_old_value() {
    let mut mcu = build_mcu(vec![0x05, 0x93]); // LAS R16, Z
    mcu.dm.write(30, 0x50);
    mcu.dm.write(31, 0x01);
    mcu.dm.write(0x150, 0x0f);
    mcu.dm.write(16, 0xf0);
    mcu.tick();
    assert_eq!(mcu.dm.read(0x150), 0xff);
    assert_eq!(mcu.dm.read(16), 0x0f);
}

#[test]
fn eijmp_without_eind_traps_to_test_fail() {
    let mut mcu = build_mcu(vec![0x19, 0x94]); // EIJMP
    mcu.tick();
    mcu.tick();
    assert_eq!(mcu.state, McuState::TestFail);
    assert_eq!(mcu.pc, 2);
}

#[test]
fn eicall_without_eind_traps_to_test_fail() {
    let mut mcu = build_mcu(vec![0x19, 0x95]); // EICALL
    for _ in 0..4 {
        mcu.tick();
    }
    assert_eq!(mcu.state, McuState::TestFail);
}

#[test]
fn elpm_without_rampz_traps_to_test_fail() {
    let mut mcu = build_mcu(vec![0x06, 0x90]); // ELPM R0, Z
    for _ in 0..3 {
        mcu.tick();
    }
    assert_eq!(mcu.state, McuState::TestFail);
}

#[test]
fn break_stops_the_mcu() {
    let mut mcu = build_mcu(vec![0x98, 0x95]); // BREAK
    mcu.tick();
    assert_eq!(mcu.state, McuState::Stopped);
    assert_eq!(mcu.pc, 2);
}

#[test]
fn timer_overflow_dispatches_to_its_vector_when_enabled() {
    // Scenario E, carried through a real tick: CS0=1 (no prescale), TCNT0
    // already at 0xFF so the very next tick wraps and sets TOV0; TIMSK0's
    // TOIE0 is set and global interrupts are on, so the controller should
    // take the TIMER0_OVF vector (index 16, stride 2 -> address 0x20)
    // before the firmware's own first instruction ever retires.
    let mut mcu = build_mcu(vec![0; 0x40]); // all-NOP program
    mcu.dm.set_sp(0x08ff);
    mcu.dm.set_sreg(0x80); // I flag only

    let tccr0b = mcu.dm.io_addr(0x25);
    let tcnt0 = mcu.dm.io_addr(0x26);
    let timsk0 = mcu.dm.io_addr(0x6e);
    mcu.dm.write(tccr0b, 0x01);
    mcu.dm.write(tcnt0, 0xff);
    mcu.dm.write(timsk0, 0x01);

    mcu.tick();

    assert_eq!(mcu.pc, 0x20);
    assert_eq!(mcu.dm.read(0x08ff), 0x02); // return PC (2) pushed, low byte first
    assert!(mcu.dm.sreg() & 0x80 == 0); // I cleared on entry
}

#[test]
fn disabled_global_interrupt_lets_the_main_program_run() {
    let mut mcu = build_mcu(vec![0; 0x40]);
    mcu.dm.set_sreg(0x00);

    let tccr0b = mcu.dm.io_addr(0x25);
    let tcnt0 = mcu.dm.io_addr(0x26);
    let timsk0 = mcu.dm.io_addr(0x6e);
    let tifr0 = mcu.dm.io_addr(0x15);
    mcu.dm.write(tccr0b, 0x01);
    mcu.dm.write(tcnt0, 0xff);
    mcu.dm.write(timsk0, 0x01);

    mcu.tick();

    assert_eq!(mcu.pc, 2); // NOP retired normally, no vector taken
    // TOV0 is still pending: the ISR never ran, so a program polling TIFR0
    // directly must still see the overflow.
    assert_eq!(mcu.dm.read(tifr0) & 0x01, 0x01);
}
