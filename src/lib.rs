// avrsim: cycle-accurate AVR 8-bit microcontroller simulator core.
//
// A handful of small, single-purpose modules wired together here, with the
// aggregate type (`Mcu`) as the public entry point. This library does not
// parse firmware file formats, start a GDB stub, or drive a UI: those are
// the embedder's job, per spec.md 1.

mod conversions;
mod decode;
pub mod device;
mod error;
mod exec;
mod instructions;
mod interrupt;
mod mcinst;
pub mod mcu;
mod memory;
pub mod script;
mod sreg;
mod timer;
pub mod vcd;

pub use device::{Atmega328p, DeviceVariant};
pub use error::{SimError, SimResult};
pub use instructions::Instruction;
pub use mcu::{DeviceConfig, Mcu, McuState};
pub use script::ScriptMemory;
pub use vcd::{TextVcdSink, VcdSink};
