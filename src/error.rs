// Error kinds that actually cross a Result boundary. UnknownInstruction and
// IllegalOnDevice are McuState transitions, not errors -- see mcu::McuState.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("reserved fuse configuration: {0}")]
    Config(String),
    #[error("vcd sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
