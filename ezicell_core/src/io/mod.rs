use std::fmt;
use ezicell_hal::iobus::BusCode;

pub mod device;
pub mod manager;
pub mod sim;

pub use device::EziIoDevice;
pub use manager::EziIoManager;
pub use sim::SimulatedBus;

/// Output bits of modules with up to 8 outputs start at bit 8,
/// those of larger modules at bit 16.
pub const OUTPUT_PIN_MASKS_8: [u32; 8] = [
    0x100, 0x200, 0x400, 0x800,
    0x1000, 0x2000, 0x4000, 0x8000
];

pub const OUTPUT_PIN_MASKS_16: [u32; 16] = [
    0x10000, 0x20000, 0x40000, 0x80000,
    0x100000, 0x200000, 0x400000, 0x800000,
    0x1000000, 0x2000000, 0x4000000, 0x8000000,
    0x10000000, 0x20000000, 0x40000000, 0x80000000
];

/// Inputs are reported one bit per pin, starting at bit 0.
pub fn input_pin_mask(pin: u32) -> Option<u32>
{
    1u32.checked_shl(pin)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputStatus
{
    pub inputs: u32,
    pub latch: u32
}

impl InputStatus
{
    pub fn is_on(&self, pin: u32) -> bool
    {
        input_pin_mask(pin).map_or(false, |mask| self.inputs & mask != 0)
    }

    pub fn is_latched(&self, pin: u32) -> bool
    {
        input_pin_mask(pin).map_or(false, |mask| self.latch & mask != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputStatus
{
    pub outputs: u32,
    pub status: u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError
{
    UnknownDevice(u32),
    DuplicateDevice(u32),
    InvalidAddress(u32),
    ConnectFailed(u32),
    NotConnected(u32),
    InvalidPin(u32, u32),
    UnsupportedOutputCount(u32, u32),
    Bus(u32, BusCode)
}

impl fmt::Display for IoError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            IoError::UnknownDevice(id) => write!(f, "device with ID {} not found", id),
            IoError::DuplicateDevice(id) => write!(f, "device with ID {} already exists", id),
            IoError::InvalidAddress(id) => write!(f, "device {} has an invalid IP address", id),
            IoError::ConnectFailed(id) => write!(f, "failed to connect to device {}", id),
            IoError::NotConnected(id) => write!(f, "device {} not connected", id),
            IoError::InvalidPin(id, pin) => write!(f, "pin {} out of range on device {}", pin, id),
            IoError::UnsupportedOutputCount(id, count) => write!(f, "device {} has {} outputs, at most 16 are supported", id, count),
            IoError::Bus(id, code) => write!(f, "bus call for device {} failed, error code: {}", id, code)
        }
    }
}

impl std::error::Error for IoError {}
