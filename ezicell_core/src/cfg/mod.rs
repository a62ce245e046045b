use std::fmt;
use serde::{Serialize, de::DeserializeOwned};

use crate::io::IoError;

pub mod io_config;

pub use io_config::{ConfigMetadata, EziIoDeviceConfig, IoConfig, IoPinList, PinEntry, PinRef, PneumaticSlideConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError
{
    FileAccess(String),
    Parse(String),
    Serialize(String),
    DuplicateSlide(String),
    UnknownSlide(String),
    Device(IoError)
}

impl fmt::Display for ConfigError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            ConfigError::FileAccess(msg) => write!(f, "cannot access configuration file: {}", msg),
            ConfigError::Parse(msg) => write!(f, "cannot parse configuration: {}", msg),
            ConfigError::Serialize(msg) => write!(f, "cannot serialize configuration: {}", msg),
            ConfigError::DuplicateSlide(name) => write!(f, "pneumatic slide {} already exists", name),
            ConfigError::UnknownSlide(name) => write!(f, "pneumatic slide {} not found", name),
            ConfigError::Device(e) => write!(f, "device setup failed: {}", e)
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<IoError> for ConfigError
{
    fn from(e: IoError) -> Self
    {
        ConfigError::Device(e)
    }
}

/// Read only view of a configuration, as consumed by the
/// pneumatic layer.
pub trait IoConfigSource
{
    fn eziio_devices(&self) -> &[EziIoDeviceConfig];
    fn pneumatic_slides(&self) -> &[PneumaticSlideConfig];
}

pub fn convert_data<T: DeserializeOwned>(r: &[u8]) -> Result<T, ConfigError>
{
    serde_json::from_slice(r).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn serialize_data<T: Serialize>(data: &T) -> Result<Vec<u8>, ConfigError>
{
    serde_json::to_vec_pretty(data).map_err(|e| ConfigError::Serialize(e.to_string()))
}
