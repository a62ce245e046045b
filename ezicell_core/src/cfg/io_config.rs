use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::io::EziIoManager;
use crate::trace::trace_helper::TraceHelper;
use super::{convert_data, serialize_data, ConfigError, IoConfigSource};

pub const DEFAULT_SLIDE_TIMEOUT_MS: u64 = 5000;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigMetadata
{
    pub version: String,
    pub last_updated: String
}

impl Default for ConfigMetadata
{
    fn default() -> Self
    {
        ConfigMetadata
        {
            version: "1.0".to_string(),
            last_updated: String::new()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct PinEntry
{
    pub pin: u32,
    pub name: String
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct IoPinList
{
    pub inputs: Vec<PinEntry>,
    pub outputs: Vec<PinEntry>
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EziIoDeviceConfig
{
    pub device_id: u32,
    pub name: String,
    #[serde(rename = "IP")]
    pub ip: String,
    pub input_count: u32,
    pub output_count: u32,
    pub io_config: IoPinList,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub clear_outputs_on_connect: bool
}

impl EziIoDeviceConfig
{
    fn pin_name(&self, is_input: bool, pin: u32) -> String
    {
        let pins = if is_input { &self.io_config.inputs } else { &self.io_config.outputs };
        match pins.iter().find(|p| p.pin == pin)
        {
            Some(entry) => entry.name.clone(),
            None if is_input => format!("Input{}", pin),
            None => format!("Output{}", pin)
        }
    }
}

/// A named pin on a named device, resolved by the pneumatic
/// manager against the device pin lists.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PinRef
{
    pub device_name: String,
    pub pin_name: String
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PneumaticSlideConfig
{
    pub name: String,
    pub timeout_ms: u64,
    pub output: PinRef,
    pub extended_input: PinRef,
    pub retracted_input: PinRef
}

impl Default for PneumaticSlideConfig
{
    fn default() -> Self
    {
        PneumaticSlideConfig
        {
            name: String::new(),
            timeout_ms: DEFAULT_SLIDE_TIMEOUT_MS,
            output: PinRef::default(),
            extended_input: PinRef::default(),
            retracted_input: PinRef::default()
        }
    }
}

/// # IoConfig
/// Device and slide configuration of one cell, as stored in
/// the JSON configuration file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct IoConfig
{
    pub metadata: ConfigMetadata,
    pub eziio: Vec<EziIoDeviceConfig>,
    pub pneumatic_slides: Vec<PneumaticSlideConfig>
}

impl IoConfig
{
    pub fn parse(data: &[u8]) -> Result<Self, ConfigError>
    {
        convert_data(data)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError>
    {
        let tracer = TraceHelper::new("CFG/IoConfig");
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| {
            tracer.error(format!("Failed to open config file {}: {}", path.display(), e));
            ConfigError::FileAccess(e.to_string())
        })?;

        let config = Self::parse(&data).map_err(|e| {
            tracer.error(format!("Failed to parse config file {}: {}", path.display(), e));
            e
        })?;

        tracer.trace(format!("Loaded {} devices and {} pneumatic slides from {}",
                             config.eziio.len(), config.pneumatic_slides.len(), path.display()));
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError>
    {
        let bytes = serialize_data(self)?;
        String::from_utf8(bytes).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Stamps lastUpdated with the current UTC time and writes
    /// the configuration as pretty printed JSON.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError>
    {
        self.metadata.last_updated = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let bytes = serialize_data(self)?;
        fs::write(path.as_ref(), bytes).map_err(|e| {
            TraceHelper::new("CFG/IoConfig").error(format!("Failed to write config file {}: {}", path.as_ref().display(), e));
            ConfigError::FileAccess(e.to_string())
        })
    }

    /// Registers every configured device with the manager.
    /// Stops at the first device that cannot be added.
    pub fn initialize_io_manager(&self, manager: &EziIoManager) -> Result<usize, ConfigError>
    {
        for device in self.eziio.iter()
        {
            let added = manager.add_device(device.device_id, &device.name, &device.ip, device.input_count, device.output_count)?;
            added.set_clear_outputs_on_connect(device.clear_outputs_on_connect);
        }
        Ok(self.eziio.len())
    }

    pub fn add_pneumatic_slide(&mut self, slide: PneumaticSlideConfig) -> Result<(), ConfigError>
    {
        if self.pneumatic_slides.iter().any(|s| s.name == slide.name)
        {
            return Err(ConfigError::DuplicateSlide(slide.name));
        }
        self.pneumatic_slides.push(slide);
        Ok(())
    }

    pub fn remove_pneumatic_slide(&mut self, name: &str) -> Result<(), ConfigError>
    {
        let before = self.pneumatic_slides.len();
        self.pneumatic_slides.retain(|s| s.name != name);
        if self.pneumatic_slides.len() == before
        {
            return Err(ConfigError::UnknownSlide(name.to_string()));
        }
        Ok(())
    }

    pub fn update_pneumatic_slide(&mut self, slide: PneumaticSlideConfig) -> Result<(), ConfigError>
    {
        match self.pneumatic_slides.iter_mut().find(|s| s.name == slide.name)
        {
            Some(existing) => {
                *existing = slide;
                Ok(())
            }
            None => Err(ConfigError::UnknownSlide(slide.name))
        }
    }

    pub fn device(&self, name: &str) -> Option<&EziIoDeviceConfig>
    {
        self.eziio.iter().find(|d| d.name == name)
    }

    /// Configured name of a pin, or a generic "Input<n>" /
    /// "Output<n>" if the pin has none.
    pub fn pin_name(&self, device_name: &str, is_input: bool, pin: u32) -> String
    {
        self.device(device_name)
            .map_or_else(|| "Unknown Pin".to_string(), |d| d.pin_name(is_input, pin))
    }
}

impl IoConfigSource for IoConfig
{
    fn eziio_devices(&self) -> &[EziIoDeviceConfig]
    {
        &self.eziio
    }

    fn pneumatic_slides(&self) -> &[PneumaticSlideConfig]
    {
        &self.pneumatic_slides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{IoError, SimulatedBus};
    use std::sync::Arc;

    const CELL_CONFIG: &str = r#"{
        "metadata": { "version": "1.2", "lastUpdated": "2025-01-01T00:00:00Z" },
        "eziio": [
            { "deviceId": 0, "name": "IOBottom", "IP": "192.168.0.3",
              "inputCount": 0, "outputCount": 16,
              "ioConfig": { "outputs": [ { "pin": 2, "name": "GripperValve" } ] } },
            { "deviceId": 1, "name": "IOTop", "IP": "192.168.0.2",
              "inputCount": 16, "outputCount": 8, "clearOutputsOnConnect": true,
              "ioConfig": { "inputs": [ { "pin": 0, "name": "GripperDown" },
                                        { "pin": 1, "name": "GripperUp" } ] } }
        ],
        "pneumaticSlides": [
            { "name": "Gripper",
              "output": { "deviceName": "IOBottom", "pinName": "GripperValve" },
              "extendedInput": { "deviceName": "IOTop", "pinName": "GripperDown" },
              "retractedInput": { "deviceName": "IOTop", "pinName": "GripperUp" } }
        ]
    }"#;

    fn make_config() -> IoConfig
    {
        IoConfig::parse(CELL_CONFIG.as_bytes()).expect("valid config")
    }

    fn make_slide(name: &str, timeout_ms: u64) -> PneumaticSlideConfig
    {
        PneumaticSlideConfig
        {
            name: name.to_string(),
            timeout_ms,
            ..PneumaticSlideConfig::default()
        }
    }

    #[test]
    fn parses_devices_and_slides()
    {
        let config = make_config();
        assert_eq!("1.2", config.metadata.version);
        assert_eq!(2, config.eziio_devices().len());
        assert_eq!("192.168.0.3", config.eziio[0].ip);
        assert!(config.eziio[1].clear_outputs_on_connect);
        assert!(!config.eziio[0].clear_outputs_on_connect);

        let slide = &config.pneumatic_slides()[0];
        assert_eq!(DEFAULT_SLIDE_TIMEOUT_MS, slide.timeout_ms);
        assert_eq!("GripperUp", slide.retracted_input.pin_name);
    }

    #[test]
    fn missing_sections_take_defaults()
    {
        let config = IoConfig::parse(b"{}").expect("empty config");
        assert_eq!("1.0", config.metadata.version);
        assert!(config.eziio.is_empty());
        assert!(config.pneumatic_slides.is_empty());
    }

    #[test]
    fn pin_names_fall_back_to_generic_names()
    {
        let config = make_config();
        assert_eq!("GripperValve", config.pin_name("IOBottom", false, 2));
        assert_eq!("Output3", config.pin_name("IOBottom", false, 3));
        assert_eq!("GripperDown", config.pin_name("IOTop", true, 0));
        assert_eq!("Input7", config.pin_name("IOTop", true, 7));
        assert_eq!("Unknown Pin", config.pin_name("Nowhere", true, 0));
    }

    #[test]
    fn slides_can_be_added_updated_and_removed()
    {
        let mut config = make_config();
        assert_eq!(Ok(()), config.add_pneumatic_slide(make_slide("Pusher", 2000)));
        assert_eq!(Err(ConfigError::DuplicateSlide("Pusher".to_string())), config.add_pneumatic_slide(make_slide("Pusher", 1)));

        assert_eq!(Ok(()), config.update_pneumatic_slide(make_slide("Pusher", 3000)));
        assert_eq!(3000, config.pneumatic_slides[1].timeout_ms);
        assert_eq!(Err(ConfigError::UnknownSlide("Lift".to_string())), config.update_pneumatic_slide(make_slide("Lift", 1)));

        assert_eq!(Ok(()), config.remove_pneumatic_slide("Pusher"));
        assert_eq!(Err(ConfigError::UnknownSlide("Pusher".to_string())), config.remove_pneumatic_slide("Pusher"));
        assert_eq!(1, config.pneumatic_slides.len());
    }

    #[test]
    fn save_and_load_keep_content_and_stamp_time()
    {
        let path = std::env::temp_dir().join(format!("ezicell_cfg_{}.json", std::process::id()));
        let mut config = make_config();
        config.save(&path).expect("save");

        let loaded = IoConfig::load(&path).expect("load");
        let _ = fs::remove_file(&path);

        assert_eq!(config, loaded);
        assert_ne!("2025-01-01T00:00:00Z", loaded.metadata.last_updated);
        assert!(chrono::NaiveDateTime::parse_from_str(&loaded.metadata.last_updated, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn load_of_missing_file_fails()
    {
        let result = IoConfig::load("/nonexistent/ezicell/config.json");
        assert!(matches!(result, Err(ConfigError::FileAccess(_))));
    }

    #[test]
    fn to_json_uses_file_keys()
    {
        let json = make_config().to_json().expect("json");
        assert!(json.contains("\"IP\""));
        assert!(json.contains("\"pneumaticSlides\""));
        assert!(json.contains("\"timeoutMs\": 5000"));
    }

    #[test]
    fn initialize_io_manager_registers_devices()
    {
        let manager = EziIoManager::new(Arc::new(SimulatedBus::new()));
        let config = make_config();
        assert_eq!(Ok(2), config.initialize_io_manager(&manager));

        let top = manager.get_device_by_name("IOTop").expect("device");
        assert!(top.clear_outputs_on_connect());
        assert_eq!(8, top.output_count());
    }

    #[test]
    fn initialize_io_manager_stops_at_first_failure()
    {
        let manager = EziIoManager::new(Arc::new(SimulatedBus::new()));
        let mut config = make_config();
        config.eziio[0].ip = "bogus".to_string();

        assert_eq!(Err(ConfigError::Device(IoError::InvalidAddress(0))), config.initialize_io_manager(&manager));
        assert!(manager.devices().is_empty());
    }
}
