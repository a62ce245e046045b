use ezicell_core::cfg::PinRef;

/// A logical pin, named by device and pin name, together with
/// the device id and pin number it resolved to. Both stay None
/// until the pneumatic manager resolves the names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IoPinConfig
{
    pub device_name: String,
    pub pin_name: String,
    pub device_id: Option<u32>,
    pub pin_number: Option<u32>
}

impl IoPinConfig
{
    pub fn new(device_name: &str, pin_name: &str) -> Self
    {
        IoPinConfig
        {
            device_name: device_name.to_string(),
            pin_name: pin_name.to_string(),
            device_id: None,
            pin_number: None
        }
    }

    pub fn resolved(device_name: &str, pin_name: &str, device_id: u32, pin_number: u32) -> Self
    {
        IoPinConfig
        {
            device_id: Some(device_id),
            pin_number: Some(pin_number),
            ..IoPinConfig::new(device_name, pin_name)
        }
    }

    /// (device id, pin number) if both are resolved.
    pub fn address(&self) -> Option<(u32, u32)>
    {
        Some((self.device_id?, self.pin_number?))
    }

    pub fn is_resolved(&self) -> bool
    {
        self.address().is_some()
    }
}

impl From<&PinRef> for IoPinConfig
{
    fn from(pin: &PinRef) -> Self
    {
        IoPinConfig::new(&pin.device_name, &pin.pin_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_is_unresolved()
    {
        let config = IoPinConfig::new("IOTop", "GripperDown");
        assert!(!config.is_resolved());
        assert_eq!(None, config.address());
    }

    #[test]
    fn half_resolved_config_has_no_address()
    {
        let mut config = IoPinConfig::new("IOTop", "GripperDown");
        config.device_id = Some(1);
        assert_eq!(None, config.address());
        config.pin_number = Some(4);
        assert_eq!(Some((1, 4)), config.address());
    }
}
