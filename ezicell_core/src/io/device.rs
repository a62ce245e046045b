use std::net::Ipv4Addr;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::{thread, time::Duration};

use ezicell_hal::iobus::IoBus;

use crate::core::shareable::Shareable;
use crate::trace::trace_helper::TraceHelper;
use super::{InputStatus, IoError, OutputStatus, OUTPUT_PIN_MASKS_16, OUTPUT_PIN_MASKS_8};

/// Time the module needs before a written output reads back.
const OUTPUT_SETTLE_TIME_MS: u64 = 50;
/// Delay between connect and the initial output clear.
const CONNECT_CLEAR_DELAY_MS: u64 = 100;

#[derive(Default)]
struct CachedStatus
{
    inputs: InputStatus,
    outputs: OutputStatus,
    updated: bool
}

/// # EziIoDevice
/// One EziIO module on the bus. Besides forwarding to the
/// bus, the device keeps the last state read from the module,
/// so readers (UI, slide polling) never have to wait on the
/// network.
///
/// The cache is only as fresh as the last successful read,
/// either explicit or done by the manager's polling thread.
pub struct EziIoDevice
{
    id: u32,
    name: String,
    ip_address: String,
    ip_bytes: [u8; 4],
    input_count: u32,
    output_count: u32,
    output_masks: &'static [u32],
    connected: AtomicBool,
    clear_outputs_on_connect: AtomicBool,
    status: Shareable<CachedStatus>,
    bus: Arc<dyn IoBus>,
    tracer: TraceHelper
}

impl EziIoDevice
{
    pub fn new(id: u32, name: &str, ip: &str, input_count: u32, output_count: u32, bus: Arc<dyn IoBus>) -> Result<Self, IoError>
    {
        let ip_bytes = ip.trim()
                         .parse::<Ipv4Addr>()
                         .map_err(|_| IoError::InvalidAddress(id))?
                         .octets();

        if output_count as usize > OUTPUT_PIN_MASKS_16.len()
        {
            return Err(IoError::UnsupportedOutputCount(id, output_count));
        }

        let output_masks: &'static [u32] = if output_count <= 8 { &OUTPUT_PIN_MASKS_8 } else { &OUTPUT_PIN_MASKS_16 };

        Ok(EziIoDevice
        {
            id,
            name: name.to_string(),
            ip_address: ip.to_string(),
            ip_bytes,
            input_count,
            output_count,
            output_masks,
            connected: AtomicBool::new(false),
            clear_outputs_on_connect: AtomicBool::new(false),
            status: Shareable::new(CachedStatus::default()),
            bus,
            tracer: TraceHelper::new(&format!("IO/EziIoDevice/{}", name))
        })
    }

    pub fn id(&self) -> u32 { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn ip_address(&self) -> &str { &self.ip_address }
    pub fn ip_bytes(&self) -> [u8; 4] { self.ip_bytes }
    pub fn input_count(&self) -> u32 { self.input_count }
    pub fn output_count(&self) -> u32 { self.output_count }

    pub fn is_connected(&self) -> bool
    {
        self.connected.load(Ordering::SeqCst)
    }

    /// True once any read has refreshed the cached state.
    pub fn status_updated(&self) -> bool
    {
        self.status.lock().updated
    }

    /// Clearing all outputs on connect resets whatever the
    /// actuators are doing, so it stays off unless asked for.
    pub fn set_clear_outputs_on_connect(&self, enabled: bool)
    {
        self.clear_outputs_on_connect.store(enabled, Ordering::SeqCst);
    }

    pub fn clear_outputs_on_connect(&self) -> bool
    {
        self.clear_outputs_on_connect.load(Ordering::SeqCst)
    }

    pub fn connect(&self) -> Result<(), IoError>
    {
        if self.is_connected()
        {
            return Ok(());
        }

        if !self.bus.connect_tcp(self.ip_bytes, self.id)
        {
            self.tracer.error(format!("Failed to connect to device {} (ID: {}) at IP {}", self.name, self.id, self.ip_address));
            return Err(IoError::ConnectFailed(self.id));
        }

        self.connected.store(true, Ordering::SeqCst);
        self.tracer.trace(format!("Connected to device {} (ID: {}) at IP {}", self.name, self.id, self.ip_address));

        if self.clear_outputs_on_connect() && self.output_count > 0
        {
            thread::sleep(Duration::from_millis(CONNECT_CLEAR_DELAY_MS));
            let clear_mask = (0..self.output_count).fold(0, |mask, pin| mask | self.get_output_pin_mask(pin));
            self.tracer.trace(format!("Initializing outputs with clear mask: {:#x}", clear_mask));
            if let Err(e) = self.set_outputs(0, clear_mask)
            {
                self.tracer.error(format!("Initial output clear failed: {}", e));
            }
        }

        Ok(())
    }

    pub fn disconnect(&self) -> Result<(), IoError>
    {
        if !self.is_connected()
        {
            return Ok(());
        }

        self.bus.close(self.id);
        self.connected.store(false, Ordering::SeqCst);
        self.tracer.trace(format!("Disconnected from device {} (ID: {})", self.name, self.id));
        Ok(())
    }

    /// Returns 0 for pins outside [0, output_count).
    pub fn get_output_pin_mask(&self, pin: u32) -> u32
    {
        if pin >= self.output_count
        {
            self.tracer.error(format!("Pin number out of range: {}", pin));
            return 0;
        }

        match self.output_masks.get(pin as usize)
        {
            Some(mask) => *mask,
            None => {
                self.tracer.error(format!("No output mask for pin {}", pin));
                0
            }
        }
    }

    fn ensure_connected(&self) -> Result<(), IoError>
    {
        if !self.is_connected()
        {
            self.tracer.error(format!("Device {} not connected", self.name));
            return Err(IoError::NotConnected(self.id));
        }
        Ok(())
    }

    pub fn read_inputs(&self) -> Result<InputStatus, IoError>
    {
        self.ensure_connected()?;

        match self.bus.get_input(self.id)
        {
            Ok((inputs, latch)) => {
                let fresh = InputStatus { inputs, latch };
                let mut cache = self.status.lock();
                cache.inputs = fresh;
                cache.updated = true;
                Ok(fresh)
            }
            Err(code) => {
                self.tracer.error(format!("Failed to read inputs from device {}, error code: {}", self.name, code));
                Err(IoError::Bus(self.id, code))
            }
        }
    }

    pub fn get_last_input_status(&self) -> InputStatus
    {
        self.status.lock().inputs
    }

    pub fn clear_latch(&self, latch_mask: u32) -> Result<(), IoError>
    {
        self.ensure_connected()?;

        self.bus.clear_latch(self.id, latch_mask).map_err(|code| {
            self.tracer.error(format!("Failed to clear latch for device {}, error code: {}", self.name, code));
            IoError::Bus(self.id, code)
        })
    }

    pub fn get_outputs(&self) -> Result<OutputStatus, IoError>
    {
        self.ensure_connected()?;

        match self.bus.get_output(self.id)
        {
            Ok((outputs, status)) => {
                let fresh = OutputStatus { outputs, status };
                let mut cache = self.status.lock();
                cache.outputs = fresh;
                cache.updated = true;
                Ok(fresh)
            }
            Err(code) => {
                self.tracer.error(format!("Failed to get outputs from device {}, error code: {}", self.name, code));
                Err(IoError::Bus(self.id, code))
            }
        }
    }

    pub fn get_last_output_status(&self) -> OutputStatus
    {
        self.status.lock().outputs
    }

    /// Checks an output against the cached output word.
    pub fn is_output_on(&self, pin: u32) -> bool
    {
        let mask = self.get_output_pin_mask(pin);
        mask != 0 && self.get_last_output_status().outputs & mask != 0
    }

    /// Sets and clears outputs in one bus call. Blocks the caller
    /// for the settle time, then refreshes the cached outputs.
    pub fn set_outputs(&self, set_mask: u32, clear_mask: u32) -> Result<(), IoError>
    {
        self.ensure_connected()?;

        self.tracer.trace(format!("Setting outputs for {} - Set mask: {:#x}, Clear mask: {:#x}", self.name, set_mask, clear_mask));

        if let Err(code) = self.bus.set_output(self.id, set_mask, clear_mask)
        {
            self.tracer.error(format!("Failed to set outputs for device {}, error code: {}", self.name, code));
            return Err(IoError::Bus(self.id, code));
        }

        thread::sleep(Duration::from_millis(OUTPUT_SETTLE_TIME_MS));

        // The write went through; a failed read back only leaves
        // the cache stale until the next poll.
        let _ = self.get_outputs();
        Ok(())
    }

    pub fn set_output(&self, pin: u32, state: bool) -> Result<(), IoError>
    {
        self.ensure_connected()?;

        if pin >= self.output_count
        {
            self.tracer.error(format!("Invalid output pin {} on device {}", pin, self.name));
            return Err(IoError::InvalidPin(self.id, pin));
        }

        let mask = self.get_output_pin_mask(pin);
        if mask == 0
        {
            return Err(IoError::InvalidPin(self.id, pin));
        }
        self.tracer.trace(format!("Setting output pin {} to {} with mask {:#x}", pin, if state { "ON" } else { "OFF" }, mask));

        if state
        {
            self.set_outputs(mask, 0)
        }
        else
        {
            self.set_outputs(0, mask)
        }
    }
}

impl Drop for EziIoDevice
{
    fn drop(&mut self)
    {
        let _ = self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezicell_hal::iobus::{MockIoBus, BUS_TIMEOUT};
    use mockall::predicate::*;

    fn make_device(output_count: u32, bus: MockIoBus) -> EziIoDevice
    {
        EziIoDevice::new(3, "IOTop", "192.168.0.3", 16, output_count, Arc::new(bus)).expect("valid device")
    }

    fn connectable_bus() -> MockIoBus
    {
        let mut bus = MockIoBus::new();
        bus.expect_connect_tcp()
           .with(eq([192, 168, 0, 3]), eq(3))
           .returning(|_, _| true);
        bus.expect_close().returning(|_| ());
        bus
    }

    #[test]
    fn eight_pin_device_uses_low_output_masks()
    {
        let device = make_device(8, MockIoBus::new());
        for pin in 0..8
        {
            assert_eq!(0x100 << pin, device.get_output_pin_mask(pin));
        }
        assert_eq!(0, device.get_output_pin_mask(8));
    }

    #[test]
    fn sixteen_pin_device_uses_high_output_masks()
    {
        let device = make_device(16, MockIoBus::new());
        for pin in 0..16
        {
            assert_eq!(0x10000 << pin, device.get_output_pin_mask(pin));
        }
        assert_eq!(0, device.get_output_pin_mask(16));
    }

    #[test]
    fn small_output_count_still_uses_eight_pin_table()
    {
        let device = make_device(4, MockIoBus::new());
        assert_eq!(0x800, device.get_output_pin_mask(3));
        assert_eq!(0, device.get_output_pin_mask(4));
    }

    #[test]
    fn more_than_sixteen_outputs_are_rejected()
    {
        let result = EziIoDevice::new(0, "Wide", "10.0.0.1", 0, 32, Arc::new(MockIoBus::new()));
        assert_eq!(Some(IoError::UnsupportedOutputCount(0, 32)), result.err());

        let widest = EziIoDevice::new(0, "Widest", "10.0.0.1", 0, 16, Arc::new(MockIoBus::new()));
        assert!(widest.is_ok());
    }

    #[test]
    fn bad_ip_is_rejected()
    {
        let result = EziIoDevice::new(1, "Bad", "192.168.0", 0, 8, Arc::new(MockIoBus::new()));
        assert_eq!(Some(IoError::InvalidAddress(1)), result.err());
    }

    #[test]
    fn connect_is_idempotent()
    {
        let mut bus = MockIoBus::new();
        bus.expect_connect_tcp().times(1).returning(|_, _| true);
        bus.expect_close().times(1).returning(|_| ());
        let device = make_device(16, bus);

        assert_eq!(Ok(()), device.connect());
        assert_eq!(Ok(()), device.connect());
        assert!(device.is_connected());
        assert_eq!(Ok(()), device.disconnect());
        assert_eq!(Ok(()), device.disconnect());
        assert!(!device.is_connected());
    }

    #[test]
    fn failed_connect_leaves_device_disconnected()
    {
        let mut bus = MockIoBus::new();
        bus.expect_connect_tcp().returning(|_, _| false);
        let device = make_device(16, bus);

        assert_eq!(Err(IoError::ConnectFailed(3)), device.connect());
        assert!(!device.is_connected());
    }

    #[test]
    fn connect_does_not_touch_outputs_by_default()
    {
        let mut bus = connectable_bus();
        bus.expect_set_output().times(0);
        let device = make_device(16, bus);
        assert_eq!(Ok(()), device.connect());
    }

    #[test]
    fn connect_clears_all_outputs_when_enabled()
    {
        let mut bus = connectable_bus();
        bus.expect_set_output()
           .with(eq(3), eq(0), eq(0xFF00))
           .times(1)
           .returning(|_, _, _| Ok(()));
        bus.expect_get_output().returning(|_| Ok((0, 0)));
        let device = make_device(8, bus);
        device.set_clear_outputs_on_connect(true);
        assert_eq!(Ok(()), device.connect());
    }

    #[test]
    fn reads_fail_when_not_connected()
    {
        let mut bus = MockIoBus::new();
        bus.expect_get_input().times(0);
        bus.expect_get_output().times(0);
        let device = make_device(16, bus);

        assert_eq!(Err(IoError::NotConnected(3)), device.read_inputs());
        assert_eq!(Err(IoError::NotConnected(3)), device.get_outputs());
        assert_eq!(Err(IoError::NotConnected(3)), device.set_output(0, true));
        assert_eq!(Err(IoError::NotConnected(3)), device.clear_latch(1));
    }

    #[test]
    fn successful_read_updates_cache()
    {
        let mut bus = connectable_bus();
        bus.expect_get_input().returning(|_| Ok((0b1010, 0b0010)));
        let device = make_device(16, bus);
        device.connect().expect("connect");

        assert!(!device.status_updated());
        let status = device.read_inputs().expect("read");
        assert_eq!(InputStatus { inputs: 0b1010, latch: 0b0010 }, status);
        assert_eq!(status, device.get_last_input_status());
        assert!(device.status_updated());
    }

    #[test]
    fn failed_read_keeps_stale_cache()
    {
        let mut bus = connectable_bus();
        let mut calls = 0;
        bus.expect_get_input().returning(move |_| {
            calls += 1;
            if calls == 1 { Ok((0x5, 0)) } else { Err(BUS_TIMEOUT) }
        });
        let device = make_device(16, bus);
        device.connect().expect("connect");

        device.read_inputs().expect("first read");
        assert_eq!(Err(IoError::Bus(3, BUS_TIMEOUT)), device.read_inputs());
        assert_eq!(0x5, device.get_last_input_status().inputs);
        assert!(device.is_connected());
    }

    #[test]
    fn set_output_writes_single_bit_and_refreshes_cache()
    {
        let mut bus = connectable_bus();
        bus.expect_set_output()
           .with(eq(3), eq(0x40000), eq(0))
           .times(1)
           .returning(|_, _, _| Ok(()));
        bus.expect_get_output().returning(|_| Ok((0x40000, 0)));
        let device = make_device(16, bus);
        device.connect().expect("connect");

        assert_eq!(Ok(()), device.set_output(2, true));
        assert_eq!(0x40000, device.get_last_output_status().outputs);
        assert!(device.is_output_on(2));
        assert!(!device.is_output_on(3));
    }

    #[test]
    fn set_output_off_uses_clear_mask()
    {
        let mut bus = connectable_bus();
        bus.expect_set_output()
           .with(eq(3), eq(0), eq(0x200))
           .times(1)
           .returning(|_, _, _| Ok(()));
        bus.expect_get_output().returning(|_| Ok((0, 0)));
        let device = make_device(8, bus);
        device.connect().expect("connect");

        assert_eq!(Ok(()), device.set_output(1, false));
    }

    #[test]
    fn set_output_rejects_invalid_pin()
    {
        let mut bus = connectable_bus();
        bus.expect_set_output().times(0);
        let device = make_device(8, bus);
        device.connect().expect("connect");

        assert_eq!(Err(IoError::InvalidPin(3, 8)), device.set_output(8, true));
    }

    #[test]
    fn failed_write_is_reported()
    {
        let mut bus = connectable_bus();
        bus.expect_set_output().returning(|_, _, _| Err(BUS_TIMEOUT));
        bus.expect_get_output().times(0);
        let device = make_device(16, bus);
        device.connect().expect("connect");

        assert_eq!(Err(IoError::Bus(3, BUS_TIMEOUT)), device.set_outputs(0x10000, 0));
    }

    #[test]
    fn dropping_connected_device_closes_it()
    {
        let mut bus = MockIoBus::new();
        bus.expect_connect_tcp().returning(|_, _| true);
        bus.expect_close().with(eq(3)).times(1).returning(|_| ());
        let device = make_device(16, bus);
        device.connect().expect("connect");
        drop(device);
    }
}
