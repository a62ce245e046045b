use std::collections::HashMap;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};

use ezicell_hal::iobus::IoBus;

use crate::core::{poller::Poller, shareable::Shareable};
use crate::trace::trace_helper::TraceHelper;
use super::{EziIoDevice, InputStatus, IoError, OutputStatus};

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 100;

#[derive(Default)]
struct DeviceRegistry
{
    devices: Vec<Arc<EziIoDevice>>,
    by_id: HashMap<u32, Arc<EziIoDevice>>,
    by_name: HashMap<String, Arc<EziIoDevice>>
}

impl DeviceRegistry
{
    fn snapshot(&self) -> Vec<Arc<EziIoDevice>>
    {
        self.devices.clone()
    }
}

/// # EziIoManager
/// Registry of all EziIO modules on the bus. Routes calls by
/// device id and runs a polling thread that keeps the input
/// and output caches of every connected device fresh.
///
/// Polling failures are traced and otherwise ignored; a device
/// that fails a read stays connected and is retried on the
/// next pass.
pub struct EziIoManager
{
    bus: Arc<dyn IoBus>,
    registry: Shareable<DeviceRegistry>,
    initialized: AtomicBool,
    poller: Shareable<Poller>,
    tracer: TraceHelper
}

impl EziIoManager
{
    pub fn new(bus: Arc<dyn IoBus>) -> Self
    {
        EziIoManager
        {
            bus,
            registry: Shareable::new(DeviceRegistry::default()),
            initialized: AtomicBool::new(false),
            poller: Shareable::new(Poller::new("EziIoPolling", DEFAULT_POLLING_INTERVAL_MS)),
            tracer: TraceHelper::new("IO/EziIoManager")
        }
    }

    /// One time bus setup. Further calls do nothing.
    pub fn initialize(&self)
    {
        if self.initialized.swap(true, Ordering::SeqCst)
        {
            return;
        }

        self.bus.set_auto_reconnect(true);
        self.tracer.trace_str("EziIO manager initialized");
    }

    pub fn is_initialized(&self) -> bool
    {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self)
    {
        self.stop_polling();
        let _ = self.disconnect_all();

        let mut registry = self.registry.lock();
        if !registry.devices.is_empty()
        {
            self.tracer.trace(format!("Removing {} devices", registry.devices.len()));
        }
        *registry = DeviceRegistry::default();
    }

    pub fn add_device(&self, id: u32, name: &str, ip: &str, input_count: u32, output_count: u32) -> Result<Arc<EziIoDevice>, IoError>
    {
        let mut registry = self.registry.lock();
        if registry.by_id.contains_key(&id)
        {
            self.tracer.error(format!("Device with ID {} already exists", id));
            return Err(IoError::DuplicateDevice(id));
        }

        let device = match EziIoDevice::new(id, name, ip, input_count, output_count, self.bus.clone())
        {
            Ok(device) => Arc::new(device),
            Err(e) => {
                self.tracer.error(format!("Cannot add device {} (ID: {}): {}", name, id, e));
                return Err(e);
            }
        };

        registry.devices.push(device.clone());
        registry.by_id.insert(id, device.clone());
        registry.by_name.insert(name.to_string(), device.clone());

        self.tracer.trace(format!("Added device: {} (ID: {}, IP: {}, {} inputs, {} outputs)", name, id, ip, input_count, output_count));
        Ok(device)
    }

    pub fn get_device(&self, id: u32) -> Option<Arc<EziIoDevice>>
    {
        self.registry.lock().by_id.get(&id).cloned()
    }

    pub fn get_device_by_name(&self, name: &str) -> Option<Arc<EziIoDevice>>
    {
        self.registry.lock().by_name.get(name).cloned()
    }

    /// All devices in the order they were added.
    pub fn devices(&self) -> Vec<Arc<EziIoDevice>>
    {
        self.registry.lock().snapshot()
    }

    fn device(&self, id: u32) -> Result<Arc<EziIoDevice>, IoError>
    {
        self.get_device(id).ok_or_else(|| {
            self.tracer.error(format!("Device with ID {} not found", id));
            IoError::UnknownDevice(id)
        })
    }

    /// Tries every device, even after a failure. Ok only if all
    /// devices are connected afterwards.
    pub fn connect_all(&self) -> Result<(), IoError>
    {
        let mut first_error = None;
        for device in self.devices()
        {
            if let Err(e) = device.connect()
            {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn disconnect_all(&self) -> Result<(), IoError>
    {
        let mut first_error = None;
        for device in self.devices()
        {
            if let Err(e) = device.disconnect()
            {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn connect_device(&self, id: u32) -> Result<(), IoError>
    {
        self.device(id)?.connect()
    }

    pub fn disconnect_device(&self, id: u32) -> Result<(), IoError>
    {
        self.device(id)?.disconnect()
    }

    pub fn read_inputs(&self, id: u32) -> Result<InputStatus, IoError>
    {
        self.device(id)?.read_inputs()
    }

    pub fn get_last_input_status(&self, id: u32) -> Result<InputStatus, IoError>
    {
        Ok(self.device(id)?.get_last_input_status())
    }

    pub fn clear_latch(&self, id: u32, latch_mask: u32) -> Result<(), IoError>
    {
        self.device(id)?.clear_latch(latch_mask)
    }

    pub fn get_outputs(&self, id: u32) -> Result<OutputStatus, IoError>
    {
        self.device(id)?.get_outputs()
    }

    pub fn get_last_output_status(&self, id: u32) -> Result<OutputStatus, IoError>
    {
        Ok(self.device(id)?.get_last_output_status())
    }

    pub fn set_outputs(&self, id: u32, set_mask: u32, clear_mask: u32) -> Result<(), IoError>
    {
        self.device(id)?.set_outputs(set_mask, clear_mask)
    }

    pub fn set_output(&self, id: u32, pin: u32, state: bool) -> Result<(), IoError>
    {
        self.device(id)?.set_output(pin, state)
    }

    /// Starts the polling thread. Does nothing if it already runs.
    pub fn start_polling(&self, interval_ms: u64)
    {
        let registry = self.registry.clone();
        let started = self.poller.lock().start(interval_ms, move || {
            // Snapshot so add_device never waits on a slow bus.
            let devices = registry.lock().snapshot();
            for device in devices.iter().filter(|d| d.is_connected())
            {
                let _ = device.read_inputs();
                let _ = device.get_outputs();
            }
        });

        match started
        {
            Ok(true) => self.tracer.trace(format!("Started polling with interval {}ms", interval_ms)),
            Ok(false) => self.tracer.trace_str("Polling already running"),
            Err(e) => self.tracer.error(format!("Cannot start polling thread: {}", e))
        }
    }

    pub fn stop_polling(&self)
    {
        let mut poller = self.poller.lock();
        if poller.is_running()
        {
            poller.stop();
            self.tracer.trace_str("Stopped polling");
        }
    }

    pub fn is_polling(&self) -> bool
    {
        self.poller.lock().is_running()
    }

    pub fn set_polling_interval(&self, interval_ms: u64)
    {
        self.poller.lock().set_interval(interval_ms);
    }

    pub fn polling_interval(&self) -> u64
    {
        self.poller.lock().interval()
    }
}

impl Drop for EziIoManager
{
    fn drop(&mut self)
    {
        self.shutdown();
    }
}
