use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use ezicell_hal::iobus::{BusCode, IoBus, BUS_DISCONNECTED, BUS_INVALID_SLAVE, BUS_NOT_OPEN};

use crate::core::shareable::Shareable;
use super::input_pin_mask;

#[derive(Default)]
struct SimModule
{
    reachable: bool,
    open: bool,
    link_down: bool,
    inputs: u32,
    latch: u32,
    outputs: u32
}

/// # SimulatedBus
/// In-memory stand-in for the EziIO field bus. Every device id
/// is a module that can be made reachable, fed input levels and
/// checked for the outputs that were written to it.
///
/// Used by the tests and by the simulator target.
pub struct SimulatedBus
{
    modules: Shareable<HashMap<u32, SimModule>>,
    auto_reconnect: AtomicBool
}

impl SimulatedBus
{
    pub fn new() -> Self
    {
        SimulatedBus
        {
            modules: Shareable::new(HashMap::new()),
            auto_reconnect: AtomicBool::new(false)
        }
    }

    /// Unreachable modules refuse connect_tcp.
    pub fn set_reachable(&self, device_id: u32, reachable: bool)
    {
        self.modules.lock().entry(device_id).or_default().reachable = reachable;
    }

    /// Drives an input level. A rising edge also sets the
    /// latch bit of that pin.
    pub fn set_input(&self, device_id: u32, pin: u32, on: bool)
    {
        let mask = match input_pin_mask(pin)
        {
            Some(mask) => mask,
            None => return
        };

        let mut modules = self.modules.lock();
        let module = modules.entry(device_id).or_default();
        if on
        {
            if module.inputs & mask == 0
            {
                module.latch |= mask;
            }
            module.inputs |= mask;
        }
        else
        {
            module.inputs &= !mask;
        }
    }

    /// Bus calls to the module fail with BUS_DISCONNECTED
    /// until restore_link is called.
    pub fn drop_link(&self, device_id: u32)
    {
        self.modules.lock().entry(device_id).or_default().link_down = true;
    }

    pub fn restore_link(&self, device_id: u32)
    {
        self.modules.lock().entry(device_id).or_default().link_down = false;
    }

    pub fn outputs(&self, device_id: u32) -> u32
    {
        self.modules.lock().get(&device_id).map_or(0, |m| m.outputs)
    }

    pub fn inputs(&self, device_id: u32) -> u32
    {
        self.modules.lock().get(&device_id).map_or(0, |m| m.inputs)
    }

    pub fn is_open(&self, device_id: u32) -> bool
    {
        self.modules.lock().get(&device_id).map_or(false, |m| m.open)
    }

    pub fn auto_reconnect(&self) -> bool
    {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    fn with_open_module<T, F>(&self, device_id: u32, op: F) -> Result<T, BusCode>
    where F: FnOnce(&mut SimModule) -> T
    {
        let mut modules = self.modules.lock();
        let module = modules.get_mut(&device_id).ok_or(BUS_INVALID_SLAVE)?;
        if !module.open
        {
            return Err(BUS_NOT_OPEN);
        }
        if module.link_down
        {
            return Err(BUS_DISCONNECTED);
        }
        Ok(op(module))
    }
}

impl Default for SimulatedBus
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl IoBus for SimulatedBus
{
    fn connect_tcp(&self, _ip: [u8; 4], device_id: u32) -> bool
    {
        let mut modules = self.modules.lock();
        match modules.get_mut(&device_id)
        {
            Some(module) if module.reachable && !module.link_down => {
                module.open = true;
                true
            }
            _ => false
        }
    }

    fn close(&self, device_id: u32)
    {
        if let Some(module) = self.modules.lock().get_mut(&device_id)
        {
            module.open = false;
        }
    }

    fn set_auto_reconnect(&self, enabled: bool)
    {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    fn get_input(&self, device_id: u32) -> Result<(u32, u32), BusCode>
    {
        self.with_open_module(device_id, |m| (m.inputs, m.latch))
    }

    fn clear_latch(&self, device_id: u32, latch_mask: u32) -> Result<(), BusCode>
    {
        self.with_open_module(device_id, |m| m.latch &= !latch_mask)
    }

    fn get_output(&self, device_id: u32) -> Result<(u32, u32), BusCode>
    {
        self.with_open_module(device_id, |m| (m.outputs, 0))
    }

    fn set_output(&self, device_id: u32, set_mask: u32, clear_mask: u32) -> Result<(), BusCode>
    {
        self.with_open_module(device_id, |m| m.outputs = (m.outputs | set_mask) & !clear_mask)
    }
}
