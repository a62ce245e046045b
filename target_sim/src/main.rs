extern crate ezicell_core;
extern crate pneumatic;

use std::sync::Arc;

use ezicell_core::cfg::IoConfig;
use ezicell_core::io::{manager::DEFAULT_POLLING_INTERVAL_MS, EziIoManager, SimulatedBus};
use ezicell_core::trace::{self, trace_helper::TraceHelper};
use pneumatic::PneumaticManager;

mod console;
mod io;

const DEMO_CONFIG: &str = r#"{
    "metadata": { "version": "1.0" },
    "eziio": [
        { "deviceId": 0, "name": "IOBottom", "IP": "192.168.0.3", "inputCount": 0, "outputCount": 16,
          "ioConfig": { "outputs": [ { "pin": 2, "name": "GripperValve" },
                                     { "pin": 3, "name": "PusherValve" } ] } },
        { "deviceId": 1, "name": "IOTop", "IP": "192.168.0.2", "inputCount": 16, "outputCount": 8,
          "ioConfig": { "inputs": [ { "pin": 0, "name": "GripperDown" },
                                    { "pin": 1, "name": "GripperUp" },
                                    { "pin": 2, "name": "PusherOut" },
                                    { "pin": 3, "name": "PusherIn" } ] } }
    ],
    "pneumaticSlides": [
        { "name": "Gripper", "timeoutMs": 2000,
          "output": { "deviceName": "IOBottom", "pinName": "GripperValve" },
          "extendedInput": { "deviceName": "IOTop", "pinName": "GripperDown" },
          "retractedInput": { "deviceName": "IOTop", "pinName": "GripperUp" } },
        { "name": "Pusher", "timeoutMs": 2000,
          "output": { "deviceName": "IOBottom", "pinName": "PusherValve" },
          "extendedInput": { "deviceName": "IOTop", "pinName": "PusherOut" },
          "retractedInput": { "deviceName": "IOTop", "pinName": "PusherIn" } }
    ]
}"#;

fn load_config(tracer: &TraceHelper) -> Option<IoConfig>
{
    let loaded = match std::env::args().nth(1)
    {
        Some(path) => IoConfig::load(&path),
        None => {
            tracer.trace_str("No config file given, using built-in demo cell");
            IoConfig::parse(DEMO_CONFIG.as_bytes())
        }
    };

    match loaded
    {
        Ok(config) => Some(config),
        Err(e) => {
            tracer.error(format!("Cannot load configuration: {}", e));
            None
        }
    }
}

fn main() {
    trace::launch();
    let tracer = TraceHelper::new("SIM/Main");

    let config = match load_config(&tracer)
    {
        Some(config) => config,
        None => std::process::exit(1)
    };

    let bus = Arc::new(SimulatedBus::new());
    for device in config.eziio.iter()
    {
        bus.set_reachable(device.device_id, true);
    }

    let io = Arc::new(EziIoManager::new(bus.clone()));
    io.initialize();
    if let Err(e) = config.initialize_io_manager(&io)
    {
        tracer.error(format!("Device setup incomplete: {}", e));
    }
    if let Err(e) = io.connect_all()
    {
        tracer.error(format!("Not all devices connected: {}", e));
    }
    io.start_polling(DEFAULT_POLLING_INTERVAL_MS);

    let pneumatic = PneumaticManager::new(io.clone());
    if let Err(e) = pneumatic.load_configuration(&config)
    {
        tracer.error(format!("Pneumatic setup failed: {}", e));
    }
    pneumatic.set_state_change_callback(Arc::new(|name: &str, state| {
        println!("[{}] {}", name, state);
    }));

    let mut cylinders = io::SimulatedCylinders::launch(&pneumatic, bus, io::TRAVEL_TIME_MS);
    pneumatic.initialize();
    pneumatic.start_polling(pneumatic::manager::DEFAULT_POLLING_INTERVAL_MS);

    console::Console::new(&pneumatic).run();

    pneumatic.stop_polling();
    cylinders.stop();
    io.shutdown();
    tracer.trace_str("Simulator stopped");
}
