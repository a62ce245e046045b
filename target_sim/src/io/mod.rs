use std::sync::Arc;
use std::time::{Duration, Instant};

use ezicell_core::core::poller::Poller;
use ezicell_core::io::{EziIoManager, SimulatedBus};
use ezicell_core::trace::trace_helper::TraceHelper;
use pneumatic::PneumaticManager;

/// Time a simulated cylinder needs from one end position to the other.
pub const TRAVEL_TIME_MS: u64 = 400;
const CYLINDER_TICK_MS: u64 = 10;

/// Pins of one simulated cylinder: valve output and the two
/// end position sensors, as (device id, pin).
struct Cylinder
{
    name: String,
    valve: (u32, u32),
    extended_sensor: (u32, u32),
    retracted_sensor: (u32, u32),
    valve_on: bool,
    switched_at: Instant,
    settled: bool
}

impl Cylinder
{
    fn tick(&mut self, io: &EziIoManager, bus: &SimulatedBus, travel_time: Duration)
    {
        let (device_id, pin) = self.valve;
        let valve_on = io.get_device(device_id)
                         .map_or(false, |d| bus.outputs(device_id) & d.get_output_pin_mask(pin) != 0);

        if valve_on != self.valve_on
        {
            self.valve_on = valve_on;
            self.switched_at = Instant::now();
            self.settled = false;
            bus.set_input(self.extended_sensor.0, self.extended_sensor.1, false);
            bus.set_input(self.retracted_sensor.0, self.retracted_sensor.1, false);
            return;
        }

        if !self.settled && self.switched_at.elapsed() >= travel_time
        {
            self.settled = true;
            let sensor = if self.valve_on { self.extended_sensor } else { self.retracted_sensor };
            bus.set_input(sensor.0, sensor.1, true);
        }
    }
}

/// # SimulatedCylinders
/// Moves the sensor inputs of the simulated bus the way real
/// cylinders would: when a valve output changes, both end
/// sensors drop and the sensor of the new end position comes
/// on after the travel time.
pub struct SimulatedCylinders
{
    poller: Poller,
    tracer: TraceHelper
}

impl SimulatedCylinders
{
    /// Builds one cylinder per loaded slide, parked in the
    /// retracted position.
    pub fn launch(pneumatic: &PneumaticManager, bus: Arc<SimulatedBus>, travel_time_ms: u64) -> Self
    {
        let tracer = TraceHelper::new("SIM/Cylinders");
        let mut cylinders = Vec::new();
        for name in pneumatic.get_slide_names()
        {
            let slide = match pneumatic.get_slide(&name)
            {
                Some(slide) => slide,
                None => continue
            };
            let slide = slide.lock();
            let pins = (slide.output().address(), slide.extended_input().address(), slide.retracted_input().address());
            if let (Some(valve), Some(extended_sensor), Some(retracted_sensor)) = pins
            {
                bus.set_input(retracted_sensor.0, retracted_sensor.1, true);
                cylinders.push(Cylinder
                {
                    name: name.clone(),
                    valve,
                    extended_sensor,
                    retracted_sensor,
                    valve_on: false,
                    switched_at: Instant::now(),
                    settled: true
                });
            }
        }

        tracer.trace(format!("Simulating {} cylinders: {}",
                             cylinders.len(),
                             cylinders.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")));

        let io = pneumatic.io_manager().clone();
        let travel_time = Duration::from_millis(travel_time_ms);
        let mut poller = Poller::new("SimCylinders", CYLINDER_TICK_MS);
        let started = poller.start(CYLINDER_TICK_MS, move || {
            for cylinder in cylinders.iter_mut()
            {
                cylinder.tick(&io, &bus, travel_time);
            }
        });
        if let Err(e) = started
        {
            tracer.error(format!("Cannot start cylinder thread: {}", e));
        }

        SimulatedCylinders { poller, tracer }
    }

    pub fn stop(&mut self)
    {
        self.poller.stop();
        self.tracer.trace_str("Cylinder simulation stopped");
    }
}
