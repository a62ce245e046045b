use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ezicell_core::cfg::{IoConfigSource, PneumaticSlideConfig};
use ezicell_core::core::{poller::Poller, shareable::Shareable};
use ezicell_core::io::{input_pin_mask, EziIoManager, IoError};
use ezicell_core::trace::trace_helper::TraceHelper;

use crate::pin_config::IoPinConfig;
use crate::slide::{PneumaticSlide, SlideState, StateCallback};

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum PneumaticError
{
    UnknownSlide(String),
    UnresolvedPin(String, String),
    PinOutOfRange(String, u32),
    NoSlidesLoaded,
    Io(IoError)
}

impl fmt::Display for PneumaticError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            PneumaticError::UnknownSlide(name) => write!(f, "pneumatic slide {} not found", name),
            PneumaticError::UnresolvedPin(device, pin) => write!(f, "pin {} on device {} cannot be resolved", pin, device),
            PneumaticError::PinOutOfRange(device, pin) => write!(f, "pin {} on device {} is out of range", pin, device),
            PneumaticError::NoSlidesLoaded => write!(f, "no pneumatic slides loaded"),
            PneumaticError::Io(e) => write!(f, "{}", e)
        }
    }
}

impl std::error::Error for PneumaticError {}

impl From<IoError> for PneumaticError
{
    fn from(e: IoError) -> Self
    {
        PneumaticError::Io(e)
    }
}

type SlideMap = BTreeMap<String, Shareable<PneumaticSlide>>;

/// Pin names of one device, by direction.
#[derive(Default)]
struct DevicePins
{
    inputs: HashMap<String, u32>,
    outputs: HashMap<String, u32>
}

#[derive(Default)]
struct PinDirectory
{
    device_ids: HashMap<String, u32>,
    pins: HashMap<String, DevicePins>
}

impl PinDirectory
{
    fn from_source(source: &dyn IoConfigSource) -> Self
    {
        let mut directory = PinDirectory::default();
        for device in source.eziio_devices()
        {
            directory.device_ids.insert(device.name.clone(), device.device_id);
            let pins = directory.pins.entry(device.name.clone()).or_default();
            for input in device.io_config.inputs.iter()
            {
                pins.inputs.insert(input.name.clone(), input.pin);
            }
            for output in device.io_config.outputs.iter()
            {
                pins.outputs.insert(output.name.clone(), output.pin);
            }
        }
        directory
    }

    /// Input names are searched before output names.
    fn lookup(&self, device_name: &str, pin_name: &str) -> Option<(u32, u32)>
    {
        let device_id = *self.device_ids.get(device_name)?;
        let pins = self.pins.get(device_name)?;
        let pin = pins.inputs.get(pin_name).or_else(|| pins.outputs.get(pin_name))?;
        Some((device_id, *pin))
    }
}

fn sample_input_pin(io: &EziIoManager, config: &IoPinConfig) -> Result<bool, PneumaticError>
{
    let (device_id, pin) = config.address()
        .ok_or_else(|| PneumaticError::UnresolvedPin(config.device_name.clone(), config.pin_name.clone()))?;

    if input_pin_mask(pin).is_none()
    {
        return Err(PneumaticError::PinOutOfRange(config.device_name.clone(), pin));
    }

    Ok(io.get_last_input_status(device_id)?.is_on(pin))
}

fn read_input_pin(io: &EziIoManager, tracer: &TraceHelper, config: &IoPinConfig) -> bool
{
    sample_input_pin(io, config).unwrap_or_else(|e| {
        tracer.error(format!("Failed to read input {}.{}: {}", config.device_name, config.pin_name, e));
        false
    })
}

fn update_slides(io: &EziIoManager, tracer: &TraceHelper, slides: &SlideMap)
{
    for slide in slides.values()
    {
        let mut slide = slide.lock();
        let extended = read_input_pin(io, tracer, slide.extended_input());
        let retracted = read_input_pin(io, tracer, slide.retracted_input());
        slide.update_state(extended, retracted);
    }
}

/// # PneumaticManager
/// Owns all pneumatic slides of a cell. Slides are configured
/// by device and pin names, which the manager resolves against
/// the device pin lists of the configuration. A polling thread
/// feeds the cached sensor inputs of the I/O manager into the
/// slide state machines.
///
/// Sensor levels are taken from the I/O manager cache, so the
/// I/O manager has to be polling for slides to see changes.
pub struct PneumaticManager
{
    io: Arc<EziIoManager>,
    slides: Shareable<SlideMap>,
    pins: Shareable<PinDirectory>,
    callback: Shareable<Option<StateCallback>>,
    poller: Shareable<Poller>,
    tracer: TraceHelper
}

impl PneumaticManager
{
    pub fn new(io: Arc<EziIoManager>) -> Self
    {
        PneumaticManager
        {
            io,
            slides: Shareable::new(SlideMap::new()),
            pins: Shareable::new(PinDirectory::default()),
            callback: Shareable::new(None),
            poller: Shareable::new(Poller::new("PneumaticPolling", DEFAULT_POLLING_INTERVAL_MS)),
            tracer: TraceHelper::new("PNEUMATIC/PneumaticManager")
        }
    }

    pub fn io_manager(&self) -> &Arc<EziIoManager>
    {
        &self.io
    }

    /// Runs one state update pass so slides start out with the
    /// sensor levels already known.
    pub fn initialize(&self)
    {
        self.update_all_slide_states();
        self.tracer.trace(format!("Pneumatic manager initialized with {} slides", self.slides.lock().len()));
    }

    fn forwarding_callback(&self) -> StateCallback
    {
        let cell = self.callback.clone();
        Arc::new(move |name: &str, state: SlideState| {
            let callback = cell.lock().clone();
            if let Some(callback) = callback
            {
                callback(name, state);
            }
        })
    }

    /// Replaces all slides with the ones described by the
    /// source. Slides with a pin that cannot be resolved are
    /// skipped. Returns the number of slides loaded.
    pub fn load_configuration(&self, source: &dyn IoConfigSource) -> Result<usize, PneumaticError>
    {
        let mut slides = self.slides.lock();
        slides.clear();
        *self.pins.lock() = PinDirectory::from_source(source);

        for slide_config in source.pneumatic_slides()
        {
            let (output, extended, retracted) = match self.resolve_slide_pins(slide_config)
            {
                Ok(pins) => pins,
                Err(e) => {
                    self.tracer.error(format!("Skipping slide {}: {}", slide_config.name, e));
                    continue;
                }
            };

            let mut slide = PneumaticSlide::new(&slide_config.name, output, extended, retracted, slide_config.timeout_ms);
            slide.set_state_change_callback(self.forwarding_callback());
            slides.insert(slide_config.name.clone(), Shareable::new(slide));
            self.tracer.trace(format!("Loaded pneumatic slide: {}", slide_config.name));
        }

        if slides.is_empty()
        {
            self.tracer.error_str("No pneumatic slides loaded");
            return Err(PneumaticError::NoSlidesLoaded);
        }

        self.tracer.trace(format!("Loaded {} pneumatic slides", slides.len()));
        Ok(slides.len())
    }

    fn resolve_slide_pins(&self, config: &PneumaticSlideConfig) -> Result<(IoPinConfig, IoPinConfig, IoPinConfig), PneumaticError>
    {
        Ok((self.resolve_pin_config(&IoPinConfig::from(&config.output))?,
            self.resolve_pin_config(&IoPinConfig::from(&config.extended_input))?,
            self.resolve_pin_config(&IoPinConfig::from(&config.retracted_input))?))
    }

    /// Resolves device and pin name to device id and pin number.
    pub fn resolve_pin_config(&self, config: &IoPinConfig) -> Result<IoPinConfig, PneumaticError>
    {
        match self.pins.lock().lookup(&config.device_name, &config.pin_name)
        {
            Some((device_id, pin)) => Ok(IoPinConfig::resolved(&config.device_name, &config.pin_name, device_id, pin)),
            None => {
                self.tracer.error(format!("Cannot resolve pin {} on device {}", config.pin_name, config.device_name));
                Err(PneumaticError::UnresolvedPin(config.device_name.clone(), config.pin_name.clone()))
            }
        }
    }

    pub fn get_slide(&self, name: &str) -> Option<Shareable<PneumaticSlide>>
    {
        self.slides.lock().get(name).cloned()
    }

    fn slide(&self, name: &str) -> Result<Shareable<PneumaticSlide>, PneumaticError>
    {
        self.get_slide(name).ok_or_else(|| {
            self.tracer.error(format!("Slide not found: {}", name));
            PneumaticError::UnknownSlide(name.to_string())
        })
    }

    /// Switches the valve on; the slide only counts as moving
    /// once the output write went through.
    pub fn extend_slide(&self, name: &str) -> Result<(), PneumaticError>
    {
        let slide = self.slide(name)?;
        let output = slide.lock().output().clone();
        self.set_output_pin(&output, true)?;
        slide.lock().extend();
        Ok(())
    }

    pub fn retract_slide(&self, name: &str) -> Result<(), PneumaticError>
    {
        let slide = self.slide(name)?;
        let output = slide.lock().output().clone();
        self.set_output_pin(&output, false)?;
        slide.lock().retract();
        Ok(())
    }

    pub fn get_slide_state(&self, name: &str) -> Option<SlideState>
    {
        match self.get_slide(name)
        {
            Some(slide) => Some(slide.lock().state()),
            None => {
                self.tracer.error(format!("Slide not found: {}", name));
                None
            }
        }
    }

    /// Slide names in sorted order.
    pub fn get_slide_names(&self) -> Vec<String>
    {
        self.slides.lock().keys().cloned().collect()
    }

    pub fn reset_all_slides(&self)
    {
        for slide in self.slides.lock().values()
        {
            slide.lock().reset_state();
        }
    }

    /// Reads a sensor from the I/O manager cache. Anything that
    /// cannot be read counts as off.
    pub fn read_input_pin(&self, config: &IoPinConfig) -> bool
    {
        read_input_pin(&self.io, &self.tracer, config)
    }

    pub fn set_output_pin(&self, config: &IoPinConfig, state: bool) -> Result<(), PneumaticError>
    {
        let (device_id, pin) = config.address().ok_or_else(|| {
            self.tracer.error(format!("Invalid pin configuration for {}.{}", config.device_name, config.pin_name));
            PneumaticError::UnresolvedPin(config.device_name.clone(), config.pin_name.clone())
        })?;

        self.io.set_output(device_id, pin, state).map_err(|e| {
            self.tracer.error(format!("Failed to set output {}.{}: {}", config.device_name, config.pin_name, e));
            PneumaticError::from(e)
        })
    }

    /// One pass over all slides, with the slide map locked for
    /// the whole pass.
    pub fn update_all_slide_states(&self)
    {
        update_slides(&self.io, &self.tracer, &self.slides.lock());
    }

    pub fn start_polling(&self, interval_ms: u64)
    {
        let io = self.io.clone();
        let slides = self.slides.clone();
        let tracer = self.tracer.clone();
        let started = self.poller.lock().start(interval_ms, move || {
            update_slides(&io, &tracer, &slides.lock());
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

    /// Installs the callback and re-registers the forwarding
    /// closure on every loaded slide.
    pub fn set_state_change_callback(&self, callback: StateCallback)
    {
        *self.callback.lock() = Some(callback);
        for slide in self.slides.lock().values()
        {
            slide.lock().set_state_change_callback(self.forwarding_callback());
        }
    }
}

impl Drop for PneumaticManager
{
    fn drop(&mut self)
    {
        self.stop_polling();
    }
}
