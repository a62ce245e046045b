use std::sync::Arc;
use std::time::{Duration, Instant};
use strum_macros::{Display, EnumIter};

use ezicell_core::trace::trace_helper::TraceHelper;
use crate::pin_config::IoPinConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum SlideState
{
    #[strum(serialize = "Unknown")]
    Unknown,
    #[strum(serialize = "Retracted (Up)")]
    Retracted,
    #[strum(serialize = "Extended (Down)")]
    Extended,
    #[strum(serialize = "Moving")]
    Moving,
    #[strum(serialize = "Error")]
    Error
}

/// Called with the slide name and the new state whenever a
/// slide changes state. Runs on the thread that caused the
/// change, with the slide locked, so it must not call back
/// into the pneumatic manager.
pub type StateCallback = Arc<dyn Fn(&str, SlideState) + Send + Sync>;

/// # PneumaticSlide
/// State machine of one pneumatic cylinder with a single valve
/// output and two end position sensors. The slide never touches
/// hardware: extend/retract only record the intent, the sensor
/// levels come in through update_state.
pub struct PneumaticSlide
{
    name: String,
    output: IoPinConfig,
    extended_input: IoPinConfig,
    retracted_input: IoPinConfig,
    timeout: Duration,
    state: SlideState,
    movement_start: Instant,
    callback: Option<StateCallback>,
    tracer: TraceHelper
}

impl PneumaticSlide
{
    pub fn new(name: &str, output: IoPinConfig, extended_input: IoPinConfig, retracted_input: IoPinConfig, timeout_ms: u64) -> Self
    {
        PneumaticSlide
        {
            name: name.to_string(),
            output,
            extended_input,
            retracted_input,
            timeout: Duration::from_millis(timeout_ms),
            state: SlideState::Unknown,
            movement_start: Instant::now(),
            callback: None,
            tracer: TraceHelper::new(&format!("PNEUMATIC/Slide/{}", name))
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn output(&self) -> &IoPinConfig { &self.output }
    pub fn extended_input(&self) -> &IoPinConfig { &self.extended_input }
    pub fn retracted_input(&self) -> &IoPinConfig { &self.retracted_input }
    pub fn state(&self) -> SlideState { self.state }

    pub fn timeout_ms(&self) -> u64
    {
        self.timeout.as_millis() as u64
    }

    pub fn state_string(&self) -> String
    {
        self.state.to_string()
    }

    pub fn set_state_change_callback(&mut self, callback: StateCallback)
    {
        self.callback = Some(callback);
    }

    /// Marks the slide as moving out. Always accepted.
    pub fn extend(&mut self) -> bool
    {
        self.movement_start = Instant::now();
        self.set_state(SlideState::Moving);
        true
    }

    pub fn retract(&mut self) -> bool
    {
        self.movement_start = Instant::now();
        self.set_state(SlideState::Moving);
        true
    }

    /// The only way out of Error.
    pub fn reset_state(&mut self)
    {
        self.movement_start = Instant::now();
        self.set_state(SlideState::Unknown);
    }

    /// Feeds the current sensor levels into the state machine.
    /// A sensor reading always wins over the stored state; with
    /// no sensor active, a moving slide times out into Error and
    /// a slide that left an end position counts as moving.
    pub fn update_state(&mut self, extended: bool, retracted: bool)
    {
        let next = match (extended, retracted)
        {
            (true, true) => SlideState::Error,
            (true, false) => SlideState::Extended,
            (false, true) => SlideState::Retracted,
            (false, false) => match self.state
            {
                SlideState::Moving if self.movement_start.elapsed() >= self.timeout => {
                    self.tracer.error(format!("Movement timed out after {}ms", self.timeout_ms()));
                    SlideState::Error
                }
                SlideState::Extended | SlideState::Retracted => {
                    self.movement_start = Instant::now();
                    SlideState::Moving
                }
                current => current
            }
        };

        if extended && retracted && self.state != SlideState::Error
        {
            self.tracer.error_str("Both end position sensors active");
        }

        self.set_state(next);
    }

    fn set_state(&mut self, state: SlideState)
    {
        if self.state == state
        {
            return;
        }

        self.state = state;
        self.tracer.trace(format!("State changed to: {}", state));
        if let Some(callback) = &self.callback
        {
            callback(&self.name, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezicell_core::core::shareable::Shareable;
    use std::thread::sleep;
    use strum::IntoEnumIterator;

    fn make_slide(timeout_ms: u64) -> (PneumaticSlide, Shareable<Vec<(String, SlideState)>>)
    {
        let mut slide = PneumaticSlide::new("Gripper",
                                            IoPinConfig::resolved("IOBottom", "GripperValve", 0, 2),
                                            IoPinConfig::resolved("IOTop", "GripperDown", 1, 0),
                                            IoPinConfig::resolved("IOTop", "GripperUp", 1, 1),
                                            timeout_ms);
        let seen = Shareable::new(Vec::new());
        let movable_seen = seen.clone();
        slide.set_state_change_callback(Arc::new(move |name: &str, state| {
            movable_seen.lock().push((name.to_string(), state));
        }));
        (slide, seen)
    }

    fn force_state(slide: &mut PneumaticSlide, state: SlideState)
    {
        match state
        {
            SlideState::Unknown => slide.reset_state(),
            SlideState::Retracted => slide.update_state(false, true),
            SlideState::Extended => slide.update_state(true, false),
            SlideState::Moving => { slide.extend(); }
            SlideState::Error => slide.update_state(true, true)
        }
        assert_eq!(state, slide.state());
    }

    #[test]
    fn state_strings()
    {
        let names: Vec<String> = SlideState::iter().map(|s| s.to_string()).collect();
        assert_eq!(vec!["Unknown", "Retracted (Up)", "Extended (Down)", "Moving", "Error"], names);
    }

    #[test]
    fn new_slide_is_unknown()
    {
        let (slide, seen) = make_slide(5000);
        assert_eq!(SlideState::Unknown, slide.state());
        assert_eq!("Unknown", slide.state_string());
        assert_eq!(5000, slide.timeout_ms());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn sensors_win_over_any_prior_state()
    {
        for prior in SlideState::iter()
        {
            for &(extended, retracted, expected) in [(true, true, SlideState::Error),
                                                     (true, false, SlideState::Extended),
                                                     (false, true, SlideState::Retracted)].iter()
            {
                let (mut slide, _) = make_slide(5000);
                force_state(&mut slide, prior);
                slide.update_state(extended, retracted);
                assert_eq!(expected, slide.state(), "prior state {:?}", prior);
            }
        }
    }

    #[test]
    fn no_sensor_keeps_unknown_and_error()
    {
        let (mut slide, _) = make_slide(5000);
        slide.update_state(false, false);
        assert_eq!(SlideState::Unknown, slide.state());

        force_state(&mut slide, SlideState::Error);
        slide.update_state(false, false);
        assert_eq!(SlideState::Error, slide.state());
    }

    #[test]
    fn leaving_end_position_counts_as_moving()
    {
        let (mut slide, _) = make_slide(5000);
        force_state(&mut slide, SlideState::Extended);
        slide.update_state(false, false);
        assert_eq!(SlideState::Moving, slide.state());

        force_state(&mut slide, SlideState::Retracted);
        slide.update_state(false, false);
        assert_eq!(SlideState::Moving, slide.state());
    }

    #[test]
    fn moving_times_out_into_error()
    {
        let (mut slide, _) = make_slide(100);
        slide.extend();
        slide.update_state(false, false);
        assert_eq!(SlideState::Moving, slide.state());

        sleep(Duration::from_millis(40));
        slide.update_state(false, false);
        assert_eq!(SlideState::Moving, slide.state());

        sleep(Duration::from_millis(80));
        slide.update_state(false, false);
        assert_eq!(SlideState::Error, slide.state());
    }

    #[test]
    fn extend_restarts_the_movement_timer()
    {
        let (mut slide, _) = make_slide(100);
        slide.extend();
        sleep(Duration::from_millis(70));
        slide.retract();
        sleep(Duration::from_millis(70));
        slide.update_state(false, false);
        assert_eq!(SlideState::Moving, slide.state());
    }

    #[test]
    fn callback_fires_once_per_change()
    {
        let (mut slide, seen) = make_slide(5000);
        slide.update_state(true, false);
        slide.update_state(true, false);
        slide.update_state(true, false);
        assert_eq!(vec![("Gripper".to_string(), SlideState::Extended)], *seen.lock());

        slide.retract();
        slide.extend();
        slide.update_state(false, true);
        assert_eq!(3, seen.lock().len());
        assert_eq!(("Gripper".to_string(), SlideState::Retracted), seen.lock()[2]);
    }

    #[test]
    fn reset_clears_error()
    {
        let (mut slide, seen) = make_slide(5000);
        slide.update_state(true, true);
        slide.reset_state();
        assert_eq!(SlideState::Unknown, slide.state());
        assert_eq!(SlideState::Unknown, seen.lock()[1].1);
    }
}
