use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// # Event
/// An auto-resetting signal. A trigger that happens while
/// nobody waits is kept until the next wait consumes it.
pub struct Event
{
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Event
{
    pub fn new() -> Self
    {
        Event
        {
            state: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn reset(&self)
    {
        let (mtx, _) = &*self.state;
        *mtx.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Waits until the event is triggered or the timeout passes.
    /// Returns true if the event was triggered.
    pub fn wait_with_timeout(&self, millis: u64) -> bool
    {
        let (mtx, cvar) = &*self.state;
        let guard = mtx.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut triggered, _) = cvar
            .wait_timeout_while(guard, Duration::from_millis(millis), |t| !*t)
            .unwrap_or_else(PoisonError::into_inner);

        let was_triggered = *triggered;
        *triggered = false;
        was_triggered
    }

    pub fn trigger(&self)
    {
        let (mtx, cvar) = &*self.state;
        *mtx.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }
}

impl Default for Event
{
    fn default() -> Self
    {
        Event::new()
    }
}

impl Clone for Event
{
    fn clone(&self) -> Self
    {
        Event
        {
            state: self.state.clone()
        }
    }
}
