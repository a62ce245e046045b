use super::event::Event;
use std::sync::{Arc, atomic::{AtomicBool, AtomicU64, Ordering}};
use std::io;
use std::thread::{self, JoinHandle};

/// # Poller
/// Owns a background thread that calls a tick function,
/// then sleeps for the configured interval, until stopped.
///
/// Stopping sets the stop flag and wakes the thread, so
/// stop() does not have to wait out a full interval. The
/// thread is joined on stop() and when the poller is dropped.
pub struct Poller
{
    name: String,
    stop_flag: Arc<AtomicBool>,
    wake: Event,
    interval_ms: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>
}

impl Poller
{
    pub fn new(name: &str, interval_ms: u64) -> Self
    {
        Poller
        {
            name: name.to_string(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Event::new(),
            interval_ms: Arc::new(AtomicU64::new(interval_ms)),
            handle: None
        }
    }

    /// Starts the thread. Returns Ok(false) and does nothing if
    /// the poller is already running, Err if the thread could
    /// not be spawned.
    pub fn start<F>(&mut self, interval_ms: u64, mut tick: F) -> io::Result<bool>
    where F: FnMut() + Send + 'static
    {
        if self.handle.is_some()
        {
            return Ok(false);
        }

        self.interval_ms.store(interval_ms, Ordering::SeqCst);
        self.stop_flag.store(false, Ordering::SeqCst);
        self.wake.reset();

        let stop_flag = self.stop_flag.clone();
        let wake = self.wake.clone();
        let interval = self.interval_ms.clone();
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            while !stop_flag.load(Ordering::SeqCst)
            {
                tick();
                wake.wait_with_timeout(interval.load(Ordering::SeqCst));
            }
        });

        self.handle = Some(spawned?);
        Ok(true)
    }

    /// Signals the thread to stop and joins it. Safe to call
    /// when the poller is not running.
    pub fn stop(&mut self)
    {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
        {
            self.wake.trigger();
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool
    {
        self.handle.is_some() && !self.stop_flag.load(Ordering::SeqCst)
    }

    /// Takes effect after the current sleep.
    pub fn set_interval(&self, interval_ms: u64)
    {
        self.interval_ms.store(interval_ms, Ordering::SeqCst);
    }

    pub fn interval(&self) -> u64
    {
        self.interval_ms.load(Ordering::SeqCst)
    }
}

impl Drop for Poller
{
    fn drop(&mut self)
    {
        self.stop();
    }
}
