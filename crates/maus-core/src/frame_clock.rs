//! Display-synchronized frame clock
//!
//! Runs only while motion is in flight. Each tick invokes the frame
//! callback, which enqueues one unit of work on the engine's serial context.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::FrameClockConfig;
use crate::platform::{FrameCallback, Platform};
use crate::{Error, Result};

/// Something that calls the frame callback periodically while started
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
}

/// Timer-driven frame source for machines without a display link
pub struct IntervalSource {
    interval: Duration,
    on_frame: FrameCallback,
    runtime: Option<Handle>,
    task: Option<JoinHandle<()>>,
}

impl IntervalSource {
    /// Must be created inside a tokio runtime to be startable
    pub fn new(interval: Duration, on_frame: FrameCallback) -> Self {
        Self {
            interval,
            on_frame,
            runtime: Handle::try_current().ok(),
            task: None,
        }
    }
}

impl FrameSource for IntervalSource {
    fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| Error::Other("no tokio runtime for frame timer".to_string()))?;

        let period = self.interval;
        let on_frame = self.on_frame.clone();
        self.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                on_frame();
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for IntervalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Idempotent start/stop wrapper around the best available frame source
pub struct FrameClock {
    source: Box<dyn FrameSource>,
    display_synced: bool,
    fallback_interval: Duration,
    on_frame: FrameCallback,
    running: bool,
}

impl FrameClock {
    pub fn new(platform: &dyn Platform, config: &FrameClockConfig, on_frame: FrameCallback) -> Self {
        let fallback_interval = config.fallback_interval();
        let (source, display_synced) = match platform.display_link(on_frame.clone()) {
            Some(link) => (link, true),
            None => {
                debug!(
                    "No display link, frame clock uses a {:?} timer",
                    fallback_interval
                );
                let timer: Box<dyn FrameSource> =
                    Box::new(IntervalSource::new(fallback_interval, on_frame.clone()));
                (timer, false)
            }
        };

        Self {
            source,
            display_synced,
            fallback_interval,
            on_frame,
            running: false,
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_display_synced(&self) -> bool {
        self.display_synced
    }

    /// Start ticking. Returns true if the clock was idle before.
    pub fn start(&mut self) -> Result<bool> {
        if self.running {
            return Ok(false);
        }

        if let Err(e) = self.source.start() {
            if !self.display_synced {
                return Err(e);
            }
            warn!("Display link failed to start ({}), falling back to timer", e);
            self.source.stop();
            self.source = Box::new(IntervalSource::new(
                self.fallback_interval,
                self.on_frame.clone(),
            ));
            self.display_synced = false;
            self.source.start()?;
        }

        self.running = true;
        Ok(true)
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.source.stop();
        self.running = false;
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, FrameCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = Arc::clone(&count);
        let callback: FrameCallback = Arc::new(move || {
            clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn test_start_stop_idempotent() {
        let platform = MockPlatform::new();
        let (_, callback) = counter();
        let mut clock = FrameClock::new(&platform, &FrameClockConfig::default(), callback);
        assert!(clock.is_display_synced());

        assert!(clock.start().unwrap());
        assert!(!clock.start().unwrap());
        assert!(clock.is_running());
        assert_eq!(platform.frame_starts(), 1);

        clock.stop();
        clock.stop();
        assert!(!clock.is_running());
        assert_eq!(platform.frame_stops(), 1);
    }

    #[test]
    fn test_display_link_failure_falls_back() {
        let platform = MockPlatform::new();
        platform.set_fail_display_link(true);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = rt.enter();

        let (_, callback) = counter();
        let mut clock = FrameClock::new(&platform, &FrameClockConfig::default(), callback);
        assert!(clock.start().unwrap());
        assert!(!clock.is_display_synced());
        assert!(clock.is_running());
    }

    #[test]
    fn test_interval_source_without_runtime_fails() {
        let (_, callback) = counter();
        let mut source = IntervalSource::new(Duration::from_millis(16), callback);
        assert!(source.start().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_source_ticks_until_stopped() {
        let (count, callback) = counter();
        let mut source = IntervalSource::new(Duration::from_millis(10), callback);
        source.start().unwrap();

        tokio::time::sleep(Duration::from_millis(55)).await;
        let ticks = count.load(Ordering::SeqCst);
        assert!((4..=6).contains(&ticks), "ticks = {}", ticks);

        source.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }
}
