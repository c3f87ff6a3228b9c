use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use super::command::{EngineCommand, EngineHandle, EngineStatus};
use crate::capability::{CapabilityChange, CapabilityGate};
use crate::config::AppConfig;
use crate::conflict::ConflictGuard;
use crate::emitter::EventEmitter;
use crate::frame_clock::FrameClock;
use crate::interceptor::{FilterStats, Interceptor, ScrollFilter};
use crate::motion::MotionEngine;
use crate::platform::{FrameCallback, Platform};
use crate::{Error, Result};

/// The OS updates its trust database asynchronously after a prompt
const PROMPT_RECHECK_DELAY: Duration = Duration::from_secs(1);

/// Owns every piece of engine state; runs as one tokio task
pub struct EngineService {
    config: Arc<AppConfig>,
    platform: Arc<dyn Platform>,
    motion: MotionEngine,
    interceptor: Interceptor,
    clock: FrameClock,
    emitter: EventEmitter,
    capability: CapabilityGate,
    conflict: ConflictGuard,
    /// Mirror read by the OS callback thread
    enabled: Arc<AtomicBool>,
    filter_stats: Arc<FilterStats>,
    permission_alert: bool,
    conflict_detected: bool,
    last_error: Option<String>,
    frames_advanced: u64,
    started_at: DateTime<Utc>,
    /// Set while a Tick is queued, so a stalled service sees one, not a backlog
    tick_queued: Arc<AtomicBool>,
    commands_tx: mpsc::UnboundedSender<EngineCommand>,
    commands_rx: Option<mpsc::UnboundedReceiver<EngineCommand>>,
    status_tx: watch::Sender<EngineStatus>,
}

impl EngineService {
    /// Build the engine. Must run inside a tokio runtime when the platform
    /// has no display link, or the timer fallback cannot start.
    pub fn new(config: Arc<AppConfig>, platform: Arc<dyn Platform>) -> (Self, EngineHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let tick_queued = Arc::new(AtomicBool::new(false));

        let on_frame: FrameCallback = {
            let commands = commands_tx.clone();
            let tick_queued = Arc::clone(&tick_queued);
            Arc::new(move || {
                if tick_queued.swap(true, Ordering::AcqRel) {
                    return;
                }
                if commands
                    .send(EngineCommand::Tick { at: Instant::now() })
                    .is_err()
                {
                    tick_queued.store(false, Ordering::Release);
                }
            })
        };

        let clock = FrameClock::new(platform.as_ref(), &config.frame_clock, on_frame);
        let capability = CapabilityGate::new(Arc::clone(&platform));
        let emitter = EventEmitter::new(
            Arc::clone(&platform),
            config.engine.direction_multiplier(),
        );

        let service = Self {
            motion: MotionEngine::new(&config.engine),
            interceptor: Interceptor::new(Arc::clone(&platform)),
            clock,
            emitter,
            capability,
            conflict: ConflictGuard::new(&config.conflict.process_tokens),
            enabled: Arc::new(AtomicBool::new(false)),
            filter_stats: Arc::new(FilterStats::default()),
            permission_alert: false,
            conflict_detected: false,
            last_error: None,
            frames_advanced: 0,
            started_at: Utc::now(),
            tick_queued,
            commands_tx: commands_tx.clone(),
            commands_rx: Some(commands_rx),
            status_tx: watch::Sender::new(EngineStatus::default()),
            config,
            platform,
        };
        service.publish();

        let handle = EngineHandle::new(commands_tx, service.status_tx.subscribe());
        (service, handle)
    }

    /// Run until the shutdown signal fires or a Shutdown command arrives
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let Some(mut commands) = self.commands_rx.take() else {
            error!("Engine service started twice");
            return;
        };

        self.startup();

        let poll_every = self.config.capability.poll_interval();
        info!(
            "Engine started on {} (capability poll {:?}, display synced: {})",
            self.platform.name(),
            poll_every,
            self.clock.is_display_synced()
        );

        let mut poll = tokio::time::interval(poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first tick (fires immediately)
        poll.tick().await;

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Engine received shutdown signal");
                        break;
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command) {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                _ = poll.tick() => {
                    self.poll_capability();
                }
            }
        }

        self.teardown();
    }

    /// Conflict check, then the configured initial state
    fn startup(&mut self) {
        if self.conflict.has_conflict(self.platform.as_ref()) {
            self.conflict_detected = true;
            self.last_error = Some(Error::ConflictDetected.to_string());
            info!("Smoothing left disabled because another scroll utility is running");
        } else if self.config.general.enable_on_start {
            if let Err(e) = self.enable() {
                warn!("Could not enable smoothing on start: {}", e);
            }
        }
        self.publish();
    }

    fn teardown(&mut self) {
        self.disable();
        self.publish();
        info!("Engine stopped");
    }

    /// Handle one command. Returns false when the service should stop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::Scroll { delta, at } => self.on_scroll(delta, at),
            EngineCommand::Tick { at } => self.on_tick(at),
            EngineCommand::SetEnabled { enabled, reply } => {
                self.on_activation();
                let result = if enabled {
                    self.enable()
                } else {
                    self.disable();
                    Ok(())
                };
                self.publish();
                let _ = reply.send(result.map(|_| self.snapshot()));
            }
            EngineCommand::RequestPermission { reply } => {
                let change = self.capability.request();
                self.apply_capability(change);
                self.schedule_recheck();
                self.publish();
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::RecheckCapability => self.poll_capability(),
            EngineCommand::Status { reply } => {
                self.poll_capability();
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::Shutdown => {
                debug!("Engine received shutdown command");
                return false;
            }
        }
        true
    }

    fn on_scroll(&mut self, delta: f64, at: Instant) {
        if !self.interceptor.is_installed() {
            trace!(delta, "dropping delta that arrived after disable");
            return;
        }
        if !self.motion.add_impulse(delta) {
            debug!(delta, "dropping non-finite impulse");
            return;
        }
        if self.clock.is_running() {
            return;
        }
        if !self.motion.is_pending() {
            // Too small to move anything; idle state stays exactly zero
            self.motion.reset();
            return;
        }

        match self.clock.start() {
            Ok(_) => {
                self.motion.mark_started(at);
                self.publish();
            }
            Err(e) => {
                error!("Frame clock failed to start: {}", e);
                self.last_error = Some(e.to_string());
                self.motion.reset();
                self.publish();
            }
        }
    }

    fn on_tick(&mut self, at: Instant) {
        self.tick_queued.store(false, Ordering::Release);
        if !self.clock.is_running() {
            return;
        }

        let outcome = self.motion.advance_to(at);
        self.frames_advanced += 1;
        if outcome.pixels != 0 {
            self.emitter.emit(outcome.pixels);
        }

        if outcome.settled {
            self.clock.stop();
            debug!(frames = self.frames_advanced, "motion settled");
            self.publish();
        }
    }

    /// A client request counts as the user interacting with the front end
    fn on_activation(&mut self) {
        let change = self.capability.refresh();
        self.apply_capability(change);
    }

    fn poll_capability(&mut self) {
        let change = self.capability.refresh();
        if change != CapabilityChange::Unchanged {
            self.apply_capability(change);
            self.publish();
        }
    }

    fn apply_capability(&mut self, change: CapabilityChange) {
        match change {
            CapabilityChange::Unchanged => {}
            CapabilityChange::Granted => {
                self.permission_alert = false;
            }
            CapabilityChange::Revoked => {
                if self.enabled.load(Ordering::Acquire) {
                    warn!("Accessibility permission revoked, disabling smoothing");
                    self.disable();
                    self.permission_alert = true;
                }
            }
        }
    }

    fn schedule_recheck(&self) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let commands = self.commands_tx.clone();
        runtime.spawn(async move {
            tokio::time::sleep(PROMPT_RECHECK_DELAY).await;
            let _ = commands.send(EngineCommand::RecheckCapability);
        });
    }

    fn enable(&mut self) -> Result<()> {
        if self.interceptor.is_installed() {
            return Ok(());
        }

        let filter = Arc::new(ScrollFilter::new(
            Arc::clone(&self.enabled),
            self.config.engine.passthrough_modifiers.clone(),
            self.commands_tx.clone(),
            Arc::clone(&self.filter_stats),
        ));

        match self
            .interceptor
            .install(self.capability.is_granted(), filter)
        {
            Ok(()) => {
                self.enabled.store(true, Ordering::Release);
                self.last_error = None;
                info!("Smooth scrolling enabled");
                Ok(())
            }
            Err(e) => {
                self.enabled.store(false, Ordering::Release);
                warn!("Smooth scrolling not enabled: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn disable(&mut self) {
        let was_enabled = self.enabled.swap(false, Ordering::AcqRel);
        self.interceptor.uninstall();
        self.clock.stop();
        self.motion.reset();
        if was_enabled {
            info!("Smooth scrolling disabled");
        }
    }

    fn snapshot(&self) -> EngineStatus {
        EngineStatus {
            enabled: self.enabled.load(Ordering::Acquire),
            hook_installed: self.interceptor.is_installed(),
            clock_running: self.clock.is_running(),
            display_synced: self.clock.is_display_synced(),
            capability_granted: self.capability.is_granted(),
            permission_alert: self.permission_alert,
            conflict_detected: self.conflict_detected,
            last_error: self.last_error.clone(),
            started_at: self.started_at,
            events_intercepted: self.filter_stats.intercepted(),
            events_passed: self.filter_stats.passed(),
            frames_advanced: self.frames_advanced,
            pixels_emitted: self.emitter.pixels_emitted(),
            emit_failures: self.emitter.failures(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }
}
