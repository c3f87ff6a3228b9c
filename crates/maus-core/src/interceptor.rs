//! Systemwide scroll-wheel interception
//!
//! The OS calls into [`ScrollFilter::on_event`] from its own thread and needs
//! an immediate consume/pass answer. The decision only reads an atomic
//! `enabled` mirror and the event itself; accepted deltas are forwarded to
//! the engine's serial context in arrival order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::Modifier;
use crate::engine::EngineCommand;
use crate::platform::Platform;
use crate::{Error, Result};

/// Keyboard modifiers held while a scroll event was generated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub command: bool,
    pub option: bool,
    pub control: bool,
    pub shift: bool,
}

impl Modifiers {
    pub fn holds(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Command => self.command,
            Modifier::Option => self.option,
            Modifier::Control => self.control,
            Modifier::Shift => self.shift,
        }
    }

    /// Every modifier of a non-empty set is held
    pub fn holds_all(&self, set: &[Modifier]) -> bool {
        !set.is_empty() && set.iter().all(|m| self.holds(*m))
    }
}

/// Platform-neutral view of one incoming wheel event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollEvent {
    /// Primary (vertical) axis delta
    pub delta: i64,
    /// Trackpad-style continuous stream
    pub continuous: bool,
    /// Posted by this engine
    pub synthetic: bool,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    Disabled,
    Continuous,
    Synthetic,
    Modifier,
    ZeroDelta,
    EngineGone,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    PassThrough(PassReason),
    Suppress { delta: f64 },
}

/// Answer returned to the OS filter chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapVerdict {
    /// Swallow the original event
    Consume,
    /// Hand the original event on unmodified
    Pass,
}

/// Decide what happens to one event. The order of the checks is part of
/// the contract: continuous and modifier-held events are never captured.
pub fn decide(enabled: bool, event: &ScrollEvent, passthrough: &[Modifier]) -> FilterDecision {
    if !enabled {
        return FilterDecision::PassThrough(PassReason::Disabled);
    }
    if event.continuous {
        return FilterDecision::PassThrough(PassReason::Continuous);
    }
    if event.synthetic {
        return FilterDecision::PassThrough(PassReason::Synthetic);
    }
    if event.modifiers.holds_all(passthrough) {
        return FilterDecision::PassThrough(PassReason::Modifier);
    }
    if event.delta == 0 {
        return FilterDecision::PassThrough(PassReason::ZeroDelta);
    }
    FilterDecision::Suppress {
        delta: event.delta as f64,
    }
}

/// Counters updated from the OS callback thread
#[derive(Debug, Default)]
pub struct FilterStats {
    intercepted: AtomicU64,
    passed: AtomicU64,
}

impl FilterStats {
    pub fn intercepted(&self) -> u64 {
        self.intercepted.load(Ordering::Relaxed)
    }

    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }
}

/// Handler object bound to one engine instance at tap registration
#[derive(Debug)]
pub struct ScrollFilter {
    enabled: Arc<AtomicBool>,
    live: AtomicBool,
    passthrough: Vec<Modifier>,
    commands: mpsc::UnboundedSender<EngineCommand>,
    stats: Arc<FilterStats>,
}

impl ScrollFilter {
    pub fn new(
        enabled: Arc<AtomicBool>,
        passthrough: Vec<Modifier>,
        commands: mpsc::UnboundedSender<EngineCommand>,
        stats: Arc<FilterStats>,
    ) -> Self {
        Self {
            enabled,
            live: AtomicBool::new(true),
            passthrough,
            commands,
            stats,
        }
    }

    /// Called by the platform for every scroll event; never blocks
    pub fn on_event(&self, event: &ScrollEvent) -> TapVerdict {
        let enabled = self.live.load(Ordering::Acquire) && self.enabled.load(Ordering::Acquire);

        let decision = match decide(enabled, event, &self.passthrough) {
            FilterDecision::Suppress { delta } => {
                let command = EngineCommand::Scroll {
                    delta,
                    at: Instant::now(),
                };
                if self.commands.send(command).is_ok() {
                    FilterDecision::Suppress { delta }
                } else {
                    FilterDecision::PassThrough(PassReason::EngineGone)
                }
            }
            pass => pass,
        };

        trace!(?decision, "scroll filter");
        match decision {
            FilterDecision::Suppress { .. } => {
                self.stats.intercepted.fetch_add(1, Ordering::Relaxed);
                TapVerdict::Consume
            }
            FilterDecision::PassThrough(_) => {
                self.stats.passed.fetch_add(1, Ordering::Relaxed);
                TapVerdict::Pass
            }
        }
    }

    /// Stop accepting events; later callbacks pass everything through
    pub fn revoke(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// An installed OS event tap
pub trait TapGuard: Send {
    /// Remove the tap. Must be idempotent and must not return before the
    /// OS has stopped delivering callbacks.
    fn uninstall(&mut self);
}

/// Owns the OS tap for the engine service
pub struct Interceptor {
    platform: Arc<dyn Platform>,
    tap: Option<Box<dyn TapGuard>>,
    filter: Option<Arc<ScrollFilter>>,
}

impl Interceptor {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            tap: None,
            filter: None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.tap.is_some()
    }

    /// Install the tap with `filter` as its handler
    ///
    /// Fails with `PermissionDenied` without asking the OS when the
    /// capability is not granted. Installing twice keeps the first tap.
    pub fn install(&mut self, granted: bool, filter: Arc<ScrollFilter>) -> Result<()> {
        if self.is_installed() {
            return Ok(());
        }
        if !granted {
            return Err(Error::PermissionDenied);
        }

        let tap = self.platform.install_scroll_tap(Arc::clone(&filter))?;
        info!("Scroll event tap installed ({})", self.platform.name());
        self.tap = Some(tap);
        self.filter = Some(filter);
        Ok(())
    }

    /// Remove the tap if present
    pub fn uninstall(&mut self) {
        if let Some(filter) = self.filter.take() {
            filter.revoke();
        }
        if let Some(mut tap) = self.tap.take() {
            tap.uninstall();
            info!("Scroll event tap removed");
        } else {
            debug!("Scroll event tap already removed");
        }
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;

    fn wheel(delta: i64) -> ScrollEvent {
        ScrollEvent {
            delta,
            ..Default::default()
        }
    }

    fn command_held() -> Modifiers {
        Modifiers {
            command: true,
            ..Default::default()
        }
    }

    fn filter(
        enabled: bool,
    ) -> (
        ScrollFilter,
        mpsc::UnboundedReceiver<EngineCommand>,
        Arc<FilterStats>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(FilterStats::default());
        let filter = ScrollFilter::new(
            Arc::new(AtomicBool::new(enabled)),
            vec![Modifier::Command],
            tx,
            Arc::clone(&stats),
        );
        (filter, rx, stats)
    }

    #[test]
    fn test_decide_order() {
        let passthrough = [Modifier::Command];

        assert_eq!(
            decide(false, &wheel(3), &passthrough),
            FilterDecision::PassThrough(PassReason::Disabled)
        );

        let trackpad = ScrollEvent {
            continuous: true,
            modifiers: command_held(),
            ..wheel(0)
        };
        assert_eq!(
            decide(true, &trackpad, &passthrough),
            FilterDecision::PassThrough(PassReason::Continuous)
        );

        let zoom = ScrollEvent {
            modifiers: command_held(),
            ..wheel(0)
        };
        assert_eq!(
            decide(true, &zoom, &passthrough),
            FilterDecision::PassThrough(PassReason::Modifier)
        );

        assert_eq!(
            decide(true, &wheel(0), &passthrough),
            FilterDecision::PassThrough(PassReason::ZeroDelta)
        );
        assert_eq!(
            decide(true, &wheel(-4), &passthrough),
            FilterDecision::Suppress { delta: -4.0 }
        );
    }

    #[test]
    fn test_continuous_and_modifier_never_suppressed() {
        let passthrough = [Modifier::Command];
        for enabled in [false, true] {
            for delta in [-120, -1, 0, 1, 120] {
                let trackpad = ScrollEvent {
                    continuous: true,
                    ..wheel(delta)
                };
                let held = ScrollEvent {
                    modifiers: command_held(),
                    ..wheel(delta)
                };
                assert!(matches!(
                    decide(enabled, &trackpad, &passthrough),
                    FilterDecision::PassThrough(_)
                ));
                assert!(matches!(
                    decide(enabled, &held, &passthrough),
                    FilterDecision::PassThrough(_)
                ));
            }
        }
    }

    #[test]
    fn test_synthetic_events_pass() {
        let own = ScrollEvent {
            synthetic: true,
            ..wheel(5)
        };
        assert_eq!(
            decide(true, &own, &[]),
            FilterDecision::PassThrough(PassReason::Synthetic)
        );
    }

    #[test]
    fn test_modifier_set_semantics() {
        let shift_only = Modifiers {
            shift: true,
            ..Default::default()
        };
        assert!(!shift_only.holds_all(&[]));
        assert!(shift_only.holds_all(&[Modifier::Shift]));
        assert!(!shift_only.holds_all(&[Modifier::Shift, Modifier::Command]));

        // Empty passthrough set never bypasses
        assert_eq!(
            decide(true, &ScrollEvent { modifiers: shift_only, ..wheel(2) }, &[]),
            FilterDecision::Suppress { delta: 2.0 }
        );
    }

    #[test]
    fn test_filter_forwards_in_order() {
        let (filter, mut rx, stats) = filter(true);

        for delta in [1, -2, 3] {
            assert_eq!(filter.on_event(&wheel(delta)), TapVerdict::Consume);
        }
        assert_eq!(filter.on_event(&wheel(0)), TapVerdict::Pass);

        let mut received = Vec::new();
        while let Ok(EngineCommand::Scroll { delta, .. }) = rx.try_recv() {
            received.push(delta);
        }
        assert_eq!(received, vec![1.0, -2.0, 3.0]);
        assert_eq!(stats.intercepted(), 3);
        assert_eq!(stats.passed(), 1);
    }

    #[test]
    fn test_filter_disabled_passes() {
        let (filter, mut rx, _) = filter(false);
        assert_eq!(filter.on_event(&wheel(5)), TapVerdict::Pass);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_revoked_filter_passes() {
        let (filter, mut rx, _) = filter(true);
        filter.revoke();
        assert!(!filter.is_live());
        assert_eq!(filter.on_event(&wheel(5)), TapVerdict::Pass);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_engine_gone_passes() {
        let (filter, rx, stats) = filter(true);
        drop(rx);
        assert_eq!(filter.on_event(&wheel(5)), TapVerdict::Pass);
        assert_eq!(stats.intercepted(), 0);
    }

    #[test]
    fn test_install_requires_capability() {
        let platform = Arc::new(MockPlatform::new());
        let mut interceptor = Interceptor::new(platform.clone());
        let (filter, _rx, _) = filter(true);
        let filter = Arc::new(filter);

        let result = interceptor.install(false, Arc::clone(&filter));
        assert!(matches!(result, Err(Error::PermissionDenied)));
        assert!(!interceptor.is_installed());
        assert_eq!(platform.installs(), 0);
    }

    #[test]
    fn test_install_failure_reported() {
        let platform = Arc::new(MockPlatform::new());
        platform.set_fail_install(true);
        let mut interceptor = Interceptor::new(platform.clone());
        let (filter, _rx, _) = filter(true);

        let result = interceptor.install(true, Arc::new(filter));
        assert!(matches!(result, Err(Error::HookInstallFailed(_))));
        assert!(!interceptor.is_installed());
    }

    #[test]
    fn test_uninstall_idempotent_and_revokes() {
        let platform = Arc::new(MockPlatform::new());
        let mut interceptor = Interceptor::new(platform.clone());
        let (filter, _rx, _) = filter(true);
        let filter = Arc::new(filter);

        interceptor.install(true, Arc::clone(&filter)).unwrap();
        interceptor.install(true, Arc::clone(&filter)).unwrap();
        assert_eq!(platform.installs(), 1);

        interceptor.uninstall();
        interceptor.uninstall();
        assert_eq!(platform.uninstalls(), 1);
        assert!(!filter.is_live());
    }

    #[test]
    fn test_drop_uninstalls() {
        let platform = Arc::new(MockPlatform::new());
        {
            let mut interceptor = Interceptor::new(platform.clone());
            let (filter, _rx, _) = filter(true);
            interceptor.install(true, Arc::new(filter)).unwrap();
        }
        assert_eq!(platform.uninstalls(), 1);
    }
}
