//! In-memory platform for tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{FrameCallback, Platform};
use crate::frame_clock::FrameSource;
use crate::interceptor::{ScrollEvent, ScrollFilter, TapGuard, TapVerdict};
use crate::{Error, Result};

#[derive(Default)]
struct Shared {
    trusted: AtomicBool,
    fail_install: AtomicBool,
    fail_display_link: AtomicBool,
    fail_processes: AtomicBool,
    installs: AtomicUsize,
    uninstalls: AtomicUsize,
    prompts: AtomicUsize,
    frame_starts: AtomicUsize,
    frame_stops: AtomicUsize,
    posted: Mutex<Vec<i32>>,
    processes: Mutex<Vec<String>>,
    filter: Mutex<Option<Arc<ScrollFilter>>>,
    on_frame: Mutex<Option<FrameCallback>>,
}

/// Records everything the engine asks of the OS
#[derive(Clone, Default)]
pub(crate) struct MockPlatform {
    shared: Arc<Shared>,
}

impl MockPlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn trusted() -> Self {
        let platform = Self::new();
        platform.set_trusted(true);
        platform
    }

    pub(crate) fn set_trusted(&self, trusted: bool) {
        self.shared.trusted.store(trusted, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_install(&self, fail: bool) {
        self.shared.fail_install.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_display_link(&self, fail: bool) {
        self.shared.fail_display_link.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_processes(&self, fail: bool) {
        self.shared.fail_processes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_processes(&self, processes: &[&str]) {
        *self.shared.processes.lock().unwrap() =
            processes.iter().map(|p| p.to_string()).collect();
    }

    pub(crate) fn installs(&self) -> usize {
        self.shared.installs.load(Ordering::SeqCst)
    }

    pub(crate) fn uninstalls(&self) -> usize {
        self.shared.uninstalls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> usize {
        self.shared.prompts.load(Ordering::SeqCst)
    }

    pub(crate) fn frame_starts(&self) -> usize {
        self.shared.frame_starts.load(Ordering::SeqCst)
    }

    pub(crate) fn frame_stops(&self) -> usize {
        self.shared.frame_stops.load(Ordering::SeqCst)
    }

    pub(crate) fn posted(&self) -> Vec<i32> {
        self.shared.posted.lock().unwrap().clone()
    }

    /// Deliver an event through the installed tap, as the OS would
    pub(crate) fn deliver(&self, event: ScrollEvent) -> TapVerdict {
        let filter = self.shared.filter.lock().unwrap().clone();
        match filter {
            Some(filter) => filter.on_event(&event),
            None => TapVerdict::Pass,
        }
    }

    /// Fire the frame callback once, as the display link would
    pub(crate) fn fire_frame(&self) {
        let on_frame = self.shared.on_frame.lock().unwrap().clone();
        if let Some(on_frame) = on_frame {
            on_frame();
        }
    }
}

impl Platform for MockPlatform {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_trusted(&self) -> bool {
        self.shared.trusted.load(Ordering::SeqCst)
    }

    fn request_trust(&self) -> bool {
        self.shared.prompts.fetch_add(1, Ordering::SeqCst);
        self.is_trusted()
    }

    fn install_scroll_tap(&self, filter: Arc<ScrollFilter>) -> Result<Box<dyn TapGuard>> {
        if self.shared.fail_install.load(Ordering::SeqCst) {
            return Err(Error::HookInstallFailed("mock refused".to_string()));
        }
        self.shared.installs.fetch_add(1, Ordering::SeqCst);
        *self.shared.filter.lock().unwrap() = Some(filter);
        Ok(Box::new(MockTap {
            shared: Arc::clone(&self.shared),
            installed: true,
        }))
    }

    fn post_scroll(&self, pixels: i32) -> Result<()> {
        self.shared.posted.lock().unwrap().push(pixels);
        Ok(())
    }

    fn display_link(&self, on_frame: FrameCallback) -> Option<Box<dyn FrameSource>> {
        *self.shared.on_frame.lock().unwrap() = Some(on_frame);
        Some(Box::new(MockFrameSource {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn running_processes(&self) -> Result<Vec<String>> {
        if self.shared.fail_processes.load(Ordering::SeqCst) {
            return Err(Error::Other("mock process listing failed".to_string()));
        }
        Ok(self.shared.processes.lock().unwrap().clone())
    }
}

struct MockTap {
    shared: Arc<Shared>,
    installed: bool,
}

impl TapGuard for MockTap {
    fn uninstall(&mut self) {
        if !self.installed {
            return;
        }
        self.installed = false;
        self.shared.uninstalls.fetch_add(1, Ordering::SeqCst);
        *self.shared.filter.lock().unwrap() = None;
    }
}

struct MockFrameSource {
    shared: Arc<Shared>,
}

impl FrameSource for MockFrameSource {
    fn start(&mut self) -> Result<()> {
        if self.shared.fail_display_link.load(Ordering::SeqCst) {
            return Err(Error::Other("mock display link refused".to_string()));
        }
        self.shared.frame_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.frame_stops.fetch_add(1, Ordering::SeqCst);
    }
}
