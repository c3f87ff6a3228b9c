//! macOS backend: CoreGraphics event tap, CoreVideo display link and the
//! Accessibility trust query, through raw framework FFI.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use tracing::{debug, error, warn};

use super::{FrameCallback, Platform};
use crate::frame_clock::FrameSource;
use crate::interceptor::{Modifiers, ScrollEvent, ScrollFilter, TapGuard, TapVerdict};
use crate::{Error, Result};

// ============================================================================
// FFI Declarations
// ============================================================================

type CFTypeRef = *const c_void;
type CFStringRef = *const c_void;
type CFDictionaryRef = *const c_void;
type CFAllocatorRef = *const c_void;
type CFMachPortRef = *mut c_void;
type CFRunLoopRef = *mut c_void;
type CFRunLoopSourceRef = *mut c_void;
type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;

type CGEventTapCallBack = unsafe extern "C" fn(
    proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef;

#[repr(C)]
struct CFDictionaryKeyCallBacks {
    version: isize,
    retain: *const c_void,
    release: *const c_void,
    copy_description: *const c_void,
    equal: *const c_void,
    hash: *const c_void,
}

#[repr(C)]
struct CFDictionaryValueCallBacks {
    version: isize,
    retain: *const c_void,
    release: *const c_void,
    copy_description: *const c_void,
    equal: *const c_void,
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    static kCFRunLoopCommonModes: CFStringRef;
    static kCFRunLoopDefaultMode: CFStringRef;
    static kCFBooleanTrue: CFTypeRef;
    static kCFBooleanFalse: CFTypeRef;
    static kCFTypeDictionaryKeyCallBacks: CFDictionaryKeyCallBacks;
    static kCFTypeDictionaryValueCallBacks: CFDictionaryValueCallBacks;

    fn CFRelease(cf: CFTypeRef);
    fn CFDictionaryCreate(
        allocator: CFAllocatorRef,
        keys: *const *const c_void,
        values: *const *const c_void,
        count: isize,
        key_callbacks: *const CFDictionaryKeyCallBacks,
        value_callbacks: *const CFDictionaryValueCallBacks,
    ) -> CFDictionaryRef;
    fn CFMachPortCreateRunLoopSource(
        allocator: CFAllocatorRef,
        port: CFMachPortRef,
        order: isize,
    ) -> CFRunLoopSourceRef;
    fn CFMachPortInvalidate(port: CFMachPortRef);
    fn CFRunLoopGetCurrent() -> CFRunLoopRef;
    fn CFRunLoopAddSource(run_loop: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);
    fn CFRunLoopRunInMode(mode: CFStringRef, seconds: f64, return_after_source_handled: u8) -> i32;
    fn CFRunLoopStop(run_loop: CFRunLoopRef);
}

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventSetIntegerValueField(event: CGEventRef, field: u32, value: i64);
    fn CGEventGetFlags(event: CGEventRef) -> u64;
    fn CGEventCreateScrollWheelEvent2(
        source: *const c_void,
        units: u32,
        wheel_count: u32,
        wheel1: i32,
        wheel2: i32,
        wheel3: i32,
    ) -> CGEventRef;
    fn CGEventPost(tap: u32, event: CGEventRef);
}

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    static kAXTrustedCheckOptionPrompt: CFStringRef;

    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> u8;
}

// CVDisplayLink FFI
type CVDisplayLinkRef = *mut c_void;
type CVReturn = i32;
type CVOptionFlags = u64;

/// `CVTimeStamp` structure for display link callbacks.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CVTimeStamp {
    version: u32,
    video_time_scale: i32,
    video_time: i64,
    host_time: u64,
    rate_scalar: f64,
    video_refresh_period: i64,
    smpte_time: [u8; 24],
    flags: u64,
    reserved: u64,
}

type CVDisplayLinkOutputCallback = unsafe extern "C" fn(
    display_link: CVDisplayLinkRef,
    in_now: *const CVTimeStamp,
    in_output_time: *const CVTimeStamp,
    flags_in: CVOptionFlags,
    flags_out: *mut CVOptionFlags,
    context: *mut c_void,
) -> CVReturn;

#[link(name = "CoreVideo", kind = "framework")]
extern "C" {
    fn CVDisplayLinkCreateWithActiveCGDisplays(display_link_out: *mut CVDisplayLinkRef) -> CVReturn;
    fn CVDisplayLinkSetOutputCallback(
        display_link: CVDisplayLinkRef,
        callback: CVDisplayLinkOutputCallback,
        user_info: *mut c_void,
    ) -> CVReturn;
    fn CVDisplayLinkStart(display_link: CVDisplayLinkRef) -> CVReturn;
    fn CVDisplayLinkStop(display_link: CVDisplayLinkRef) -> CVReturn;
    fn CVDisplayLinkRelease(display_link: CVDisplayLinkRef);
}

// ============================================================================
// Constants
// ============================================================================

const K_CG_SESSION_EVENT_TAP: u32 = 1;
const K_CG_HID_EVENT_TAP: u32 = 0;
const K_CG_HEAD_INSERT_EVENT_TAP: u32 = 0;
const K_CG_EVENT_TAP_OPTION_DEFAULT: u32 = 0;

const K_CG_EVENT_SCROLL_WHEEL: u32 = 22;
const K_CG_EVENT_TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
const K_CG_EVENT_TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

const K_CG_EVENT_SOURCE_USER_DATA: u32 = 42;
const K_CG_SCROLL_WHEEL_EVENT_IS_CONTINUOUS: u32 = 88;
const K_CG_SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_1: u32 = 96;
const K_CG_SCROLL_EVENT_UNIT_PIXEL: u32 = 0;

const K_CG_EVENT_FLAG_MASK_SHIFT: u64 = 0x0002_0000;
const K_CG_EVENT_FLAG_MASK_CONTROL: u64 = 0x0004_0000;
const K_CG_EVENT_FLAG_MASK_ALTERNATE: u64 = 0x0008_0000;
const K_CG_EVENT_FLAG_MASK_COMMAND: u64 = 0x0010_0000;

/// Stamped into the user-data field of every event we post ("maus")
const SYNTHETIC_MARKER: i64 = 0x6D61_7573;

/// How long the tap thread sleeps in its run loop between stop checks
const RUN_LOOP_SLICE_SECS: f64 = 0.25;

#[derive(Debug, Default)]
pub struct MacPlatform;

impl MacPlatform {
    pub fn new() -> Self {
        Self
    }
}

fn trusted_with_prompt(prompt: bool) -> bool {
    // SAFETY: the dictionary holds two immortal CF constants and is
    // released before returning.
    unsafe {
        let keys = [kAXTrustedCheckOptionPrompt];
        let values = [if prompt { kCFBooleanTrue } else { kCFBooleanFalse }];
        let options = CFDictionaryCreate(
            std::ptr::null(),
            keys.as_ptr(),
            values.as_ptr(),
            1,
            &kCFTypeDictionaryKeyCallBacks,
            &kCFTypeDictionaryValueCallBacks,
        );
        if options.is_null() {
            return false;
        }
        let trusted = AXIsProcessTrustedWithOptions(options) != 0;
        CFRelease(options);
        trusted
    }
}

impl Platform for MacPlatform {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn is_trusted(&self) -> bool {
        trusted_with_prompt(false)
    }

    fn request_trust(&self) -> bool {
        trusted_with_prompt(true)
    }

    fn install_scroll_tap(&self, filter: Arc<ScrollFilter>) -> Result<Box<dyn TapGuard>> {
        Ok(Box::new(MacTap::install(filter)?))
    }

    fn post_scroll(&self, pixels: i32) -> Result<()> {
        // SAFETY: the event is created, posted and released on this thread.
        unsafe {
            let event = CGEventCreateScrollWheelEvent2(
                std::ptr::null(),
                K_CG_SCROLL_EVENT_UNIT_PIXEL,
                1,
                pixels,
                0,
                0,
            );
            if event.is_null() {
                return Err(Error::Other("CGEventCreateScrollWheelEvent2 failed".to_string()));
            }
            CGEventSetIntegerValueField(event, K_CG_EVENT_SOURCE_USER_DATA, SYNTHETIC_MARKER);
            CGEventPost(K_CG_HID_EVENT_TAP, event);
            CFRelease(event);
        }
        Ok(())
    }

    fn display_link(&self, on_frame: FrameCallback) -> Option<Box<dyn FrameSource>> {
        match DisplayLinkSource::new(on_frame) {
            Some(link) => Some(Box::new(link)),
            None => {
                warn!("CVDisplayLink unavailable");
                None
            }
        }
    }
}

// ============================================================================
// Event tap
// ============================================================================

/// State reachable from the tap callback through its user-info pointer
struct TapContext {
    filter: Arc<ScrollFilter>,
    port: AtomicPtr<c_void>,
    stop: AtomicBool,
}

fn modifiers_from_flags(flags: u64) -> Modifiers {
    Modifiers {
        command: flags & K_CG_EVENT_FLAG_MASK_COMMAND != 0,
        option: flags & K_CG_EVENT_FLAG_MASK_ALTERNATE != 0,
        control: flags & K_CG_EVENT_FLAG_MASK_CONTROL != 0,
        shift: flags & K_CG_EVENT_FLAG_MASK_SHIFT != 0,
    }
}

unsafe extern "C" fn tap_callback(
    _proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    if user_info.is_null() {
        return event;
    }
    // SAFETY: user_info is the TapContext allocated in MacTap::install,
    // freed only after the tap thread has invalidated the port and exited.
    let context = &*(user_info as *const TapContext);

    match event_type {
        K_CG_EVENT_TAP_DISABLED_BY_TIMEOUT | K_CG_EVENT_TAP_DISABLED_BY_USER_INPUT => {
            let port = context.port.load(Ordering::Acquire);
            if !port.is_null() && context.filter.is_live() {
                CGEventTapEnable(port, true);
            }
            return event;
        }
        K_CG_EVENT_SCROLL_WHEEL if !event.is_null() => {}
        _ => return event,
    }

    let scroll = ScrollEvent {
        delta: CGEventGetIntegerValueField(event, K_CG_SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_1),
        continuous: CGEventGetIntegerValueField(event, K_CG_SCROLL_WHEEL_EVENT_IS_CONTINUOUS) != 0,
        synthetic: CGEventGetIntegerValueField(event, K_CG_EVENT_SOURCE_USER_DATA)
            == SYNTHETIC_MARKER,
        modifiers: modifiers_from_flags(CGEventGetFlags(event)),
    };

    // A panic must not unwind into CoreGraphics
    let verdict = catch_unwind(AssertUnwindSafe(|| context.filter.on_event(&scroll)))
        .unwrap_or(TapVerdict::Pass);

    match verdict {
        TapVerdict::Consume => std::ptr::null_mut(),
        TapVerdict::Pass => event,
    }
}

/// Raw pointer handed between threads
#[derive(Clone, Copy)]
struct SendPtr(*mut c_void);

// SAFETY: CFRunLoopStop may be called from any thread; the context pointer
// is only dereferenced by the callback and freed after the tap thread joins.
unsafe impl Send for SendPtr {}

/// Event tap running on its own CFRunLoop thread
struct MacTap {
    run_loop: SendPtr,
    context: SendPtr,
    thread: Option<JoinHandle<()>>,
}

impl MacTap {
    fn install(filter: Arc<ScrollFilter>) -> Result<Self> {
        let context = Box::into_raw(Box::new(TapContext {
            filter,
            port: AtomicPtr::new(std::ptr::null_mut()),
            stop: AtomicBool::new(false),
        }));
        let context_ptr = SendPtr(context.cast());
        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<SendPtr, String>>(1);

        let spawned = std::thread::Builder::new()
            .name("maus-event-tap".to_string())
            .spawn(move || {
                let context_ptr = context_ptr;
                // SAFETY: the context outlives this thread (freed after join).
                unsafe { run_tap_thread(context_ptr.0.cast(), ready_tx) }
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                // SAFETY: no thread ever saw the pointer.
                drop(unsafe { Box::from_raw(context) });
                return Err(Error::HookInstallFailed(format!(
                    "failed to spawn tap thread: {}",
                    e
                )));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(run_loop)) => Ok(Self {
                run_loop,
                context: context_ptr,
                thread: Some(thread),
            }),
            outcome => {
                let _ = thread.join();
                // SAFETY: the tap thread has exited without a live port.
                drop(unsafe { Box::from_raw(context) });
                let reason = match outcome {
                    Ok(Err(reason)) => reason,
                    _ => "tap thread exited during setup".to_string(),
                };
                Err(Error::HookInstallFailed(reason))
            }
        }
    }
}

unsafe fn run_tap_thread(
    context: *mut TapContext,
    ready: mpsc::SyncSender<std::result::Result<SendPtr, String>>,
) {
    let port = CGEventTapCreate(
        K_CG_SESSION_EVENT_TAP,
        K_CG_HEAD_INSERT_EVENT_TAP,
        K_CG_EVENT_TAP_OPTION_DEFAULT,
        1u64 << K_CG_EVENT_SCROLL_WHEEL,
        tap_callback,
        context.cast(),
    );
    if port.is_null() {
        let _ = ready.send(Err("CGEventTapCreate returned null".to_string()));
        return;
    }

    let source = CFMachPortCreateRunLoopSource(std::ptr::null(), port, 0);
    if source.is_null() {
        CFMachPortInvalidate(port);
        CFRelease(port as CFTypeRef);
        let _ = ready.send(Err("CFMachPortCreateRunLoopSource returned null".to_string()));
        return;
    }

    (*context).port.store(port, Ordering::Release);
    let run_loop = CFRunLoopGetCurrent();
    CFRunLoopAddSource(run_loop, source, kCFRunLoopCommonModes);
    CGEventTapEnable(port, true);
    let _ = ready.send(Ok(SendPtr(run_loop)));
    debug!("Event tap thread running");

    while !(*context).stop.load(Ordering::Acquire) {
        CFRunLoopRunInMode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE_SECS, 0);
    }

    CGEventTapEnable(port, false);
    (*context).port.store(std::ptr::null_mut(), Ordering::Release);
    CFMachPortInvalidate(port);
    CFRelease(source as CFTypeRef);
    CFRelease(port as CFTypeRef);
    debug!("Event tap thread stopped");
}

impl TapGuard for MacTap {
    fn uninstall(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // SAFETY: the context stays allocated until after the join below.
        let context = unsafe { &*(self.context.0 as *const TapContext) };
        context.filter.revoke();
        context.stop.store(true, Ordering::Release);
        // SAFETY: CFRunLoopStop is thread-safe; the run loop belongs to the
        // still-running tap thread.
        unsafe { CFRunLoopStop(self.run_loop.0) };

        if thread.join().is_err() {
            error!("Event tap thread panicked");
        }
        // SAFETY: the port is invalidated, no callback can observe the context.
        drop(unsafe { Box::from_raw(self.context.0 as *mut TapContext) });
    }
}

impl Drop for MacTap {
    fn drop(&mut self) {
        self.uninstall();
    }
}

// ============================================================================
// CVDisplayLink Frame Source
// ============================================================================

struct DisplayLinkContext {
    on_frame: FrameCallback,
    live: AtomicBool,
}

/// `CVDisplayLink` callback - called on each vsync.
unsafe extern "C" fn display_link_callback(
    _display_link: CVDisplayLinkRef,
    _in_now: *const CVTimeStamp,
    _in_output_time: *const CVTimeStamp,
    _flags_in: CVOptionFlags,
    _flags_out: *mut CVOptionFlags,
    context: *mut c_void,
) -> CVReturn {
    if context.is_null() {
        return 0;
    }
    // SAFETY: context is the DisplayLinkContext owned by DisplayLinkSource,
    // released only after the link is stopped and released.
    let context = &*(context as *const DisplayLinkContext);
    if context.live.load(Ordering::Acquire) {
        let _ = catch_unwind(AssertUnwindSafe(|| (context.on_frame)()));
    }
    0 // kCVReturnSuccess
}

/// RAII wrapper for `CVDisplayLink`.
struct DisplayLinkSource {
    link: CVDisplayLinkRef,
    context: *mut DisplayLinkContext,
}

// SAFETY: CVDisplayLink is thread-safe per Apple's Core Video documentation,
// and the context is only shared through atomics and an Arc'd callback.
unsafe impl Send for DisplayLinkSource {}

impl DisplayLinkSource {
    fn new(on_frame: FrameCallback) -> Option<Self> {
        let context = Box::into_raw(Box::new(DisplayLinkContext {
            on_frame,
            live: AtomicBool::new(false),
        }));
        let mut link: CVDisplayLinkRef = std::ptr::null_mut();

        // SAFETY: on failure the link and the context are released here and
        // never handed out.
        unsafe {
            if CVDisplayLinkCreateWithActiveCGDisplays(&mut link) != 0 || link.is_null() {
                drop(Box::from_raw(context));
                return None;
            }
            if CVDisplayLinkSetOutputCallback(link, display_link_callback, context.cast()) != 0 {
                CVDisplayLinkRelease(link);
                drop(Box::from_raw(context));
                return None;
            }
        }

        Some(Self { link, context })
    }

    fn context(&self) -> &DisplayLinkContext {
        // SAFETY: allocated in new(), freed in drop().
        unsafe { &*self.context }
    }
}

impl FrameSource for DisplayLinkSource {
    fn start(&mut self) -> Result<()> {
        self.context().live.store(true, Ordering::Release);
        // SAFETY: link is a valid display link owned by self.
        let status = unsafe { CVDisplayLinkStart(self.link) };
        if status != 0 {
            self.context().live.store(false, Ordering::Release);
            return Err(Error::Other(format!("CVDisplayLinkStart returned {}", status)));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.context().live.store(false, Ordering::Release);
        // SAFETY: link is a valid display link owned by self.
        unsafe {
            CVDisplayLinkStop(self.link);
        }
    }
}

impl Drop for DisplayLinkSource {
    fn drop(&mut self) {
        // SAFETY: stopping before release guarantees no further callbacks.
        unsafe {
            CVDisplayLinkStop(self.link);
            CVDisplayLinkRelease(self.link);
            drop(Box::from_raw(self.context));
        }
    }
}
