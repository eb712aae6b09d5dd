//! Input-device bridge
//!
//! Turns logical button events into key events for the host input framework.
//! Every button change is emitted as one group of two frames: the key state
//! followed by a synchronization report.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::button::{ButtonEventListener, ButtonMonitor};
use crate::interface::Gpio;

/// Synchronization event category
pub const EV_SYN: u16 = 0x00;
/// Key event category
pub const EV_KEY: u16 = 0x01;
/// Synchronization code closing an event group
pub const SYN_REPORT: u16 = 0;
/// Key value for a released key
pub const KEY_RELEASED: i32 = 0;
/// Key value for a pressed key
pub const KEY_PRESSED: i32 = 1;

/// A single input event record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    /// Event category (`EV_SYN`, `EV_KEY`)
    pub kind: u16,
    /// Code within the category
    pub code: u16,
    /// Event value
    pub value: i32,
}

impl InputEvent {
    /// Event with explicit category, code and value
    pub const fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    /// Key state frame
    pub const fn key(code: u16, pressed: bool) -> Self {
        Self::new(EV_KEY, code, if pressed { KEY_PRESSED } else { KEY_RELEASED })
    }

    /// Synchronization frame
    pub const fn sync() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }
}

/// Supported codes per event category
pub type Capabilities = BTreeMap<u16, Vec<u16>>;

/// A registered input device
pub trait InputDevice: Send + Sync + 'static {
    /// Emission failure
    type Error: Debug;

    /// Emit `events` as one group
    ///
    /// # Errors
    ///
    /// Returns an error if the framework rejects the events.
    fn emit(&self, events: &[InputEvent]) -> Result<(), Self::Error>;
}

/// Host input framework that creates devices
pub trait InputFramework {
    /// Device type this framework creates
    type Device: InputDevice;
    /// Device creation failure
    type Error: Debug;

    /// Create a device supporting `capabilities`
    ///
    /// # Errors
    ///
    /// Returns an error if the framework cannot create the device.
    fn build_device(&mut self, capabilities: &Capabilities) -> Result<Self::Device, Self::Error>;
}

/// Capability map of a single-key device
pub fn capabilities(key_code: u16) -> Capabilities {
    let mut capabilities = Capabilities::new();
    capabilities.insert(EV_SYN, vec![SYN_REPORT]);
    capabilities.insert(EV_KEY, vec![key_code]);
    capabilities
}

/// Frames emitted for one button change, key state first
pub fn frames(key_code: u16, pressed: bool) -> [InputEvent; 2] {
    [InputEvent::key(key_code, pressed), InputEvent::sync()]
}

/// Listener that forwards button events to an input device
pub struct ButtonInputDriver<D> {
    device: Arc<D>,
    key_code: u16,
}

impl<D: InputDevice> ButtonInputDriver<D> {
    /// Forward events to `device` as `key_code`
    pub fn new(device: Arc<D>, key_code: u16) -> Self {
        Self { device, key_code }
    }
}

impl<D: InputDevice> ButtonEventListener for ButtonInputDriver<D> {
    fn on_button_event(&self, pressed: bool) -> bool {
        if let Err(e) = self.device.emit(&frames(self.key_code, pressed)) {
            log::error!("emitting key {} failed: {e:?}", self.key_code);
        }
        true
    }
}

/// Build a device for `key_code` and feed it from `button`
///
/// Replaces any listener already set on `button`.
///
/// # Errors
///
/// Returns the framework error if the device cannot be built; the button's
/// listener is left untouched in that case.
pub fn build<P, F>(
    button: &ButtonMonitor<P>,
    framework: &mut F,
    key_code: u16,
) -> Result<Arc<F::Device>, F::Error>
where
    P: Gpio,
    F: InputFramework,
{
    let device = Arc::new(framework.build_device(&capabilities(key_code))?);
    button.listen(ButtonInputDriver::new(device.clone(), key_code));
    Ok(device)
}
