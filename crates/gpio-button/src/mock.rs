//! In-memory peripherals for tests and simulators
//!
//! [`MockPeripheralManager`] stands in for the platform GPIO service and
//! [`MockInputFramework`] for the host input framework. Both record what the
//! driver did with them and can be told to fail.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::{ErrorKind, ErrorType, InputPin};

use crate::config::{Direction, EdgeTrigger};
use crate::input::{Capabilities, InputDevice, InputEvent, InputFramework};
use crate::interface::{Gpio, GpioCallback, PeripheralManager};

/// Failures reported by the mock peripherals
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockError {
    /// No pin with that name exists
    NoSuchPin,
    /// The pin is already open
    Busy,
    /// The pin was used after close
    Closed,
    /// Injected I/O failure
    Io,
}

impl core::fmt::Display for MockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockError::NoSuchPin => write!(f, "No such pin"),
            MockError::Busy => write!(f, "Pin already in use"),
            MockError::Closed => write!(f, "Pin is closed"),
            MockError::Io => write!(f, "I/O error"),
        }
    }
}

impl core::error::Error for MockError {}

impl embedded_hal::digital::Error for MockError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

type SharedCallback = Arc<Mutex<GpioCallback<MockError>>>;

#[derive(Default)]
struct PinState {
    level: bool,
    is_open: bool,
    opens: usize,
    closes: usize,
    unregisters: usize,
    direction: Option<Direction>,
    edge_trigger: Option<EdgeTrigger>,
    callback: Option<SharedCallback>,
    interrupts_active: bool,
    fail_configure: bool,
    fail_register: bool,
    fail_read: bool,
    fail_close: bool,
}

impl PinState {
    fn triggers_on(&self, level: bool) -> bool {
        match self.edge_trigger {
            Some(EdgeTrigger::Both) => true,
            Some(EdgeTrigger::Rising) => level,
            Some(EdgeTrigger::Falling) => !level,
            Some(EdgeTrigger::None) | None => false,
        }
    }
}

type Pins = Arc<Mutex<BTreeMap<String, PinState>>>;

fn lock(pins: &Pins) -> MutexGuard<'_, BTreeMap<String, PinState>> {
    pins.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock GPIO service
///
/// Clones share the same pins, so a test can keep one clone to drive edges
/// while the driver owns the pin handles.
#[derive(Clone, Default)]
pub struct MockPeripheralManager {
    pins: Pins,
}

impl MockPeripheralManager {
    /// Create a manager exposing the given pin names, all reading high
    pub fn new(names: &[&str]) -> Self {
        let manager = Self::default();
        {
            let mut pins = lock(&manager.pins);
            for name in names {
                pins.insert(
                    name.to_string(),
                    PinState {
                        level: true,
                        ..PinState::default()
                    },
                );
            }
        }
        manager
    }

    fn with_pin<R>(&self, name: &str, f: impl FnOnce(&mut PinState) -> R) -> Option<R> {
        lock(&self.pins).get_mut(name).map(f)
    }

    /// Set the level without raising an edge
    pub fn set_level(&self, name: &str, level: bool) {
        self.with_pin(name, |pin| pin.level = level);
    }

    /// Drive the pin to `level` and deliver the edge to the registered callback
    ///
    /// Returns the callback's "keep active" answer, or `None` if nothing was
    /// delivered (pin closed, no callback, edge not selected, or interrupts
    /// deactivated by an earlier `false`).
    pub fn trigger_edge(&self, name: &str, level: bool) -> Option<bool> {
        let callback = {
            let mut pins = lock(&self.pins);
            let pin = pins.get_mut(name)?;
            pin.level = level;
            if !pin.is_open || !pin.interrupts_active || !pin.triggers_on(level) {
                return None;
            }
            pin.callback.clone()?
        };

        let mut handle = MockGpio {
            name: name.to_string(),
            pins: self.pins.clone(),
        };
        let pin: &mut dyn InputPin<Error = MockError> = &mut handle;
        let keep_active = {
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)(pin)
        };
        if !keep_active {
            self.with_pin(name, |pin| pin.interrupts_active = false);
        }
        Some(keep_active)
    }

    /// Make direction and edge configuration fail
    pub fn fail_configure(&self, name: &str, fail: bool) {
        self.with_pin(name, |pin| pin.fail_configure = fail);
    }

    /// Make callback registration fail
    pub fn fail_register(&self, name: &str, fail: bool) {
        self.with_pin(name, |pin| pin.fail_register = fail);
    }

    /// Make level reads fail
    pub fn fail_reads(&self, name: &str, fail: bool) {
        self.with_pin(name, |pin| pin.fail_read = fail);
    }

    /// Make close report an error (the pin is still released)
    pub fn fail_close(&self, name: &str, fail: bool) {
        self.with_pin(name, |pin| pin.fail_close = fail);
    }

    /// Opens minus closes, i.e. 1 while the pin is held
    pub fn open_count(&self, name: &str) -> usize {
        self.with_pin(name, |pin| pin.opens - pin.closes)
            .unwrap_or(0)
    }

    /// Number of close calls on the pin
    pub fn close_calls(&self, name: &str) -> usize {
        self.with_pin(name, |pin| pin.closes).unwrap_or(0)
    }

    /// Number of callback unregistrations on the pin
    pub fn unregister_calls(&self, name: &str) -> usize {
        self.with_pin(name, |pin| pin.unregisters).unwrap_or(0)
    }

    /// Last direction set on the pin
    pub fn direction(&self, name: &str) -> Option<Direction> {
        self.with_pin(name, |pin| pin.direction).flatten()
    }

    /// Last edge trigger set on the pin
    pub fn edge_trigger(&self, name: &str) -> Option<EdgeTrigger> {
        self.with_pin(name, |pin| pin.edge_trigger).flatten()
    }

    /// Whether the pin has a callback that still receives edges
    pub fn interrupts_active(&self, name: &str) -> bool {
        self.with_pin(name, |pin| pin.callback.is_some() && pin.interrupts_active)
            .unwrap_or(false)
    }
}

impl PeripheralManager for MockPeripheralManager {
    type Gpio = MockGpio;

    fn open_gpio(&mut self, name: &str) -> Result<MockGpio, MockError> {
        self.with_pin(name, |pin| {
            if pin.is_open {
                return Err(MockError::Busy);
            }
            pin.is_open = true;
            pin.opens += 1;
            pin.direction = None;
            pin.edge_trigger = None;
            Ok(())
        })
        .unwrap_or(Err(MockError::NoSuchPin))?;

        Ok(MockGpio {
            name: name.to_string(),
            pins: self.pins.clone(),
        })
    }
}

/// Pin handle issued by [`MockPeripheralManager`]
pub struct MockGpio {
    name: String,
    pins: Pins,
}

impl MockGpio {
    fn with_open_pin<R>(
        &self,
        f: impl FnOnce(&mut PinState) -> Result<R, MockError>,
    ) -> Result<R, MockError> {
        let mut pins = lock(&self.pins);
        let pin = pins.get_mut(&self.name).ok_or(MockError::NoSuchPin)?;
        if !pin.is_open {
            return Err(MockError::Closed);
        }
        f(pin)
    }
}

impl ErrorType for MockGpio {
    type Error = MockError;
}

impl InputPin for MockGpio {
    fn is_high(&mut self) -> Result<bool, MockError> {
        self.with_open_pin(|pin| {
            if pin.fail_read {
                Err(MockError::Io)
            } else {
                Ok(pin.level)
            }
        })
    }

    fn is_low(&mut self) -> Result<bool, MockError> {
        self.is_high().map(|level| !level)
    }
}

impl Gpio for MockGpio {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), MockError> {
        self.with_open_pin(|pin| {
            if pin.fail_configure {
                return Err(MockError::Io);
            }
            pin.direction = Some(direction);
            Ok(())
        })
    }

    fn set_edge_trigger(&mut self, trigger: EdgeTrigger) -> Result<(), MockError> {
        self.with_open_pin(|pin| {
            if pin.fail_configure {
                return Err(MockError::Io);
            }
            pin.edge_trigger = Some(trigger);
            Ok(())
        })
    }

    fn register_callback(&mut self, callback: GpioCallback<MockError>) -> Result<(), MockError> {
        self.with_open_pin(|pin| {
            if pin.fail_register {
                return Err(MockError::Io);
            }
            pin.callback = Some(Arc::new(Mutex::new(callback)));
            pin.interrupts_active = true;
            Ok(())
        })
    }

    fn unregister_callback(&mut self) {
        if let Some(pin) = lock(&self.pins).get_mut(&self.name) {
            pin.callback = None;
            pin.interrupts_active = false;
            pin.unregisters += 1;
        }
    }

    fn close(&mut self) -> Result<(), MockError> {
        self.with_open_pin(|pin| {
            pin.is_open = false;
            pin.closes += 1;
            pin.callback = None;
            pin.interrupts_active = false;
            if pin.fail_close {
                Err(MockError::Io)
            } else {
                Ok(())
            }
        })
    }
}

/// Mock input framework
#[derive(Default)]
pub struct MockInputFramework {
    fail_build: bool,
    capabilities: Vec<Capabilities>,
}

impl MockInputFramework {
    /// Framework that builds every device it is asked for
    pub fn new() -> Self {
        Self::default()
    }

    /// Make device creation fail
    pub fn fail_builds(&mut self, fail: bool) {
        self.fail_build = fail;
    }

    /// Capability maps of all devices built so far
    pub fn built(&self) -> &[Capabilities] {
        &self.capabilities
    }
}

impl InputFramework for MockInputFramework {
    type Device = MockInputDevice;
    type Error = MockError;

    fn build_device(&mut self, capabilities: &Capabilities) -> Result<MockInputDevice, MockError> {
        if self.fail_build {
            return Err(MockError::Io);
        }
        self.capabilities.push(capabilities.clone());
        Ok(MockInputDevice {
            capabilities: capabilities.clone(),
            emissions: Mutex::new(Vec::new()),
            fail_emit: AtomicBool::new(false),
        })
    }
}

/// Device recording every emitted event group
pub struct MockInputDevice {
    capabilities: Capabilities,
    emissions: Mutex<Vec<Vec<InputEvent>>>,
    fail_emit: AtomicBool,
}

impl MockInputDevice {
    /// Capability map the device was built with
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Event groups in emission order
    pub fn emissions(&self) -> Vec<Vec<InputEvent>> {
        self.emissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make emission fail
    pub fn fail_emits(&self, fail: bool) {
        self.fail_emit.store(fail, Ordering::SeqCst);
    }
}

impl InputDevice for MockInputDevice {
    type Error = MockError;

    fn emit(&self, events: &[InputEvent]) -> Result<(), MockError> {
        if self.fail_emit.load(Ordering::SeqCst) {
            return Err(MockError::Io);
        }
        self.emissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(events.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_cannot_be_opened_twice() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let _gpio = manager.open_gpio("GPIO6").unwrap();
        assert_eq!(manager.open_gpio("GPIO6").err(), Some(MockError::Busy));
        assert_eq!(manager.open_gpio("GPIO7").err(), Some(MockError::NoSuchPin));
    }

    #[test]
    fn edges_follow_trigger_selection() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut gpio = manager.open_gpio("GPIO6").unwrap();
        gpio.set_edge_trigger(EdgeTrigger::Rising).unwrap();
        gpio.register_callback(Box::new(|_: &mut dyn InputPin<Error = MockError>| true))
            .unwrap();

        assert_eq!(manager.trigger_edge("GPIO6", true), Some(true));
        assert_eq!(manager.trigger_edge("GPIO6", false), None);
    }

    #[test]
    fn callback_reads_the_new_level() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut gpio = manager.open_gpio("GPIO6").unwrap();
        gpio.set_edge_trigger(EdgeTrigger::Both).unwrap();
        gpio.register_callback(Box::new(|pin: &mut dyn InputPin<Error = MockError>| {
            pin.is_low() == Ok(true)
        }))
        .unwrap();

        assert_eq!(manager.trigger_edge("GPIO6", false), Some(true));
        assert_eq!(manager.trigger_edge("GPIO6", true), Some(false));
        assert!(!manager.interrupts_active("GPIO6"));
        assert_eq!(manager.trigger_edge("GPIO6", false), None);
    }
}
