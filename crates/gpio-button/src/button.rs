//! Button monitor: edge interrupts in, pressed/released events out

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::{Error as _, InputPin};

use crate::config::{Config, Polarity};
use crate::error::ResourceError;
use crate::input::{self, InputFramework};
use crate::interface::{Gpio, GpioCallback, PeripheralManager, PinConnection};

/// Receiver of logical button events
///
/// Closures `Fn(bool) -> bool` implement this trait directly.
pub trait ButtonEventListener: Send + Sync {
    /// Called on every edge with the logical state, `true` = pressed
    ///
    /// Return `false` to stop the platform from delivering further edges.
    fn on_button_event(&self, pressed: bool) -> bool;
}

impl<F> ButtonEventListener for F
where
    F: Fn(bool) -> bool + Send + Sync,
{
    fn on_button_event(&self, pressed: bool) -> bool {
        self(pressed)
    }
}

type SharedListener = Arc<dyn ButtonEventListener>;

/// Single-slot listener reference shared with the edge handler
///
/// Replacement swaps one `Arc` under the lock, so a handler sees either the
/// old or the new listener. The handler calls the listener after releasing
/// the lock, which lets a listener replace itself.
#[derive(Clone, Default)]
struct ListenerSlot(Arc<Mutex<Option<SharedListener>>>);

impl ListenerSlot {
    fn lock(&self) -> MutexGuard<'_, Option<SharedListener>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, listener: Option<SharedListener>) -> Option<SharedListener> {
        core::mem::replace(&mut *self.lock(), listener)
    }

    fn current(&self) -> Option<SharedListener> {
        self.lock().clone()
    }
}

/// State captured by the registered edge callback
struct EdgeHandler {
    polarity: Polarity,
    listener: ListenerSlot,
}

impl EdgeHandler {
    fn on_edge<E: embedded_hal::digital::Error>(&self, pin: &mut dyn InputPin<Error = E>) -> bool {
        let Some(listener) = self.listener.current() else {
            return true;
        };
        match pin.is_high() {
            Ok(level) => {
                let pressed = self.polarity.is_pressed(level);
                log::trace!("edge: level={level} pressed={pressed}");
                listener.on_button_event(pressed)
            }
            Err(e) => {
                // keep the registration alive, the next edge may read fine
                log::error!("pin read failed ({:?}): {e:?}", e.kind());
                true
            }
        }
    }

    fn into_callback<E: embedded_hal::digital::Error + 'static>(self) -> GpioCallback<E> {
        Box::new(move |pin: &mut dyn InputPin<Error = E>| self.on_edge(pin))
    }
}

/// Driver for a GPIO button with a pull-up or pull-down resistor
///
/// Owns the pin, listens for both edges and reports the logical state to at
/// most one [`ButtonEventListener`].
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// use gpio_button::mock::MockPeripheralManager;
/// use gpio_button::{ButtonMonitor, Polarity};
///
/// let mut manager = MockPeripheralManager::new(&["GPIO6"]);
/// let mut button = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow).unwrap();
///
/// let pressed = Arc::new(AtomicBool::new(false));
/// let seen = pressed.clone();
/// button.listen(move |p: bool| {
///     seen.store(p, Ordering::SeqCst);
///     true
/// });
///
/// manager.trigger_edge("GPIO6", false);
/// assert!(pressed.load(Ordering::SeqCst));
///
/// button.close();
/// ```
pub struct ButtonMonitor<P: Gpio> {
    connection: PinConnection<P>,
    polarity: Polarity,
    listener: ListenerSlot,
}

impl<P: Gpio> ButtonMonitor<P> {
    /// Open `pin` through the peripheral manager and start monitoring it
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if the pin cannot be opened or configured.
    /// A pin opened here is closed again before the error is returned.
    pub fn open<M>(
        manager: &mut M,
        pin: &str,
        polarity: Polarity,
    ) -> Result<Self, ResourceError<P::Error>>
    where
        M: PeripheralManager<Gpio = P>,
    {
        let connection = PinConnection::open(manager, pin)?;
        Self::from_connection(connection, polarity)
    }

    /// Same as [`open`](ButtonMonitor::open), with pin and polarity taken from `config`
    ///
    /// # Errors
    ///
    /// See [`open`](ButtonMonitor::open).
    pub fn open_with_config<M>(
        manager: &mut M,
        config: &Config,
    ) -> Result<Self, ResourceError<P::Error>>
    where
        M: PeripheralManager<Gpio = P>,
    {
        Self::open(manager, &config.pin, config.polarity)
    }

    /// Monitor an already open pin
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if configuration fails. The pin is closed
    /// before the error is returned.
    pub fn from_gpio(gpio: P, polarity: Polarity) -> Result<Self, ResourceError<P::Error>> {
        Self::from_connection(PinConnection::new(gpio), polarity)
    }

    /// Monitor an already open connection
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if configuration fails. The connection is
    /// closed before the error is returned.
    pub fn from_connection(
        mut connection: PinConnection<P>,
        polarity: Polarity,
    ) -> Result<Self, ResourceError<P::Error>> {
        let listener = ListenerSlot::default();
        let handler = EdgeHandler {
            polarity,
            listener: listener.clone(),
        };

        let wired = connection
            .configure()
            .and_then(|()| connection.register_callback(handler.into_callback()));
        if let Err(e) = wired {
            log::debug!("setting up {} failed, releasing it", connection.name());
            connection.close();
            return Err(e);
        }

        Ok(Self {
            connection,
            polarity,
            listener,
        })
    }

    /// Level at which the button reads as pressed
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Platform identifier of the monitored pin
    pub fn pin_name(&self) -> &str {
        self.connection.name()
    }

    /// Whether [`close`](ButtonMonitor::close) has run
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Set the listener invoked on button events, or `None` to stop dispatch
    ///
    /// Replaces any previous listener.
    pub fn set_on_button_event_listener(&self, listener: Option<Arc<dyn ButtonEventListener>>) {
        let had_listener = self.listener.replace(listener).is_some();
        log::debug!(
            "{}: listener {}",
            self.connection.name(),
            if had_listener { "replaced" } else { "set" }
        );
    }

    /// Shorthand for setting `Some(listener)`
    pub fn listen<L: ButtonEventListener + 'static>(&self, listener: L) {
        let listener: Arc<dyn ButtonEventListener> = Arc::new(listener);
        self.set_on_button_event_listener(Some(listener));
    }

    /// Poll the current logical state
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Read`] on I/O failure, or
    /// [`ResourceError::Closed`] after close.
    pub fn read_pressed(&mut self) -> Result<bool, ResourceError<P::Error>> {
        let level = self.connection.read_level()?;
        Ok(self.polarity.is_pressed(level))
    }

    /// Create an input device emitting `key_code` whenever the button changes
    ///
    /// This takes the listener slot: any listener set before is replaced.
    ///
    /// # Errors
    ///
    /// Returns the framework error if the device cannot be built.
    pub fn create_input_driver<F: InputFramework>(
        &self,
        framework: &mut F,
        key_code: u16,
    ) -> Result<Arc<F::Device>, F::Error> {
        input::build(self, framework, key_code)
    }

    /// Stop dispatching and release the pin
    ///
    /// Calling this again is a no-op.
    pub fn close(&mut self) {
        if self.connection.is_closed() {
            return;
        }
        self.listener.replace(None);
        self.connection.close();
    }
}

impl<P: Gpio> Drop for ButtonMonitor<P> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::mock::MockPeripheralManager;

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, impl Fn(bool) -> bool + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (events, move |pressed: bool| {
            sink.lock().unwrap().push(pressed);
            true
        })
    }

    #[test]
    fn pressed_when_high_reports_level() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let button = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenHigh).unwrap();
        let (events, listener) = recorder();
        button.listen(listener);

        manager.trigger_edge("GPIO6", true);
        manager.trigger_edge("GPIO6", false);
        assert_eq!(*events.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn pressed_when_low_inverts_level() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let button = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow).unwrap();
        let (events, listener) = recorder();
        button.listen(listener);

        manager.trigger_edge("GPIO6", true);
        manager.trigger_edge("GPIO6", false);
        assert_eq!(*events.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn no_listener_keeps_interrupt_active() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let button = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow).unwrap();
        let (events, listener) = recorder();
        button.listen(listener);
        button.set_on_button_event_listener(None);

        assert_eq!(manager.trigger_edge("GPIO6", false), Some(true));
        assert!(events.lock().unwrap().is_empty());
        assert!(manager.interrupts_active("GPIO6"));
    }

    #[test]
    fn read_failure_keeps_interrupt_active() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let button = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        button.listen(move |_: bool| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        manager.fail_reads("GPIO6", true);
        assert_eq!(manager.trigger_edge("GPIO6", false), Some(true));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        manager.fail_reads("GPIO6", false);
        assert_eq!(manager.trigger_edge("GPIO6", true), Some(false));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn new_listener_replaces_old() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let button = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenHigh).unwrap();
        let (first, first_listener) = recorder();
        let (second, second_listener) = recorder();

        button.listen(first_listener);
        manager.trigger_edge("GPIO6", true);
        button.listen(second_listener);
        manager.trigger_edge("GPIO6", false);

        assert_eq!(*first.lock().unwrap(), vec![true]);
        assert_eq!(*second.lock().unwrap(), vec![false]);
    }

    #[test]
    fn listener_may_replace_itself() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let button = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenHigh).unwrap();
        let slot = button.listener.clone();
        button.listen(move |_: bool| {
            slot.replace(None);
            true
        });

        assert_eq!(manager.trigger_edge("GPIO6", true), Some(true));
        assert!(button.listener.current().is_none());
    }

    #[test]
    fn read_pressed_applies_polarity() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut button =
            ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow).unwrap();
        manager.set_level("GPIO6", false);
        assert!(button.read_pressed().unwrap());
        manager.set_level("GPIO6", true);
        assert!(!button.read_pressed().unwrap());
    }

    #[test]
    fn close_twice_tears_down_once() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut button =
            ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow).unwrap();
        button.close();
        button.close();
        drop(button);
        assert_eq!(manager.close_calls("GPIO6"), 1);
        assert_eq!(manager.unregister_calls("GPIO6"), 1);
        assert_eq!(manager.open_count("GPIO6"), 0);
    }

    #[test]
    fn configure_failure_releases_pin() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        manager.fail_configure("GPIO6", true);
        let result = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow);
        assert!(matches!(result, Err(ResourceError::Configure(_))));
        assert_eq!(manager.open_count("GPIO6"), 0);
        assert_eq!(manager.close_calls("GPIO6"), 1);
    }

    #[test]
    fn register_failure_releases_pin() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        manager.fail_register("GPIO6", true);
        let result = ButtonMonitor::open(&mut manager, "GPIO6", Polarity::PressedWhenLow);
        assert!(matches!(result, Err(ResourceError::Register(_))));
        assert_eq!(manager.open_count("GPIO6"), 0);
    }
}
