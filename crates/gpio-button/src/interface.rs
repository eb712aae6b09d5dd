//! Peripheral access abstraction
//!
//! This module provides the collaborator traits the driver is written against
//! and the [`PinConnection`] that owns one configured input pin.
//!
//! ## Collaborators
//!
//! - [`PeripheralManager`]: resolves a platform pin identifier such as
//!   `"GPIO6"` or `"BCM21"` into an open [`Gpio`] handle.
//! - [`Gpio`]: one exclusive pin. Levels are read through the embedded-hal
//!   [`InputPin`] supertrait; direction, edge trigger and the edge callback
//!   are configured through the extra methods.
//!
//! ## Edge callbacks
//!
//! The platform invokes the registered [`GpioCallback`] on every configured
//! edge, from whatever context its interrupt dispatch uses, and hands the
//! callback the pin so it can sample the level. The callback's return value
//! tells the platform whether to keep delivering edges: `false` deactivates
//! the registration.
//!
//! ## Example
//!
//! ```
//! use gpio_button::mock::MockPeripheralManager;
//! use gpio_button::PinConnection;
//!
//! let mut manager = MockPeripheralManager::new(&["GPIO6"]);
//! let mut connection = PinConnection::open(&mut manager, "GPIO6").unwrap();
//! connection.configure().unwrap();
//!
//! manager.set_level("GPIO6", true);
//! assert_eq!(connection.read_level().ok(), Some(true));
//!
//! connection.close();
//! connection.close(); // no-op
//! assert_eq!(manager.open_count("GPIO6"), 0);
//! ```

use embedded_hal::digital::{ErrorType, InputPin};

use crate::config::{Direction, EdgeTrigger};
use crate::error::ResourceError;

/// Edge interrupt handler
///
/// Receives the pin that raised the edge and returns `true` to keep the
/// registration active.
pub type GpioCallback<E> = Box<dyn FnMut(&mut dyn InputPin<Error = E>) -> bool + Send>;

/// One platform GPIO resource
///
/// Implementations own the pin exclusively. All methods may fail with the
/// platform error type from [`ErrorType`].
pub trait Gpio: InputPin + Send + 'static {
    /// Platform identifier the pin was opened with
    fn name(&self) -> &str;

    /// Set the pin direction
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error>;

    /// Select which transitions raise edge interrupts
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn set_edge_trigger(&mut self, trigger: EdgeTrigger) -> Result<(), Self::Error>;

    /// Register the edge handler, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the registration.
    fn register_callback(&mut self, callback: GpioCallback<Self::Error>)
        -> Result<(), Self::Error>;

    /// Drop the edge handler, if any
    fn unregister_callback(&mut self);

    /// Release the pin
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure. The pin must not be used afterwards
    /// either way.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Platform service that hands out GPIO pins by name
pub trait PeripheralManager {
    /// Pin handle type
    type Gpio: Gpio;

    /// Open the pin called `name`
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown, the pin is already in use,
    /// or on I/O failure.
    fn open_gpio(&mut self, name: &str) -> Result<Self::Gpio, <Self::Gpio as ErrorType>::Error>;
}

/// An open input pin configured for both-edge interrupts
///
/// The connection owns the pin and its callback registration; both are
/// released together by [`close`](PinConnection::close), which is idempotent
/// and also runs on drop.
pub struct PinConnection<P: Gpio> {
    /// `None` once closed
    gpio: Option<P>,
    name: String,
    callback_registered: bool,
}

impl<P: Gpio> PinConnection<P> {
    /// Open `name` through the peripheral manager
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Open`] if the platform cannot open the pin.
    pub fn open<M>(manager: &mut M, name: &str) -> Result<Self, ResourceError<P::Error>>
    where
        M: PeripheralManager<Gpio = P>,
    {
        let gpio = manager
            .open_gpio(name)
            .map_err(|source| ResourceError::Open {
                pin: name.to_string(),
                source,
            })?;
        log::debug!("opened {name}");
        Ok(Self::new(gpio))
    }

    /// Wrap an already open pin
    pub fn new(gpio: P) -> Self {
        Self {
            name: gpio.name().to_string(),
            gpio: Some(gpio),
            callback_registered: false,
        }
    }

    /// Platform identifier of the pin
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`close`](PinConnection::close) has run
    pub fn is_closed(&self) -> bool {
        self.gpio.is_none()
    }

    fn gpio_mut(&mut self) -> Result<&mut P, ResourceError<P::Error>> {
        self.gpio.as_mut().ok_or(ResourceError::Closed)
    }

    /// Make the pin an input that interrupts on both edges
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configure`] on I/O failure, or
    /// [`ResourceError::Closed`] after close.
    pub fn configure(&mut self) -> Result<(), ResourceError<P::Error>> {
        let gpio = self.gpio_mut()?;
        gpio.set_direction(Direction::In)
            .map_err(ResourceError::Configure)?;
        gpio.set_edge_trigger(EdgeTrigger::Both)
            .map_err(ResourceError::Configure)?;
        log::debug!("{} configured as input, both edges", self.name);
        Ok(())
    }

    /// Register the edge handler, replacing any previous registration
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Register`] if the platform refuses it, or
    /// [`ResourceError::Closed`] after close.
    pub fn register_callback(
        &mut self,
        callback: GpioCallback<P::Error>,
    ) -> Result<(), ResourceError<P::Error>> {
        self.gpio_mut()?
            .register_callback(callback)
            .map_err(ResourceError::Register)?;
        self.callback_registered = true;
        Ok(())
    }

    /// Current electrical level, `true` = high
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Read`] on I/O failure, or
    /// [`ResourceError::Closed`] after close.
    pub fn read_level(&mut self) -> Result<bool, ResourceError<P::Error>> {
        self.gpio_mut()?.is_high().map_err(ResourceError::Read)
    }

    /// Unregister the edge handler and release the pin
    ///
    /// Calling this again is a no-op. Platform close failures are logged and
    /// otherwise ignored; the connection is marked closed regardless.
    pub fn close(&mut self) {
        let Some(mut gpio) = self.gpio.take() else {
            return;
        };
        if self.callback_registered {
            gpio.unregister_callback();
            self.callback_registered = false;
        }
        if let Err(e) = gpio.close() {
            log::warn!("closing {} failed: {e:?}", self.name);
        }
        log::debug!("closed {}", self.name);
    }
}

impl<P: Gpio> Drop for PinConnection<P> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockError, MockPeripheralManager};

    #[test]
    fn open_unknown_pin_fails() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let result = PinConnection::open(&mut manager, "GPIO99");
        assert!(matches!(result, Err(ResourceError::Open { ref pin, .. }) if pin == "GPIO99"));
        assert_eq!(manager.open_count("GPIO99"), 0);
    }

    #[test]
    fn configure_sets_input_and_both_edges() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut connection = PinConnection::open(&mut manager, "GPIO6").unwrap();
        connection.configure().unwrap();
        assert_eq!(manager.direction("GPIO6"), Some(Direction::In));
        assert_eq!(manager.edge_trigger("GPIO6"), Some(EdgeTrigger::Both));
    }

    #[test]
    fn read_after_close_is_an_error() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut connection = PinConnection::open(&mut manager, "GPIO6").unwrap();
        connection.close();
        assert!(connection.is_closed());
        assert!(matches!(connection.read_level(), Err(ResourceError::Closed)));
        assert!(matches!(connection.configure(), Err(ResourceError::Closed)));
    }

    #[test]
    fn read_failure_is_reported() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut connection = PinConnection::open(&mut manager, "GPIO6").unwrap();
        manager.fail_reads("GPIO6", true);
        assert!(matches!(
            connection.read_level(),
            Err(ResourceError::Read(MockError::Io))
        ));

        manager.fail_reads("GPIO6", false);
        assert_eq!(connection.read_level().ok(), Some(true));
    }

    #[test]
    fn close_is_idempotent() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        let mut connection = PinConnection::open(&mut manager, "GPIO6").unwrap();
        connection
            .register_callback(Box::new(|_: &mut dyn InputPin<Error = MockError>| true))
            .unwrap();
        connection.close();
        connection.close();
        assert_eq!(manager.close_calls("GPIO6"), 1);
        assert_eq!(manager.unregister_calls("GPIO6"), 1);
    }

    #[test]
    fn close_failure_still_marks_closed() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        manager.fail_close("GPIO6", true);
        let mut connection = PinConnection::open(&mut manager, "GPIO6").unwrap();
        connection.close();
        assert!(connection.is_closed());
        assert_eq!(manager.close_calls("GPIO6"), 1);
    }

    #[test]
    fn drop_releases_the_pin() {
        let mut manager = MockPeripheralManager::new(&["GPIO6"]);
        {
            let _connection = PinConnection::open(&mut manager, "GPIO6").unwrap();
            assert_eq!(manager.open_count("GPIO6"), 1);
        }
        assert_eq!(manager.open_count("GPIO6"), 0);
    }
}
