//! ESP-IDF backend for the button driver
//!
//! Pins are opened by name (`"GPIO9"`). Edge interrupts are raised by the
//! GPIO ISR service, which only wakes a dispatcher thread; the driver's edge
//! callback runs on that thread, never in interrupt context.

use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use embedded_hal::digital::{ErrorKind, ErrorType, InputPin};
use esp_idf_svc::hal::delay::BLOCK;
use esp_idf_svc::hal::gpio::{AnyIOPin, Input, InterruptType, PinDriver, Pull};
use esp_idf_svc::hal::task::notification::{Notification, Notifier};
use esp_idf_svc::sys::EspError;

use gpio_button::{Direction, EdgeTrigger, Gpio, GpioCallback, PeripheralManager};

const DISPATCH_STACK_BYTES: usize = 6 * 1024;

type Driver = PinDriver<'static, AnyIOPin, Input>;

#[derive(Debug)]
pub enum EspGpioError {
    /// Name is not of the form `GPIO<n>` or `<n>`
    UnknownPin,
    /// Pin is held by another connection
    Busy,
    /// Pin was used after close
    Closed,
    /// Requested mode is not available on an input driver
    Unsupported,
    /// Dispatcher thread could not be started
    Thread,
    Esp(EspError),
}

impl From<EspError> for EspGpioError {
    fn from(e: EspError) -> Self {
        EspGpioError::Esp(e)
    }
}

impl core::fmt::Display for EspGpioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EspGpioError::UnknownPin => write!(f, "Unknown pin name"),
            EspGpioError::Busy => write!(f, "Pin already in use"),
            EspGpioError::Closed => write!(f, "Pin is closed"),
            EspGpioError::Unsupported => write!(f, "Unsupported pin mode"),
            EspGpioError::Thread => write!(f, "Failed to start edge dispatcher"),
            EspGpioError::Esp(e) => write!(f, "ESP-IDF error: {e}"),
        }
    }
}

impl core::error::Error for EspGpioError {}

impl embedded_hal::digital::Error for EspGpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parse `"GPIO9"`, `"gpio9"` or `"9"` into a pin number
fn parse_pin(name: &str) -> Option<i32> {
    let digits = name
        .strip_prefix("GPIO")
        .or_else(|| name.strip_prefix("gpio"))
        .unwrap_or(name);
    digits.parse().ok().filter(|n| *n >= 0)
}

/// Hands out GPIO pins by name
///
/// Each pin number can be held by one [`EspGpio`] at a time.
pub struct EspPeripheralManager {
    taken: Arc<Mutex<BTreeSet<i32>>>,
    pull: Pull,
}

impl EspPeripheralManager {
    /// Create the manager; pins are opened with the given pull resistor
    ///
    /// # Safety
    ///
    /// Pins handed out by this manager must not also be taken through
    /// `Peripherals::take()` or another manager.
    pub unsafe fn new(pull: Pull) -> Self {
        Self {
            taken: Arc::new(Mutex::new(BTreeSet::new())),
            pull,
        }
    }
}

impl PeripheralManager for EspPeripheralManager {
    type Gpio = EspGpio;

    fn open_gpio(&mut self, name: &str) -> Result<EspGpio, EspGpioError> {
        let number = parse_pin(name).ok_or(EspGpioError::UnknownPin)?;
        if !lock(&self.taken).insert(number) {
            return Err(EspGpioError::Busy);
        }

        // SAFETY: the taken set guarantees a single driver per pin number
        let pin = unsafe { AnyIOPin::new(number) };
        let opened = PinDriver::input(pin).and_then(|mut driver| {
            driver.set_pull(self.pull)?;
            Ok(driver)
        });
        let driver = match opened {
            Ok(driver) => driver,
            Err(e) => {
                lock(&self.taken).remove(&number);
                return Err(e.into());
            }
        };

        Ok(EspGpio {
            name: name.to_string(),
            number,
            driver: Some(Arc::new(Mutex::new(driver))),
            dispatcher: None,
            taken: self.taken.clone(),
        })
    }
}

/// Background thread that runs the edge callback after each interrupt
struct Dispatcher {
    stop: Arc<AtomicBool>,
    notifier: Arc<Notifier>,
    thread: JoinHandle<()>,
}

/// Level view handed to the edge callback
struct EdgeLevel<'a>(&'a Driver);

impl ErrorType for EdgeLevel<'_> {
    type Error = EspGpioError;
}

impl InputPin for EdgeLevel<'_> {
    fn is_high(&mut self) -> Result<bool, EspGpioError> {
        Ok(PinDriver::is_high(self.0))
    }

    fn is_low(&mut self) -> Result<bool, EspGpioError> {
        Ok(PinDriver::is_low(self.0))
    }
}

/// One ESP32 GPIO configured as input
pub struct EspGpio {
    name: String,
    number: i32,
    /// `None` once closed
    driver: Option<Arc<Mutex<Driver>>>,
    dispatcher: Option<Dispatcher>,
    taken: Arc<Mutex<BTreeSet<i32>>>,
}

impl EspGpio {
    fn driver(&self) -> Result<&Arc<Mutex<Driver>>, EspGpioError> {
        self.driver.as_ref().ok_or(EspGpioError::Closed)
    }

    fn spawn_dispatcher(
        &self,
        driver: Arc<Mutex<Driver>>,
        mut callback: GpioCallback<EspGpioError>,
    ) -> Result<Dispatcher, EspGpioError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();
        let (notifier_tx, notifier_rx) = mpsc::sync_channel(1);

        let thread = std::thread::Builder::new()
            .name(format!("{}-edges", self.name))
            .stack_size(DISPATCH_STACK_BYTES)
            .spawn(move || {
                // Notifications target the task that created them
                let notification = Notification::new();
                if notifier_tx.send(notification.notifier()).is_err() {
                    return;
                }
                // Stay parked until stopped, so the notifier never targets a dead task
                let mut active = true;
                loop {
                    if notification.wait(BLOCK).is_none() {
                        continue;
                    }
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    if !active {
                        continue;
                    }
                    let mut driver = lock(&driver);
                    let keep_active = {
                        let mut level = EdgeLevel(&*driver);
                        let pin: &mut dyn InputPin<Error = EspGpioError> = &mut level;
                        callback(pin)
                    };
                    if !keep_active {
                        log::info!("edge delivery deactivated by listener");
                        active = false;
                        continue;
                    }
                    // esp-idf-hal disables the interrupt after each edge
                    if let Err(e) = driver.enable_interrupt() {
                        log::error!("re-enabling interrupt failed: {e}");
                        active = false;
                    }
                }
            })
            .map_err(|_| EspGpioError::Thread)?;

        let notifier = notifier_rx.recv().map_err(|_| EspGpioError::Thread)?;
        Ok(Dispatcher {
            stop,
            notifier,
            thread,
        })
    }
}

impl ErrorType for EspGpio {
    type Error = EspGpioError;
}

impl InputPin for EspGpio {
    fn is_high(&mut self) -> Result<bool, EspGpioError> {
        Ok(PinDriver::is_high(&*lock(self.driver()?)))
    }

    fn is_low(&mut self) -> Result<bool, EspGpioError> {
        Ok(PinDriver::is_low(&*lock(self.driver()?)))
    }
}

impl Gpio for EspGpio {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), EspGpioError> {
        self.driver()?;
        match direction {
            Direction::In => Ok(()),
            _ => Err(EspGpioError::Unsupported),
        }
    }

    fn set_edge_trigger(&mut self, trigger: EdgeTrigger) -> Result<(), EspGpioError> {
        let mut driver = lock(self.driver()?);
        match trigger {
            EdgeTrigger::None => driver.disable_interrupt()?,
            EdgeTrigger::Rising => driver.set_interrupt_type(InterruptType::PosEdge)?,
            EdgeTrigger::Falling => driver.set_interrupt_type(InterruptType::NegEdge)?,
            EdgeTrigger::Both => driver.set_interrupt_type(InterruptType::AnyEdge)?,
        }
        Ok(())
    }

    fn register_callback(
        &mut self,
        callback: GpioCallback<EspGpioError>,
    ) -> Result<(), EspGpioError> {
        self.unregister_callback();
        let driver = self.driver()?.clone();
        let dispatcher = self.spawn_dispatcher(driver.clone(), callback)?;

        let isr_notifier = dispatcher.notifier.clone();
        let subscribed = {
            let mut driver = lock(&driver);
            // SAFETY: the ISR closure only signals the dispatcher task
            unsafe {
                driver.subscribe(move || {
                    isr_notifier.notify_and_yield(NonZeroU32::MIN);
                })
            }
            .and_then(|()| driver.enable_interrupt())
        };
        self.dispatcher = Some(dispatcher);
        if let Err(e) = subscribed {
            self.unregister_callback();
            return Err(e.into());
        }
        log::debug!("GPIO{} edge callback registered", self.number);
        Ok(())
    }

    fn unregister_callback(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        if let Some(driver) = &self.driver {
            if let Err(e) = lock(driver).unsubscribe() {
                log::warn!("GPIO{} unsubscribe failed: {e}", self.number);
            }
        }
        dispatcher.stop.store(true, Ordering::Release);
        // SAFETY: plain task notification from task context
        unsafe {
            dispatcher.notifier.notify_and_yield(NonZeroU32::MIN);
        }
        if dispatcher.thread.join().is_err() {
            log::error!("GPIO{} edge dispatcher panicked", self.number);
        }
    }

    fn close(&mut self) -> Result<(), EspGpioError> {
        self.unregister_callback();
        // Dropping the last driver reference resets the pin
        self.driver.take().ok_or(EspGpioError::Closed)?;
        lock(&self.taken).remove(&self.number);
        Ok(())
    }
}

impl Drop for EspGpio {
    fn drop(&mut self) {
        if self.driver.is_some() {
            let _ = self.close();
        }
    }
}
