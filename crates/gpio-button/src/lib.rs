//! # gpio-button
//!
//! Driver for GPIO buttons wired with a pull-up or pull-down resistor.
//!
//! The driver opens one input pin, listens for edge interrupts on both
//! transitions and reports logical pressed/released events to a listener.
//! It can also feed a host input framework as a single-key input device.
//!
//! ## Layout
//!
//! - [`interface`]: the platform collaborators ([`PeripheralManager`],
//!   [`Gpio`]) and the owned [`PinConnection`]
//! - [`button`]: [`ButtonMonitor`], polarity translation and listener dispatch
//! - [`input`]: key + sync frames for the input framework
//! - [`config`]: [`Polarity`] and the configuration [`Builder`]
//! - [`mock`]: in-memory peripherals for tests and simulators
//!
//! ## Example
//!
//! ```
//! use gpio_button::mock::{MockInputFramework, MockPeripheralManager};
//! use gpio_button::{Builder, ButtonMonitor, InputEvent, Polarity};
//!
//! let mut manager = MockPeripheralManager::new(&["GPIO6"]);
//! let mut framework = MockInputFramework::new();
//!
//! let config = Builder::new()
//!     .pin("GPIO6")
//!     .polarity(Polarity::PressedWhenLow)
//!     .build()
//!     .expect("valid configuration");
//!
//! let mut button = ButtonMonitor::open_with_config(&mut manager, &config).unwrap();
//! let device = button.create_input_driver(&mut framework, 28).unwrap();
//!
//! // Pull-up wiring: the pin goes low while the button is held
//! manager.trigger_edge("GPIO6", false);
//! assert_eq!(
//!     device.emissions(),
//!     vec![vec![InputEvent::key(28, true), InputEvent::sync()]]
//! );
//!
//! button.close();
//! assert_eq!(manager.open_count("GPIO6"), 0);
//! ```

pub mod button;
pub mod config;
pub mod error;
pub mod input;
pub mod interface;
pub mod mock;

pub use button::{ButtonEventListener, ButtonMonitor};
pub use config::{Builder, Config, Direction, EdgeTrigger, Polarity};
pub use error::{BuilderError, ResourceError};
pub use input::{
    ButtonInputDriver, Capabilities, InputDevice, InputEvent, InputFramework, EV_KEY, EV_SYN,
    KEY_PRESSED, KEY_RELEASED, SYN_REPORT,
};
pub use interface::{Gpio, GpioCallback, PeripheralManager, PinConnection};
