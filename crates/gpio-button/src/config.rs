//! Button configuration types and builder

pub use crate::error::BuilderError;

/// Logic level at which the button is considered pressed
///
/// A button wired with a pull-down resistor reads high while pressed; one
/// wired with a pull-up reads low.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// High level means pressed (pull-down wiring)
    PressedWhenHigh,
    /// Low level means pressed (pull-up wiring)
    #[default]
    PressedWhenLow,
}

impl Polarity {
    /// Translate an electrical level (`true` = high) into the logical pressed state
    pub fn is_pressed(self, level: bool) -> bool {
        match self {
            Polarity::PressedWhenHigh => level,
            Polarity::PressedWhenLow => !level,
        }
    }
}

/// Pin direction
///
/// The driver only ever reads its pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Direction {
    /// Input pin
    In,
}

/// Signal transitions that raise an edge interrupt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeTrigger {
    /// No interrupts
    None,
    /// Low to high transitions
    Rising,
    /// High to low transitions
    Falling,
    /// Both transitions
    Both,
}

/// Button configuration
///
/// Use [`Builder`] to create a Config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Platform pin identifier, e.g. `"GPIO6"`
    pub pin: String,
    /// Level at which the button reads as pressed
    pub polarity: Polarity,
}

/// Builder for constructing button configuration
///
/// # Example
///
/// ```
/// use gpio_button::{Builder, Polarity};
///
/// let config = Builder::new()
///     .pin("GPIO6")
///     .polarity(Polarity::PressedWhenLow)
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.pin, "GPIO6");
/// ```
#[derive(Default)]
pub struct Builder {
    /// Pin identifier (required)
    pin: Option<String>,
    /// Button polarity
    polarity: Polarity,
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the platform pin identifier (required)
    pub fn pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// Set the button polarity
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::MissingPin` if no pin was set, or
    /// `BuilderError::EmptyPinName` if the pin name is empty
    pub fn build(self) -> Result<Config, BuilderError> {
        let pin = self.pin.ok_or(BuilderError::MissingPin)?;
        if pin.trim().is_empty() {
            return Err(BuilderError::EmptyPinName);
        }
        Ok(Config {
            pin,
            polarity: self.polarity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressed_when_high_follows_level() {
        assert!(Polarity::PressedWhenHigh.is_pressed(true));
        assert!(!Polarity::PressedWhenHigh.is_pressed(false));
    }

    #[test]
    fn pressed_when_low_inverts_level() {
        assert!(!Polarity::PressedWhenLow.is_pressed(true));
        assert!(Polarity::PressedWhenLow.is_pressed(false));
    }

    #[test]
    fn builder_defaults_to_pull_up_wiring() {
        let config = Builder::new().pin("BCM21").build().unwrap();
        assert_eq!(config.polarity, Polarity::PressedWhenLow);
    }

    #[test]
    fn builder_rejects_blank_pin() {
        assert_eq!(
            Builder::new().pin("   ").build(),
            Err(BuilderError::EmptyPinName)
        );
    }
}
