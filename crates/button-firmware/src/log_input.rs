//! Input framework stand-in that writes key frames to the log
//!
//! ESP-IDF has no input subsystem; this lets the firmware exercise the key
//! bridge and shows exactly what a host would receive.

use core::convert::Infallible;

use gpio_button::{Capabilities, InputDevice, InputEvent, InputFramework, EV_KEY, EV_SYN};

pub struct LogInputFramework;

impl InputFramework for LogInputFramework {
    type Device = LogInputDevice;
    type Error = Infallible;

    fn build_device(&mut self, capabilities: &Capabilities) -> Result<LogInputDevice, Infallible> {
        for (kind, codes) in capabilities {
            log::info!("input device supports {} {:?}", kind_name(*kind), codes);
        }
        Ok(LogInputDevice)
    }
}

pub struct LogInputDevice;

impl InputDevice for LogInputDevice {
    type Error = Infallible;

    fn emit(&self, events: &[InputEvent]) -> Result<(), Infallible> {
        for event in events {
            log::info!(
                "input: {} code={} value={}",
                kind_name(event.kind),
                event.code,
                event.value
            );
        }
        Ok(())
    }
}

fn kind_name(kind: u16) -> &'static str {
    match kind {
        EV_SYN => "EV_SYN",
        EV_KEY => "EV_KEY",
        _ => "EV_?",
    }
}
