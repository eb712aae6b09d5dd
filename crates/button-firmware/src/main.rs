mod esp_gpio;
mod log_input;
mod runtime_diagnostics;

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::Pull;

use gpio_button::{Builder, ButtonMonitor, Polarity};

use esp_gpio::EspPeripheralManager;
use log_input::LogInputFramework;
use runtime_diagnostics::{configure_pthread_defaults, log_heap};

/// BOOT button on most ESP32 dev boards, pulled up and shorted to ground when pressed
const BUTTON_PIN: &str = "GPIO9";
const BUTTON_POLARITY: Polarity = Polarity::PressedWhenLow;
/// KEY_ENTER
const BUTTON_KEY: u16 = 28;
/// Releases to observe before the demo switches from the plain listener to key events
const RELEASES_BEFORE_KEYS: usize = 3;

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log_heap("startup");
    configure_pthread_defaults();

    let config = match Builder::new().pin(BUTTON_PIN).polarity(BUTTON_POLARITY).build() {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid button configuration: {e}");
            return;
        }
    };

    // SAFETY: this is the only place pins are taken in this firmware
    let mut manager = unsafe { EspPeripheralManager::new(Pull::Up) };
    let mut button = match ButtonMonitor::open_with_config(&mut manager, &config) {
        Ok(button) => button,
        Err(e) => {
            log::error!("failed to open button on {}: {e}", config.pin);
            return;
        }
    };
    match button.read_pressed() {
        Ok(pressed) => log::info!("{} initially {}", config.pin, state_name(pressed)),
        Err(e) => log::warn!("initial read of {} failed: {e}", config.pin),
    }

    let (released_tx, released_rx) = std::sync::mpsc::channel();
    button.listen(move |pressed: bool| {
        log::info!("button {}", state_name(pressed));
        if !pressed {
            let _ = released_tx.send(());
        }
        true
    });

    for _ in 0..RELEASES_BEFORE_KEYS {
        if released_rx.recv().is_err() {
            break;
        }
    }

    let mut framework = LogInputFramework;
    match button.create_input_driver(&mut framework, BUTTON_KEY) {
        Ok(_device) => log::info!("{} now emits key {}", config.pin, BUTTON_KEY),
        Err(e) => match e {},
    }
    log_heap("running");

    loop {
        FreeRtos::delay_ms(1000);
    }
}

fn state_name(pressed: bool) -> &'static str {
    if pressed {
        "pressed"
    } else {
        "released"
    }
}
