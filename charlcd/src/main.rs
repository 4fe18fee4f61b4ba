mod config;
mod console;

use crate::config::{Backend, Config};
use charlcd_gpio::gpiod::GpiodDriver;
use charlcd_gpio::lcd::hd44780::{HD44780Handle, LcdResult};
use charlcd_gpio::mock::MockGpioDriver;
use charlcd_gpio::raw::RawGpioDriver;
use dotenv::dotenv;
use log::{debug, info, warn};
use std::io::BufRead;
use sysinfo::System;

fn spawn_display(config: &Config) -> LcdResult<HD44780Handle> {
    let pins = config.pins;
    let display = config.display;
    let timing = config.timing;

    match config.backend.clone() {
        Backend::Gpiomem => HD44780Handle::spawn(RawGpioDriver::new_gpiomem, pins, display, timing),
        Backend::Mem => HD44780Handle::spawn(RawGpioDriver::new_mem, pins, display, timing),
        Backend::Gpiod { chip } => {
            HD44780Handle::spawn(move || GpiodDriver::open(&chip), pins, display, timing)
        }
        Backend::Mock => {
            HD44780Handle::spawn(|| Ok(MockGpioDriver::unrecorded(64)), pins, display, timing)
        }
    }
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "charlcd v{} on {}",
        env!("CARGO_PKG_VERSION"),
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    debug!("Trying to load config...");
    let mut config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    config.apply_env()?;

    info!("LCD @ {:?} via {:?}", config.pins, config.backend);
    info!(
        "Display {}x{}, {:?} font, {:?}",
        config.display.cols, config.display.lines, config.display.font, config.display.direction
    );

    debug!("Initializing LCD...");
    let lcd = spawn_display(&config)?;
    debug!("{:?} initialized.", lcd);

    let host_name = System::host_name();
    lcd.print(host_name.as_deref().unwrap_or(UNKNOWN_STR))?;
    if config.display.lines > 1 {
        lcd.set_cursor(1, 0)?;
        lcd.print(concat!("charlcd v", env!("CARGO_PKG_VERSION")))?;
    }

    info!("Reading lines from stdin...");
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let request = match console::parse_line(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!("{}", err);
                continue;
            }
        };

        debug!("Request: {:?}", request);
        if let Err(err) = lcd.request(request) {
            // The worker re-initializes the display on its own before the next request.
            warn!("Display error: {}", err);
        }
    }

    info!("Input closed, shutting down.");
    lcd.shutdown();

    Ok(())
}
