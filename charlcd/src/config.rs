use charlcd_gpio::lcd::hd44780::{DisplayConfig, PinNumbers, Timing};
use dotenv::var;
use serde::{Deserialize, Serialize};
use eyre::WrapErr;
use std::path::{Path, PathBuf};

/// Where the GPIO pins come from.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    /// Raspberry Pi registers through `/dev/gpiomem`.
    Gpiomem,
    /// Raspberry Pi registers through `/dev/mem`.
    Mem,
    /// Linux GPIO character device.
    Gpiod { chip: String },
    /// No hardware, pin writes are only logged.
    Mock,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Gpiod {
            chip: "/dev/gpiochip0".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub pins: PinNumbers,
    pub display: DisplayConfig,
    pub timing: Timing,
}

impl Config {
    fn path() -> PathBuf {
        PathBuf::from(var("CHARLCD_CONFIG").unwrap_or_else(|_| "charlcd.json".to_string()))
    }

    /// Loads the config file, or gives `None` when there is none yet.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    fn load_from(config_path: &Path) -> eyre::Result<Option<Self>> {
        let file = match std::fs::File::open(config_path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("Cannot open {}", config_path.display()));
            }
        };
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .wrap_err_with(|| format!("Invalid config in {}", config_path.display()))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::path())
    }

    fn save_to(&self, config_path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(config_path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Overrides the pins with `CHARLCD_PIN_E`, `CHARLCD_PIN_RS` and `CHARLCD_PINS_DATA`, where
    /// they're set.
    pub fn apply_env(&mut self) -> eyre::Result<()> {
        if let Ok(pin) = var("CHARLCD_PIN_E") {
            self.pins.enable = pin.trim().parse()?;
        }
        if let Ok(pin) = var("CHARLCD_PIN_RS") {
            self.pins.register_select = pin.trim().parse()?;
        }
        if let Ok(pins) = var("CHARLCD_PINS_DATA") {
            let [data4, data5, data6, data7] = parse_pin_bus(&pins)?;
            self.pins = PinNumbers {
                data4,
                data5,
                data6,
                data7,
                ..self.pins
            };
        }
        Ok(())
    }
}

/// Parses a 4-bit data bus given as `D4,D5,D6,D7`. Commas, semicolons and spaces all work as
/// separators.
pub fn parse_pin_bus(pin_str: &str) -> eyre::Result<[usize; 4]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|_| eyre::eyre!("Invalid number of data pins"))
}
