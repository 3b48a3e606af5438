//! Configuration file management for simurgh.
//!
//! Reads/writes `~/.simurgh/config.yaml` with the listen address, base
//! location, display settings and tracking options. Command-line flags are
//! layered on top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::TimeDelta;

use crate::cpr::PairingPolicy;
use crate::tracker::{ClockSource, TrackerConfig};
use crate::types::{Position, Result, SimurghError};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen: ListenConfig,
    pub base: BaseConfig,
    pub display: DisplayConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

/// Receiver location, used only for distances.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaseConfig {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    pub sort: SortMode,
    /// Seconds without a message before an aircraft is hidden.
    pub stale_after: u64,
    /// Minimum seconds between redraws.
    pub refresh: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingConfig {
    /// Maximum seconds between paired position frames.
    pub max_pair_age: Option<u64>,
    pub clock: ClockSource,
}

/// Table ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Most recent message first.
    #[default]
    Recency,
    /// Nearest to the base first.
    Distance,
    /// Callsign, then address.
    Callsign,
}

impl FromStr for SortMode {
    type Err = SimurghError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "recency" => Ok(SortMode::Recency),
            "1" | "distance" => Ok(SortMode::Distance),
            "2" | "callsign" => Ok(SortMode::Callsign),
            _ => Err(SimurghError::InvalidSortMode(s.to_string())),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMode::Recency => f.write_str("recency"),
            SortMode::Distance => f.write_str("distance"),
            SortMode::Callsign => f.write_str("callsign"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: ListenConfig {
                host: "0.0.0.0".into(),
                port: 8081,
            },
            base: BaseConfig::default(),
            display: DisplayConfig {
                sort: SortMode::Recency,
                stale_after: 60,
                refresh: 1,
            },
            tracking: TrackingConfig::default(),
        }
    }
}

impl Config {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }

    /// Base position, when both coordinates are set.
    pub fn base_position(&self) -> Option<Position> {
        Some(Position::new(self.base.lat?, self.base.lon?))
    }

    /// Check that every duration setting fits a `TimeDelta`.
    pub fn validate(&self) -> Result<()> {
        seconds("stale_after", self.display.stale_after)?;
        seconds("refresh", self.display.refresh)?;
        if let Some(v) = self.tracking.max_pair_age {
            seconds("max_pair_age", v)?;
        }
        Ok(())
    }

    pub fn stale_after(&self) -> TimeDelta {
        saturating_seconds(self.display.stale_after)
    }

    pub fn refresh(&self) -> TimeDelta {
        saturating_seconds(self.display.refresh)
    }

    /// The part of the configuration the decoding path sees.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            pairing: PairingPolicy {
                max_pair_age: self.tracking.max_pair_age.map(saturating_seconds),
            },
            clock: self.tracking.clock,
        }
    }
}

/// `v` seconds as a `TimeDelta`, or a config error naming `key` when it
/// does not fit.
pub fn seconds(key: &str, v: u64) -> Result<TimeDelta> {
    i64::try_from(v)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| SimurghError::Config(format!("{key}: {v} seconds is out of range")))
}

// Saturates on values that `validate` rejects.
fn saturating_seconds(v: u64) -> TimeDelta {
    seconds("", v).unwrap_or(TimeDelta::MAX)
}

/// Get the config directory path (`~/.simurgh/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".simurgh")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.simurgh/config.yaml`.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_file())
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Save config to `~/.simurgh/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to `path`, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| SimurghError::Config(format!("{}: {e}", dir.display())))?;
    }
    std::fs::write(path, serialize_config(config))
        .map_err(|e| SimurghError::Config(format!("{}: {e}", path.display())))?;
    Ok(())
}

/// Parse simple YAML-like config text.
///
/// Unknown sections and keys are ignored. A value that fails to parse is an
/// error naming the key.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }
        let Some(section) = current_section.as_deref() else {
            continue;
        };

        match (section, key) {
            ("listen", "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.listen.host = v;
                }
            }
            ("listen", "port") => config.listen.port = parse_number(key, val)?,
            ("base", "lat") => config.base.lat = parse_float_value(key, val)?,
            ("base", "lon") => config.base.lon = parse_float_value(key, val)?,
            ("display", "sort") => {
                if let Some(v) = parse_string_value(val) {
                    config.display.sort = v.parse()?;
                }
            }
            ("display", "stale_after") => config.display.stale_after = parse_number(key, val)?,
            ("display", "refresh") => config.display.refresh = parse_number(key, val)?,
            ("tracking", "max_pair_age") => {
                config.tracking.max_pair_age = match parse_string_value(val) {
                    Some(_) => Some(parse_number(key, val)?),
                    None => None,
                }
            }
            ("tracking", "clock") => {
                if let Some(v) = parse_string_value(val) {
                    config.tracking.clock = v.parse()?;
                }
            }
            _ => {}
        }
    }

    config.validate()?;
    Ok(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(key: &str, val: &str) -> Result<Option<f64>> {
    if val == "null" || val == "~" || val.is_empty() {
        return Ok(None);
    }
    val.parse()
        .map(Some)
        .map_err(|_| SimurghError::Config(format!("{key}: not a number: {val}")))
}

fn parse_number<T: FromStr>(key: &str, val: &str) -> Result<T> {
    val.parse()
        .map_err(|_| SimurghError::Config(format!("{key}: not a valid number: {val}")))
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let null_or = |v: Option<String>| v.unwrap_or_else(|| "null".into());

    let lines = [
        "# simurgh configuration".to_string(),
        String::new(),
        "listen:".into(),
        format!("  host: \"{}\"", config.listen.host),
        format!("  port: {}", config.listen.port),
        String::new(),
        "base:".into(),
        format!("  lat: {}", null_or(config.base.lat.map(|v| v.to_string()))),
        format!("  lon: {}", null_or(config.base.lon.map(|v| v.to_string()))),
        String::new(),
        "display:".into(),
        format!("  sort: {}", config.display.sort),
        format!("  stale_after: {}", config.display.stale_after),
        format!("  refresh: {}", config.display.refresh),
        String::new(),
        "tracking:".into(),
        format!(
            "  max_pair_age: {}",
            null_or(config.tracking.max_pair_age.map(|v| v.to_string()))
        ),
        format!("  clock: {}", config.tracking.clock),
    ];

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
