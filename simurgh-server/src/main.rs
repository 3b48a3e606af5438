//! simurgh: live aircraft table from a Beast-format receiver feed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use simurgh_core::config::{self, Config, SortMode};
use simurgh_core::tracker::ClockSource;
use simurgh_core::types::Result;

mod display;
mod listener;

use display::Presenter;

#[derive(Parser)]
#[command(name = "simurgh", version, about = "Mode S / ADS-B Beast feed decoder")]
struct Cli {
    /// Config file (default ~/.simurgh/config.yaml)
    #[arg(long, global = true, env = "SIMURGH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept one receiver connection and show live aircraft
    Listen {
        #[command(flatten)]
        settings: Settings,

        /// Print JSON snapshot lines instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Decode a recorded Beast stream from a file
    Replay {
        /// Path to a raw Beast capture
        file: PathBuf,

        #[command(flatten)]
        settings: Settings,

        /// Print JSON snapshot lines instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write the configuration file, applying any flags given
    Config {
        #[command(flatten)]
        settings: Settings,
    },
}

/// Flags that override the config file.
#[derive(Args, Debug, Default)]
struct Settings {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Base latitude for distances
    #[arg(long, allow_hyphen_values = true)]
    base_lat: Option<f64>,

    /// Base longitude for distances
    #[arg(long, allow_hyphen_values = true)]
    base_lon: Option<f64>,

    /// Table order: 0/recency, 1/distance, 2/callsign
    #[arg(short, long)]
    sort: Option<SortMode>,

    /// Hide aircraft silent for this many seconds
    #[arg(long)]
    stale_after: Option<u64>,

    /// Minimum seconds between redraws
    #[arg(long)]
    refresh: Option<u64>,

    /// Ignore position frames older than this many seconds when pairing
    #[arg(long)]
    max_pair_age: Option<u64>,

    /// Registry clock: receiver or arrival
    #[arg(long)]
    clock: Option<ClockSource>,
}

impl Settings {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.host {
            config.listen.host = v;
        }
        if let Some(v) = self.port {
            config.listen.port = v;
        }
        if let Some(v) = self.base_lat {
            config.base.lat = Some(v);
        }
        if let Some(v) = self.base_lon {
            config.base.lon = Some(v);
        }
        if let Some(v) = self.sort {
            config.display.sort = v;
        }
        if let Some(v) = self.stale_after {
            config.display.stale_after = v;
        }
        if let Some(v) = self.refresh {
            config.display.refresh = v;
        }
        if let Some(v) = self.max_pair_age {
            config.tracking.max_pair_age = Some(v);
        }
        if let Some(v) = self.clock {
            config.tracking.clock = v;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&Path>, settings: Settings) -> Result<Config> {
    let mut config = match path {
        Some(p) => config::load_config_from(p)?,
        None => config::load_config()?,
    };
    settings.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn presenter(config: &Config, json: bool) -> Presenter {
    use std::io::IsTerminal;
    Presenter::new(config, json).with_clear_screen(std::io::stdout().is_terminal())
}

async fn run(cli: Cli) -> Result<()> {
    let mut out = std::io::stdout();

    match cli.command {
        Commands::Listen { settings, json } => {
            let config = load(cli.config.as_deref(), settings)?;
            listener::listen(&config, &mut presenter(&config, json), &mut out).await
        }
        Commands::Replay {
            file,
            settings,
            json,
        } => {
            let config = load(cli.config.as_deref(), settings)?;
            listener::replay(&config, &file, &mut presenter(&config, json), &mut out).await
        }
        Commands::Config { settings } => {
            let config = load(cli.config.as_deref(), settings)?;
            let path = match &cli.config {
                Some(p) => {
                    config::save_config_to(&config, p)?;
                    p.clone()
                }
                None => config::save_config(&config)?,
            };
            println!("Config written to {}", path.display());
            print!("{}", config::serialize_config(&config));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "simurgh", "listen", "--port", "30005", "--sort", "distance", "--base-lat", "-33.9",
            "--base-lon", "151.2", "--clock", "arrival", "--max-pair-age", "10",
        ]);
        let Commands::Listen { settings, json } = cli.command else {
            panic!("expected listen");
        };
        assert!(!json);

        let mut config = Config::default();
        settings.apply(&mut config);
        assert_eq!(config.bind_addr(), "0.0.0.0:30005");
        assert_eq!(config.display.sort, SortMode::Distance);
        assert_eq!(config.base.lat, Some(-33.9));
        assert_eq!(config.tracking.clock, ClockSource::Arrival);
        assert_eq!(config.tracking.max_pair_age, Some(10));
    }

    #[test]
    fn test_numeric_sort_mode_flag() {
        let cli = Cli::parse_from(["simurgh", "replay", "cap.bin", "-s", "2", "--json"]);
        let Commands::Replay { file, settings, json } = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(file, PathBuf::from("cap.bin"));
        assert_eq!(settings.sort, Some(SortMode::Callsign));
        assert!(json);
    }

    #[test]
    fn test_bad_sort_mode_rejected() {
        assert!(Cli::try_parse_from(["simurgh", "listen", "--sort", "altitude"]).is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "listen:\n  port: 9999\n").unwrap();

        let settings = Settings {
            host: Some("127.0.0.1".into()),
            ..Default::default()
        };
        let config = load(Some(path.as_path()), settings).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9999");
    }

    #[test]
    fn test_out_of_range_duration_flag_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let cli = Cli::parse_from(["simurgh", "listen", "--stale-after", "18446744073709551615"]);
        let Commands::Listen { settings, .. } = cli.command else {
            panic!("expected listen");
        };
        assert!(matches!(
            load(Some(path.as_path()), settings),
            Err(simurgh_core::types::SimurghError::Config(_))
        ));

        let settings = Settings {
            max_pair_age: Some(100_000_000_000_000_000),
            ..Default::default()
        };
        assert!(load(Some(path.as_path()), settings).is_err());
    }
}
