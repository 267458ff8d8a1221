//! halo-steer command line
//!
//! Resolves a detected boundary into a lidar scan and delivers it over
//! SFTP. Each command runs on the blocking pool under a wall-clock timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use halo_steer::config::Config;
use halo_steer::fetch::fetch_recent_files;
use halo_steer::input::Detection;
use halo_steer::ssh_io::SshConnector;
use halo_steer_core::transport::memory::MemoryConnector;
use halo_steer_core::transport::{Connector, Credentials, DestinationMode, RemoteDelivery, SessionSource};
use halo_steer_core::trigger::resolve_trigger_with;
use halo_steer_core::{
    build_scan_file, run_trigger, send_scan, EncodedScanFile, InstrumentLocation, ScanPlan,
    ScanRequest, TriggerConfig,
};

#[derive(Parser)]
#[command(name = "halo-steer")]
#[command(about = "Steer a Halo Doppler lidar toward a detected boundary")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Upload into an in-memory session and print what would be sent
    #[arg(long, global = true)]
    dry_run: bool,

    /// Abort the command after this many seconds
    #[arg(long, global = true, default_value_t = 120)]
    timeout: u64,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command line values that take precedence over the config file
#[derive(Debug, Clone, Args)]
struct Overrides {
    /// Lidar host name or address
    #[arg(long, global = true)]
    host: Option<String>,

    /// Lidar login name
    #[arg(long, global = true)]
    user: Option<String>,

    /// Maximum instrument-to-region distance that still triggers, meters
    #[arg(long, global = true)]
    max_distance: Option<f64>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.lidar.host = host.clone();
        }
        if let Some(user) = &self.user {
            config.lidar.username = user.clone();
        }
        if let Some(max_distance) = self.max_distance {
            config.trigger.max_distance_m = max_distance;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bearing, distance and trigger decision for a detection
    Resolve {
        /// Detection JSON file
        detection: PathBuf,
    },

    /// Encode a scan file without sending it
    Scan(ScanArgs),

    /// Upload an existing scan file
    Send {
        /// CSM file to upload
        file: PathBuf,

        /// Deliver to the dynamic scan directory
        #[arg(long)]
        dynamic: bool,

        /// Remote file name (default: trigger.file_name)
        #[arg(long)]
        name: Option<String>,
    },

    /// PPI sector toward the detected region, if close enough
    Ppi(TriggerArgs),

    /// RHI toward the detected region, if close enough
    Rhi(TriggerArgs),

    /// Download processed data for the current and previous hour
    Fetch {
        /// Reference time, RFC 3339 or `YYYY-MM-DDTHH:MM[:SS]` (default: now, UTC)
        #[arg(long)]
        time: Option<String>,

        /// Directory to write files into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Elevation angles, degrees
    #[arg(long, value_delimiter = ',', num_args = 1.., required = true, allow_hyphen_values = true)]
    elevations: Vec<f64>,

    /// Azimuth angles, degrees
    #[arg(long, value_delimiter = ',', num_args = 1.., required = true, allow_hyphen_values = true)]
    azimuths: Vec<f64>,

    /// Dynamic CSM (no header)
    #[arg(long)]
    dynamic: bool,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct TriggerArgs {
    /// Detection JSON file
    detection: PathBuf,

    /// Elevation angles, degrees
    #[arg(long, value_delimiter = ',', num_args = 1.., required = true, allow_hyphen_values = true)]
    elevations: Vec<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let mut config = Config::resolve(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    log::debug!("{:?}", config);

    let timeout = Duration::from_secs(cli.timeout);
    let job = tokio::task::spawn_blocking(move || run(&cli, config));
    match tokio::time::timeout(timeout, job).await {
        Ok(joined) => joined.context("Command task failed")?,
        Err(_) => {
            // The blocking call cannot be cancelled; leave it behind
            log::error!("Timed out after {} s", timeout.as_secs());
            std::process::exit(2);
        }
    }
}

fn run(cli: &Cli, mut config: Config) -> Result<()> {
    if cli.dry_run {
        if config.lidar.host.is_empty() {
            config.lidar.host = "dry-run".to_string();
            config.lidar.username = "dry-run".to_string();
        }
        let connector = MemoryConnector::new();
        execute(&cli.command, &config, connector.clone())?;
        for (path, contents) in connector.files() {
            println!("--- {} ({} bytes)", path, contents.len());
            print!("{}", String::from_utf8_lossy(&contents));
        }
        Ok(())
    } else {
        let connector = SshConnector::new(config.lidar.connect_timeout());
        execute(&cli.command, &config, connector)
    }
}

fn execute<C: Connector>(command: &Commands, config: &Config, connector: C) -> Result<()> {
    let delivery = RemoteDelivery::new(connector, config.paths.scans.clone());

    match command {
        Commands::Resolve { detection } => {
            let detection = Detection::load(detection)?;
            let trigger = trigger_config(config, &detection);
            let result = resolve_trigger_with(
                &detection.mask,
                &detection.axes,
                instrument(config)?,
                trigger.area_threshold,
                trigger.connectivity,
                trigger.max_distance_m,
            )?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Scan(args) => {
            let request = ScanRequest::new(args.elevations.clone(), args.azimuths.clone())
                .with_motion(config.scan)
                .with_dynamic_mode(args.dynamic);
            let file = build_scan_file(&request)?;
            match &args.output {
                Some(path) => {
                    std::fs::write(path, file.to_bytes())
                        .with_context(|| format!("Cannot write {}", path.display()))?;
                    log::info!("Wrote {} points to {}", request.point_count(), path.display());
                }
                None => print!("{}", file),
            }
        }

        Commands::Send { file, dynamic, name } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Cannot read scan file {}", file.display()))?;
            let scan = EncodedScanFile::parse(&text)
                .with_context(|| format!("In scan file {}", file.display()))?;
            let mode = DestinationMode::from_dynamic(*dynamic || scan.is_dynamic());
            let name = name.as_deref().unwrap_or(config.trigger.file_name.as_str());
            let credentials = credentials(config)?;
            send_scan(&delivery, &scan, mode, name, SessionSource::Connect(&credentials))?;
        }

        Commands::Ppi(args) => trigger(
            ScanPlan::Ppi {
                elevations: args.elevations.clone(),
            },
            &args.detection,
            config,
            &delivery,
        )?,

        Commands::Rhi(args) => trigger(
            ScanPlan::Rhi {
                elevations: args.elevations.clone(),
            },
            &args.detection,
            config,
            &delivery,
        )?,

        Commands::Fetch { time, output_dir } => {
            let time = match time {
                Some(text) => parse_time(text)?,
                None => Utc::now().naive_utc(),
            };
            let credentials = credentials(config)?;
            let files = fetch_recent_files(
                delivery.connector(),
                SessionSource::Connect(&credentials),
                time,
                &config.paths.data_root,
            )?;
            std::fs::create_dir_all(output_dir)
                .with_context(|| format!("Cannot create {}", output_dir.display()))?;
            for file in files {
                let local = local_path(output_dir, &file.name)?;
                std::fs::write(&local, &file.contents)
                    .with_context(|| format!("Cannot write {}", local.display()))?;
                log::info!("Saved {}", local.display());
            }
        }
    }
    Ok(())
}

fn trigger<C: Connector>(
    plan: ScanPlan,
    detection: &Path,
    config: &Config,
    delivery: &RemoteDelivery<C>,
) -> Result<()> {
    let detection = Detection::load(detection)?;
    let trigger = trigger_config(config, &detection);
    let credentials = credentials(config)?;
    let outcome = run_trigger(
        &detection.mask,
        &detection.axes,
        instrument(config)?,
        &plan,
        &trigger,
        delivery,
        SessionSource::Connect(&credentials),
    )?;
    println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    Ok(())
}

/// Config trigger settings, with the detection's connectivity if it names one
fn trigger_config(config: &Config, detection: &Detection) -> TriggerConfig {
    let mut trigger = config.trigger_config();
    if let Some(connectivity) = detection.connectivity {
        trigger.connectivity = connectivity;
    }
    trigger
}

fn instrument(config: &Config) -> Result<InstrumentLocation> {
    match config.instrument {
        Some(location) => Ok(location),
        None => bail!("No instrument location configured; set instrument.latitude and instrument.longitude"),
    }
}

fn credentials(config: &Config) -> Result<Credentials> {
    if config.lidar.host.is_empty() {
        bail!("No lidar host configured; set lidar.host or pass --host");
    }
    if config.lidar.username.is_empty() {
        bail!("No lidar username configured; set lidar.username or pass --user");
    }
    Ok(config.lidar.credentials())
}

fn parse_time(text: &str) -> Result<NaiveDateTime> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .with_context(|| format!("Cannot parse time '{}'", text))
}

/// Local destination for a remote file name, refusing anything but a plain name
fn local_path(dir: &Path, name: &str) -> Result<PathBuf> {
    match Path::new(name).file_name() {
        Some(file_name) if file_name.to_str() == Some(name) => Ok(dir.join(file_name)),
        _ => bail!("Refusing to save remote file with unsafe name '{}'", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_trigger_args() {
        let cli = Cli::try_parse_from([
            "halo-steer",
            "--dry-run",
            "--max-distance",
            "2500",
            "ppi",
            "detection.json",
            "--elevations",
            "0,5,-2",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.overrides.max_distance, Some(2500.0));
        match cli.command {
            Commands::Ppi(args) => assert_eq!(args.elevations, vec![0.0, 5.0, -2.0]),
            _ => panic!("expected ppi"),
        }
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::try_parse_from([
            "halo-steer",
            "resolve",
            "d.json",
            "--host",
            "10.1.1.1",
            "--user",
            "halo",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.overrides.apply(&mut config);
        assert_eq!(config.lidar.host, "10.1.1.1");
        assert_eq!(config.lidar.username, "halo");
        assert_eq!(config.trigger.max_distance_m, 5000.0);
    }

    #[test]
    fn test_parse_time() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 5)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_time("2024-06-05T09:30:00Z").unwrap(), expected);
        assert_eq!(parse_time("2024-06-05T11:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_time("2024-06-05T09:30").unwrap(), expected);
        assert_eq!(parse_time("2024-06-05 09:30:00").unwrap(), expected);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_local_path() {
        let dir = Path::new("/tmp/out");
        assert_eq!(local_path(dir, "a.hpl").unwrap(), dir.join("a.hpl"));
        assert!(local_path(dir, "../a.hpl").is_err());
        assert!(local_path(dir, "").is_err());
    }

    #[test]
    fn test_credentials_required() {
        let mut config = Config::default();
        assert!(credentials(&config).is_err());
        config.lidar.host = "lidar".to_string();
        config.lidar.username = "halo".to_string();
        assert_eq!(credentials(&config).unwrap().address(), "lidar:22");
    }

    #[test]
    fn test_dry_run_rhi_uploads_scan() {
        let dir = tempfile::tempdir().unwrap();
        let detection = dir.path().join("detection.json");
        std::fs::write(
            &detection,
            r#"{
                "latitudes": [41.72, 41.71, 41.70, 41.69, 41.68],
                "longitudes": [-88.02, -88.01, -88.00, -87.99, -87.98],
                "mask": [[1,1,1,0,0],[1,1,1,0,0],[1,1,1,0,0],[0,0,0,0,0],[0,0,0,0,0]]
            }"#,
        )
        .unwrap();
        let mut config = Config::default();
        config.lidar.host = "lidar".to_string();
        config.lidar.username = "halo".to_string();
        config.instrument = Some(InstrumentLocation::new(41.70, -88.00));
        config.trigger.area_threshold = 5;

        let connector = MemoryConnector::new();
        let command = Commands::Rhi(TriggerArgs {
            detection,
            elevations: vec![0.0, 30.0],
        });
        execute(&command, &config, connector.clone()).unwrap();

        assert_eq!(connector.stats().uploads, 1);
        assert!(connector
            .file("/C:/Lidar/System/Scan parameters/user.txt")
            .is_some());
    }
}
