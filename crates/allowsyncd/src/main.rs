// # allowsyncd - Authorized Network Sync Daemon
//
// Keeps one entry of a GKE cluster's master authorized networks pointed at
// this host's current public address.
//
// This daemon is a THIN integration layer:
// - DO NOT add merge, retry or scheduling logic here
// - All sync logic lives in allowsync-core
// - Configuration is read once, from flags or environment variables
//
// The allowsyncd daemon is responsible for:
// 1. Parsing and validating configuration
// 2. Initializing logging and the runtime
// 3. Building the prober, provider and state store
// 4. Running the sync engine until SIGTERM / SIGINT
//
// ## Configuration
//
// Every flag has an environment fallback:
//
// ### Target
// - `--project` / `ALLOWSYNC_PROJECT`: GCP project id
// - `--zone` / `ALLOWSYNC_ZONE`: Cluster location (zone or region)
// - `--cluster` / `ALLOWSYNC_CLUSTER`: Cluster id
// - `--network-name` / `ALLOWSYNC_NETWORK_NAME`: Display name of the owned entry
// - `--credentials` / `GOOGLE_APPLICATION_CREDENTIALS`: Service-account key file
//
// ### Address
// - `--ip-source-url` / `ALLOWSYNC_IP_SOURCE_URL`: Plain-text address service
// - `--ip-version` / `ALLOWSYNC_IP_VERSION`: v4, v6 or both
//
// ### State
// - `--state-store` / `ALLOWSYNC_STATE_STORE`: file or memory
// - `--state-path` / `ALLOWSYNC_STATE_PATH`: Defaults to `$HOME/.gke_ip_update/ip.txt`
//
// ### Engine
// - `--interval-secs` / `ALLOWSYNC_INTERVAL_SECS`: 10 to 3600, default 60
// - `--max-consecutive-rejections` / `ALLOWSYNC_MAX_CONSECUTIVE_REJECTIONS`
// - `--dry-run` / `ALLOWSYNC_DRY_RUN`
// - `--log-level` / `ALLOWSYNC_LOG_LEVEL`
//
// ## Example
//
// ```bash
// export ALLOWSYNC_PROJECT=my-project
// export ALLOWSYNC_ZONE=us-central1-c
// export ALLOWSYNC_CLUSTER=main
// export ALLOWSYNC_NETWORK_NAME=home-office
//
// allowsyncd --interval-secs 120
// ```

use allowsync_core::config::{IpSourceConfig, IpVersion, ProviderConfig, StateStoreConfig};
use allowsync_core::{EngineEvent, ResourceRef, SyncConfig, SyncEngine};
use allowsync_ip_http::HttpAddressProber;
use allowsync_provider_gke::GkeAllowListProvider;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// State file location relative to `$HOME`
const DEFAULT_STATE_DIR: &str = ".gke_ip_update";
const DEFAULT_STATE_FILE: &str = "ip.txt";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllowsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<AllowsyncExitCode> for ExitCode {
    fn from(code: AllowsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StateStoreKind {
    /// Plain-text file, survives restarts
    File,
    /// Process memory only
    Memory,
}

/// Keep a GKE cluster's authorized networks in sync with this host's public address
#[derive(Debug, Parser)]
#[command(name = "allowsyncd")]
#[command(version)]
struct Args {
    /// GCP project id
    #[arg(long, env = "ALLOWSYNC_PROJECT")]
    project: String,

    /// Cluster location (zone or region)
    #[arg(long, env = "ALLOWSYNC_ZONE")]
    zone: String,

    /// Cluster id
    #[arg(long, env = "ALLOWSYNC_CLUSTER")]
    cluster: String,

    /// Display name of the authorized network this agent owns
    #[arg(long, env = "ALLOWSYNC_NETWORK_NAME")]
    network_name: String,

    /// Service-account key file (Application Default Credentials if unset)
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Plain-text service reporting this host's public address
    #[arg(
        long,
        env = "ALLOWSYNC_IP_SOURCE_URL",
        default_value = allowsync_core::config::DEFAULT_IP_SOURCE_URL
    )]
    ip_source_url: String,

    /// Address family to accept: v4, v6 or both
    #[arg(long, env = "ALLOWSYNC_IP_VERSION")]
    ip_version: Option<IpVersion>,

    /// Where the last reconciled address is kept
    #[arg(long, env = "ALLOWSYNC_STATE_STORE", value_enum, default_value_t = StateStoreKind::File)]
    state_store: StateStoreKind,

    /// State file (default: $HOME/.gke_ip_update/ip.txt)
    #[arg(long, env = "ALLOWSYNC_STATE_PATH")]
    state_path: Option<PathBuf>,

    /// Seconds between checks
    #[arg(long, env = "ALLOWSYNC_INTERVAL_SECS", default_value_t = 60)]
    interval_secs: u64,

    /// Exit after this many consecutive not-found / permission-denied responses
    #[arg(long, env = "ALLOWSYNC_MAX_CONSECUTIVE_REJECTIONS")]
    max_consecutive_rejections: Option<u32>,

    /// Fetch and log the intended update, never modify the cluster
    #[arg(long, env = "ALLOWSYNC_DRY_RUN")]
    dry_run: bool,

    /// trace, debug, info, warn or error
    #[arg(long, env = "ALLOWSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    /// Validate the configuration
    ///
    /// This performs the checks clap cannot express:
    /// - Required values that are present but blank
    /// - Numeric ranges
    /// - Log level names
    fn validate(&self) -> Result<()> {
        for (flag, value) in [
            ("--project", &self.project),
            ("--zone", &self.zone),
            ("--cluster", &self.cluster),
            ("--network-name", &self.network_name),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", flag);
            }
        }

        for (flag, value) in [
            ("--project", &self.project),
            ("--zone", &self.zone),
            ("--cluster", &self.cluster),
        ] {
            if value.contains('/') {
                anyhow::bail!("{} must be a bare id, not a resource path. Got: {}", flag, value);
            }
        }

        if !self.ip_source_url.starts_with("https://") && !self.ip_source_url.starts_with("http://")
        {
            anyhow::bail!(
                "--ip-source-url must use HTTP or HTTPS scheme. Got: {}",
                self.ip_source_url
            );
        }

        if !(10..=3600).contains(&self.interval_secs) {
            anyhow::bail!(
                "--interval-secs must be between 10 and 3600 seconds. Got: {}",
                self.interval_secs
            );
        }

        if self.max_consecutive_rejections == Some(0) {
            anyhow::bail!("--max-consecutive-rejections must be at least 1 when set");
        }

        if let Some(path) = &self.credentials
            && path.as_os_str().is_empty()
        {
            anyhow::bail!("--credentials cannot be empty when set");
        }

        parse_log_level(&self.log_level)?;

        Ok(())
    }

    /// Build the engine configuration
    ///
    /// `home` is the value of `$HOME`, used for the default state path.
    fn into_sync_config(self, home: Option<OsString>) -> Result<SyncConfig> {
        let state_store = match self.state_store {
            StateStoreKind::Memory => StateStoreConfig::Memory,
            StateStoreKind::File => {
                let path = resolve_state_path(self.state_path, home)?;
                StateStoreConfig::File {
                    path: path.to_string_lossy().into_owned(),
                }
            }
        };

        let mut config = SyncConfig::new(
            self.network_name,
            ResourceRef::new(self.project, self.zone, self.cluster),
        );
        config.ip_source = IpSourceConfig::Http {
            url: self.ip_source_url,
            version: self.ip_version,
        };
        config.provider = ProviderConfig::Gke {
            credentials_path: self.credentials.map(|p| p.to_string_lossy().into_owned()),
            dry_run: self.dry_run,
        };
        config.state_store = state_store;
        config.engine.interval_secs = self.interval_secs;
        config.engine.max_consecutive_rejections = self.max_consecutive_rejections;

        config.validate()?;
        Ok(config)
    }
}

/// Explicit state path, or the default under `home`
fn resolve_state_path(explicit: Option<PathBuf>, home: Option<OsString>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.as_os_str().is_empty() {
            anyhow::bail!("--state-path cannot be empty");
        }
        return Ok(path);
    }

    match home {
        Some(home) if !home.is_empty() => Ok(PathBuf::from(home)
            .join(DEFAULT_STATE_DIR)
            .join(DEFAULT_STATE_FILE)),
        _ => anyhow::bail!(
            "HOME is not set, so the default state path is unknown. \
            Pass --state-path or use --state-store memory"
        ),
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "--log-level '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version land here too
            return if e.use_stderr() {
                AllowsyncExitCode::ConfigError.into()
            } else {
                AllowsyncExitCode::CleanShutdown.into()
            };
        }
    };

    if let Err(e) = args.validate() {
        eprintln!("Configuration validation error: {}", e);
        return AllowsyncExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&args.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AllowsyncExitCode::ConfigError.into();
    }

    let config = match args.into_sync_config(std::env::var_os("HOME")) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return AllowsyncExitCode::ConfigError.into();
        }
    };

    info!("Starting allowsyncd daemon");
    log_startup(&config);

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AllowsyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let (engine, events) = match build_engine(config).await {
            Ok(built) => built,
            Err(e) => {
                error!("Startup error: {}", e);
                eprintln!("Startup error: {}", e);
                return AllowsyncExitCode::ConfigError;
            }
        };

        match run_daemon(engine, events).await {
            Ok(()) => AllowsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {}", e);
                eprintln!("Daemon error: {}", e);
                AllowsyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

fn log_startup(config: &SyncConfig) {
    info!("Cluster: {}", config.resource);
    info!("Owned network name: {}", config.owned_label);
    if let IpSourceConfig::Http { url, version } = &config.ip_source {
        info!("Address source: {} (version: {:?})", url, version);
    }
    match &config.provider {
        ProviderConfig::Gke {
            credentials_path,
            dry_run,
        } => {
            info!(
                "Credentials: {}",
                credentials_path
                    .as_deref()
                    .unwrap_or("Application Default Credentials")
            );
            if *dry_run {
                warn!("Dry-run mode: the cluster will NOT be modified");
            }
        }
    }
    match &config.state_store {
        StateStoreConfig::File { path } => info!("State file: {}", path),
        StateStoreConfig::Memory => {
            warn!("In-memory state store: every restart re-verifies the cluster")
        }
    }
    info!(
        "Interval: {}s, rejection limit: {}",
        config.engine.interval_secs,
        config
            .engine
            .max_consecutive_rejections
            .map(|n| n.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
}

/// Build every component; any failure here is a startup error
async fn build_engine(config: SyncConfig) -> Result<(SyncEngine, mpsc::Receiver<EngineEvent>)> {
    let state_store = allowsync_core::state::from_config(&config.state_store).await?;
    let prober = HttpAddressProber::from_config(&config.ip_source)?;
    let provider = GkeAllowListProvider::from_config(&config.provider).await?;

    let built = SyncEngine::new(Box::new(prober), Box::new(provider), state_store, config)?;
    Ok(built)
}

/// Run the engine until a shutdown signal or a fatal engine error
async fn run_daemon(engine: SyncEngine, mut events: mpsc::Receiver<EngineEvent>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut engine_task = tokio::spawn(async move { engine.run_until(shutdown_rx).await });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    tokio::select! {
        joined = &mut engine_task => {
            // The engine only stops on its own after a fatal error
            return match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(anyhow::anyhow!("Engine task failed: {}", e)),
            };
        }

        signal = wait_for_shutdown() => {
            info!("Received shutdown signal: {}", signal?);
        }
    }

    let _ = shutdown_tx.send(());
    engine_task
        .await
        .map_err(|e| anyhow::anyhow!("Engine task failed: {}", e))??;

    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        parse_with("main", "home", extra)
    }

    /// Parse with the given cluster and network name in place of the defaults
    fn parse_with(cluster: &str, network_name: &str, extra: &[&str]) -> Args {
        let mut argv = vec![
            "allowsyncd",
            "--project",
            "my-project",
            "--zone",
            "us-central1-c",
            "--cluster",
            cluster,
            "--network-name",
            network_name,
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--credentials", "/etc/sa.json"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.interval_secs, 60);
        assert_eq!(args.state_store, StateStoreKind::File);
        assert_eq!(args.ip_source_url, "http://checkip.amazonaws.com/");
        assert!(!args.dry_run);
    }

    #[test]
    fn test_interval_range() {
        assert!(parse(&["--interval-secs", "9"]).validate().is_err());
        assert!(parse(&["--interval-secs", "10"]).validate().is_ok());
        assert!(parse(&["--interval-secs", "3600"]).validate().is_ok());
        assert!(parse(&["--interval-secs", "3601"]).validate().is_err());
    }

    #[test]
    fn test_rejects_blank_and_path_values() {
        assert!(parse_with("main", " ", &[]).validate().is_err());
        assert!(parse_with("main", "", &[]).validate().is_err());
        assert!(
            parse_with("projects/p/locations/z/clusters/c", "home", &[])
                .validate()
                .is_err()
        );
        assert!(parse_with("main", "home", &[]).validate().is_ok());
        assert!(parse(&["--log-level", "verbose"]).validate().is_err());
        assert!(parse(&["--ip-source-url", "checkip.amazonaws.com"]).validate().is_err());
        assert!(
            parse(&["--max-consecutive-rejections", "0"])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_ip_version_flag() {
        let args = parse(&["--ip-version", "v6"]);
        assert_eq!(args.ip_version, Some(IpVersion::V6));
        assert!(
            Args::try_parse_from([
                "allowsyncd", "--project", "p", "--zone", "z", "--cluster", "c",
                "--network-name", "n", "--ip-version", "v5",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_missing_required_flag() {
        let result = Args::try_parse_from(["allowsyncd", "--project", "p"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_path_defaults_under_home() {
        let path = resolve_state_path(None, Some(OsString::from("/home/ops"))).unwrap();
        assert_eq!(path, PathBuf::from("/home/ops/.gke_ip_update/ip.txt"));

        let explicit =
            resolve_state_path(Some(PathBuf::from("/var/lib/allowsync/ip")), None).unwrap();
        assert_eq!(explicit, PathBuf::from("/var/lib/allowsync/ip"));

        assert!(resolve_state_path(None, None).is_err());
        assert!(resolve_state_path(None, Some(OsString::new())).is_err());
    }

    #[test]
    fn test_into_sync_config() {
        let args = parse(&[
            "--state-path",
            "/tmp/allowsync/ip.txt",
            "--interval-secs",
            "120",
            "--max-consecutive-rejections",
            "5",
            "--dry-run",
        ]);
        let config = args.into_sync_config(None).unwrap();

        assert_eq!(config.owned_label, "home");
        assert_eq!(
            config.resource.to_string(),
            "projects/my-project/locations/us-central1-c/clusters/main"
        );
        assert_eq!(config.engine.interval_secs, 120);
        assert_eq!(config.engine.max_consecutive_rejections, Some(5));
        assert!(matches!(
            config.provider,
            ProviderConfig::Gke { dry_run: true, .. }
        ));
        assert!(matches!(
            config.state_store,
            StateStoreConfig::File { ref path } if path == "/tmp/allowsync/ip.txt"
        ));
    }

    #[test]
    fn test_memory_store_needs_no_home() {
        let config = parse(&["--state-store", "memory"])
            .into_sync_config(None)
            .unwrap();
        assert!(matches!(config.state_store, StateStoreConfig::Memory));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AllowsyncExitCode::CleanShutdown as u8, 0);
        assert_eq!(AllowsyncExitCode::ConfigError as u8, 1);
        assert_eq!(AllowsyncExitCode::RuntimeError as u8, 2);
    }
}
