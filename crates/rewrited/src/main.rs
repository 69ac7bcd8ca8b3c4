// # rewrited - NextDNS Rewrite Reconciler Daemon
//
// This is a THIN integration layer only: all reconciliation logic lives in
// rewrite-core.
//
// The rewrited daemon is responsible for:
// 1. Reading settings from environment variables
// 2. Initializing logging
// 3. Loading the configuration file (the only fatal failure)
// 4. Wiring the IP source and the NextDNS provider into the engine
// 5. Running the engine until SIGINT/SIGTERM
//
// ## Environment
//
// - `CONFIG_PATH`: Path to the JSON configuration file (default `/config.json`)
// - `LOG_LEVEL`: DEBUG, INFO, WARNING, ERROR or CRITICAL, case-insensitive (default INFO)
// - `DEBUG`: `true` to log every failed public IP lookup
//
// ## Example
//
// ```bash
// export CONFIG_PATH=/etc/rewrited/config.json
// export LOG_LEVEL=debug
//
// rewrited
// ```

use anyhow::Result;
use rewrite_core::config::DEFAULT_CONFIG_PATH;
use rewrite_core::{EngineEvent, ReconcileEngine, RewriteConfig};
use rewrite_ip_http::DualStackIpSource;
use rewrite_provider_nextdns::NextDnsFactory;
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Settings read from the environment
#[derive(Debug)]
struct Settings {
    config_path: String,
    log_level: Option<String>,
    debug: bool,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Self {
        Self::from_vars(
            env::var("CONFIG_PATH").ok(),
            env::var("LOG_LEVEL").ok(),
            env::var("DEBUG").ok(),
        )
    }

    fn from_vars(
        config_path: Option<String>,
        log_level: Option<String>,
        debug: Option<String>,
    ) -> Self {
        Self {
            config_path: config_path
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
            log_level,
            debug: parse_debug_flag(debug.as_deref()),
        }
    }
}

/// Map a `LOG_LEVEL` value onto a tracing level
///
/// Returns `None` for values outside the accepted set.
fn parse_log_level(raw: &str) -> Option<Level> {
    match raw.trim().to_uppercase().as_str() {
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARNING" | "WARN" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

fn parse_debug_flag(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn main() -> ExitCode {
    let settings = Settings::from_env();

    // Initialize tracing
    let requested = settings.log_level.as_deref().unwrap_or("INFO");
    let log_level = parse_log_level(requested);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.unwrap_or(Level::INFO))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    if log_level.is_none() {
        warn!("Invalid LOG_LEVEL '{}' provided. Defaulting to INFO", requested);
    }

    info!("Starting NextDNS rewrite reconciler");

    // Load configuration once; it is never reloaded
    let config = match load_config(&settings.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config '{}': {}", settings.config_path, e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    info!(
        "{} NextDNS account(s), {} profile(s) configured",
        config.accounts.len(),
        config.profile_count()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, settings.debug).await {
            error!("Daemon error: {}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Read, parse and validate the configuration file
fn load_config(path: &str) -> Result<RewriteConfig> {
    let config = RewriteConfig::from_file(path)?;
    config.validate()?;
    Ok(config)
}

/// Run the daemon
async fn run_daemon(config: RewriteConfig, debug_lookups: bool) -> Result<()> {
    let ip_source = DualStackIpSource::new(debug_lookups)?;
    let factory = NextDnsFactory::new();

    let (engine, mut events) =
        ReconcileEngine::new(Box::new(ip_source), Box::new(factory), config)?;

    // Drain engine events so the channel never fills up
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    info!("NextDNS rewrite reconciler initialized");

    let mut signal_error = None;
    engine
        .run_until(async {
            match wait_for_shutdown().await {
                Ok(signal) => info!("Received shutdown signal: {}", signal),
                Err(e) => {
                    error!("Shutdown error: {}", e);
                    signal_error = Some(e);
                }
            }
        })
        .await?;

    match signal_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::RewriteCreated { profile_id, name, ip } => {
            info!("Created rewrite '{}' -> {} in profile '{}'", name, ip, profile_id);
        }
        EngineEvent::RewriteReplaced {
            profile_id,
            name,
            previous,
            ip,
        } => {
            info!(
                "Updated rewrite '{}' {} -> {} in profile '{}'",
                name, previous, ip, profile_id
            );
        }
        other => debug!("Engine event: {:?}", other),
    }
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

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    Ok(received)
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
