use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use denon_discovery::DiscoveryRegistry;
use denon_state::logging::{init_logging_with_filter, LoggingMode};
use denon_state::{
    launch_all, resolve_plan, AccessoryHost, AccessoryStore, BridgeConfig, ConfigError,
    LaunchContext, ReceiverPhase, ReceiverPlan,
};
use status_client::{ReceiverTransport, StatusClient};
use tokio::sync::watch;

pub mod host;

use host::LoggingHost;

/// Exit status for configuration problems (EX_CONFIG from sysexits.h)
pub const EXIT_CONFIG: i32 = 78;

/// Shortest SSDP search worth sending
const MIN_SEARCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Denon/Marantz receiver bridge
///
/// Loads the receiver configuration, discovers the configured receivers on
/// the local network and keeps one accessory set per receiver in sync with
/// the device until interrupted.
#[derive(Parser, Debug)]
#[command(name = "denon-bridge")]
#[command(about = "Expose Denon and Marantz receivers as smart-home accessories")]
#[command(version)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "DENON_BRIDGE_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Log filter (error, warn, info, debug, trace or a full directive)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Skip the SSDP search and only probe configured receivers directly
    #[arg(long)]
    pub no_ssdp: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mode = std::env::var("DENON_LOG_MODE")
        .ok()
        .and_then(|name| LoggingMode::from_name(&name))
        .unwrap_or(LoggingMode::Development);
    if let Err(e) = init_logging_with_filter(mode, args.log_level.as_deref()) {
        eprintln!("denon-bridge: {}", e);
    }

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Configuration failures get their own status so service managers can tell
/// them apart from runtime failures
fn exit_code(error: &anyhow::Error) -> i32 {
    if error.chain().any(|cause| cause.is::<ConfigError>()) {
        EXIT_CONFIG
    } else {
        1
    }
}

async fn run(args: Args) -> Result<()> {
    let config = BridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    let settings = config.settings().context("Invalid timing settings")?;
    let window = config.discovery_window().context("Invalid discovery window")?;

    let plans = startable_plans(config.receiver_plans())?;
    info!(
        "Starting {} receiver(s) from {}",
        plans.len(),
        args.config.display()
    );

    let registry = Arc::new(DiscoveryRegistry::new(window));
    start_discovery(
        &registry,
        plans.iter().map(|plan| plan.ip.clone()).collect(),
        settings.request_timeout,
        !args.no_ssdp,
    );

    let transport: Arc<dyn ReceiverTransport> = Arc::new(
        StatusClient::with_timeout(settings.request_timeout)
            .context("Failed to create HTTP client")?,
    );
    let host = Arc::new(LoggingHost::new());
    let store = Arc::new(AccessoryStore::new());

    let ctx = LaunchContext {
        transport,
        host: Arc::clone(&host) as Arc<dyn AccessoryHost>,
        registry: Arc::clone(&registry),
        store: Arc::clone(&store),
        settings,
    };
    let handles = launch_all(plans, &ctx);
    registry.mark_host_launched();

    let phases = handles.iter().map(|handle| handle.subscribe()).collect();
    tokio::spawn(remove_stale_accessories(phases, store, Arc::clone(&host)));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down {} receiver(s)", handles.len());
    for handle in &handles {
        handle.shutdown();
    }
    Ok(())
}

/// Drop receivers whose configuration is unusable.
///
/// A bad receiver is logged and skipped; if none is left the first error is
/// returned.
fn startable_plans(plans: Vec<ReceiverPlan>) -> Result<Vec<ReceiverPlan>> {
    if plans.is_empty() {
        warn!("No receivers configured");
        return Ok(plans);
    }

    let mut startable = Vec::with_capacity(plans.len());
    let mut first_error: Option<ConfigError> = None;
    for plan in plans {
        match resolve_plan(&plan) {
            Ok(port) => {
                debug!("Receiver {} uses port {}", plan.ip, port);
                startable.push(plan);
            }
            Err(e) => {
                error!("Receiver {} not started: {}", plan.ip, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match (startable.is_empty(), first_error) {
        (true, Some(e)) => Err(e).context("No configured receiver can be started"),
        _ => Ok(startable),
    }
}

/// Feed the registry from SSDP and from direct probes of configured IPs.
///
/// Both are blocking I/O and run on the blocking pool.
fn start_discovery(
    registry: &Arc<DiscoveryRegistry>,
    ips: Vec<String>,
    probe_timeout: Duration,
    ssdp: bool,
) {
    if ssdp {
        let registry = Arc::clone(registry);
        let timeout = registry.window().max(MIN_SEARCH_TIMEOUT);
        tokio::task::spawn_blocking(move || {
            for event in denon_discovery::get_iter_with_timeout(timeout) {
                registry.record_event(event);
            }
            debug!("SSDP search finished with {} receiver(s) known", registry.len());
        });
    }

    for ip in ips {
        let registry = Arc::clone(registry);
        tokio::task::spawn_blocking(move || {
            match denon_discovery::probe_metadata(&ip, probe_timeout) {
                Ok(metadata) => {
                    registry.record(ip, metadata);
                }
                Err(e) => debug!("Direct metadata probe of {} failed: {}", ip, e),
            }
        });
    }
}

/// Once every receiver has attached its accessories (or given up), remove
/// restored accessories that no configuration entry claimed
async fn remove_stale_accessories(
    phases: Vec<watch::Receiver<ReceiverPhase>>,
    store: Arc<AccessoryStore>,
    host: Arc<LoggingHost>,
) {
    for mut phase in phases {
        let _ = phase
            .wait_for(|current| *current >= ReceiverPhase::Active)
            .await;
    }

    for stale in store.unclaimed() {
        info!("Removing accessory {} ({}) no longer in configuration", stale.id, stale.key);
        host.unregister_accessory(&stale.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn plans(json: &str) -> Vec<ReceiverPlan> {
        BridgeConfig::from_json(json).unwrap().receiver_plans()
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["denon-bridge"]).unwrap();
        assert!(!args.no_ssdp);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn test_args_flags() {
        let args = Args::try_parse_from([
            "denon-bridge",
            "--config",
            "/etc/denon/bridge.json",
            "--log-level",
            "debug",
            "--no-ssdp",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/denon/bridge.json"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.no_ssdp);
    }

    #[rstest]
    #[case(anyhow::Error::new(ConfigError::InvalidPort("x".to_string())), EXIT_CONFIG)]
    #[case(
        anyhow::Error::new(ConfigError::InvalidPort("x".to_string())).context("loading"),
        EXIT_CONFIG
    )]
    #[case(anyhow::anyhow!("signal handler failed"), 1)]
    fn test_exit_code(#[case] error: anyhow::Error, #[case] expected: i32) {
        assert_eq!(exit_code(&error), expected);
    }

    #[test]
    fn test_example_config_starts() {
        let config = BridgeConfig::from_json(include_str!("../config.example.json")).unwrap();
        assert!(config.settings().is_ok());

        let startable = startable_plans(config.receiver_plans()).unwrap();

        assert_eq!(startable.len(), 1);
        assert_eq!(startable[0].entries.len(), 3);
    }

    #[test]
    fn test_bad_receiver_is_skipped() {
        let plans = plans(
            r#"{"receivers": [
                {"kind": "switch", "name": "A", "ip": "192.168.1.20", "port": 80},
                {"kind": "volume", "name": "B", "ip": "192.168.1.20", "port": 8080},
                {"kind": "switch", "name": "C", "ip": "192.168.1.21"}
            ]}"#,
        );

        let startable = startable_plans(plans).unwrap();

        assert_eq!(startable.len(), 1);
        assert_eq!(startable[0].ip, "192.168.1.21");
    }

    #[test]
    fn test_no_startable_receiver_is_a_config_error() {
        let plans = plans(
            r#"{"receivers": [
                {"kind": "switch", "name": "A", "ip": "192.168.1.20", "port": 81}
            ]}"#,
        );

        let error = startable_plans(plans).unwrap_err();

        assert_eq!(exit_code(&error), EXIT_CONFIG);
    }
}
