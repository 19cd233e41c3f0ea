use std::io::Write;
use std::sync::Arc;

use tokio::signal;
use tokio::signal::unix::SignalKind;

use stratus::backend::tuya::TuyaClient;
use stratus::config;
use stratus::error::ApiResult;
use stratus::platform::Platform;

/*
 * Formatter function to output in syslog format. This makes sense when running
 * as a service (where output might go to a log file, or the system journal)
 */
#[allow(clippy::match_same_arms)]
fn syslog_format(
    buf: &mut pretty_env_logger::env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "<{}>{}: {}",
        match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 4,
            log::Level::Info => 6,
            log::Level::Debug => 7,
            log::Level::Trace => 7,
        },
        record.target(),
        record.args()
    )
}

fn init_logging() -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &["debug", "reqwest=info", "hyper=info", "h2=info"];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTERS.join(","));

    /* Detect if we need syslog or human-readable formatting */
    if std::env::var("SYSTEMD_EXEC_PID").is_ok_and(|pid| pid == std::process::id().to_string()) {
        Ok(pretty_env_logger::env_logger::builder()
            .format(syslog_format)
            .parse_filters(&log_filters)
            .try_init()?)
    } else {
        Ok(pretty_env_logger::formatted_timed_builder()
            .parse_filters(&log_filters)
            .try_init()?)
    }
}

async fn run() -> ApiResult<()> {
    init_logging()?;

    let config = config::parse("config.yaml".into())?;
    log::debug!("Configuration loaded successfully");

    let client = Arc::new(TuyaClient::login(config.platform.credentials.clone()).await?);
    let platform = Platform::discover(&config, client).await?;

    if platform.accessories().next().is_none() {
        log::warn!("{}", "-".repeat(80));
        log::warn!("No supported devices found on the account!");
        log::warn!("Stratus will keep polling, but has nothing to bridge.");
        log::warn!("{}", "-".repeat(80));
    }

    let mut sigterm = signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        result = platform.run() => result?,
        _ = signal::ctrl_c() => {
            log::warn!("Ctrl-C pressed, exiting..");
        }
        _ = sigterm.recv() => {
            log::warn!("SIGTERM received, exiting..");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        log::error!("Stratus error: {err}");
        log::error!("Fatal error encountered, cannot continue.");
    }
}
