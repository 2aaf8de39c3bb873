//! Admission desk console.
//!
//! Reads a keyboard-wedge QR reader from stdin: every line the reader types
//! is treated as one camera frame. Staff commands start with `/`:
//!
//! - `/manual <ticket id>` redeem a ticket by id
//! - `/stats` print counts for this session
//! - `/history` print the scan history
//! - `/quit` release the reader and exit

use admission_runtime::StoreError;
use admission_scanner::config::Config;
use admission_scanner::decode_source::{ChannelCaptureDevice, Frame, PassThroughDecoder};
use admission_scanner::metrics::register_admission_metrics;
use admission_scanner::{
    HttpRedemptionClient, RedemptionStatus, ScannerSession, SessionSettings,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grace period for a pending redemption or cool-down on exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// How often the status line is refreshed besides action notifications
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq)]
enum DeskCommand {
    Scan(String),
    Manual(String),
    Stats,
    History,
    Quit,
    Unknown(String),
}

impl DeskCommand {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Scan(line.to_string()));
        };

        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        Some(match name {
            "manual" => Self::Manual(rest.to_string()),
            "stats" => Self::Stats,
            "history" => Self::History,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "admission_scanner=info,admission_desk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting admission desk");

    let config = Config::from_env()?;
    info!(
        event = %config.admission.event_name,
        cooldown_ms = config.admission.cooldown_ms,
        redeem_timeout_ms = config.admission.redeem_timeout_ms,
        missing_nonce = ?config.admission.missing_nonce,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "Prometheus metrics available at /metrics");
    }
    register_admission_metrics();

    let service = HttpRedemptionClient::new(
        config.redemption_url()?,
        config.redemption.token.clone(),
        config.connect_timeout(),
    )?;
    info!(endpoint = %service.endpoint(), "Redemption service configured");

    let (reader, frames) = ChannelCaptureDevice::new();
    let session = Arc::new(
        ScannerSession::start(
            Box::new(reader),
            Arc::new(PassThroughDecoder),
            Arc::new(service),
            SessionSettings::from(&config),
        )
        .await?,
    );

    let printer = tokio::spawn(print_status_changes(Arc::clone(&session)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let Some(command) = DeskCommand::parse(&line) else {
            continue;
        };

        match command {
            DeskCommand::Scan(payload) => {
                if frames.send(Frame::from_text(&payload)).is_err() {
                    warn!("Reader is closed, scan ignored");
                }
            },
            DeskCommand::Manual(ticket_id) => session.submit_manual(ticket_id).await?,
            DeskCommand::Stats => {
                let stats = session.stats().await;
                let rate = stats
                    .success_rate()
                    .map_or_else(|| "-".to_string(), |r| format!("{:.0}%", r * 100.0));
                println!(
                    "total {} | admitted {} | denied {} | qr {} | manual {} | success rate {rate}",
                    stats.total, stats.successful, stats.failed, stats.qr, stats.manual
                );
            },
            DeskCommand::History => {
                for record in session.history().await {
                    println!(
                        "#{} {} {:<8} {:<6} {:<7} {}",
                        record.id,
                        record.timestamp.format("%H:%M:%S"),
                        record.ticket_id,
                        record.scan_method.as_str(),
                        record.status.as_str(),
                        record.message
                    );
                }
            },
            DeskCommand::Quit => break,
            DeskCommand::Unknown(name) => {
                println!("unknown command /{name} (try /manual, /stats, /history, /quit)");
            },
        }
    }

    info!("Shutting down admission desk");
    drop(frames);
    if let Err(error) = close_session(session, printer).await {
        warn!(%error, "Session did not shut down cleanly");
    }

    Ok(())
}

/// Stop the status printer, then tear the session down.
///
/// The printer holds a session handle until its task has actually finished,
/// so it is awaited before the session is unwrapped.
async fn close_session(
    session: Arc<ScannerSession>,
    printer: JoinHandle<()>,
) -> Result<(), StoreError> {
    printer.abort();
    match printer.await {
        Ok(()) => {},
        Err(error) if error.is_cancelled() => {},
        Err(error) => warn!(%error, "Status printer failed"),
    }

    match Arc::try_unwrap(session) {
        Ok(session) => session.teardown(SHUTDOWN_TIMEOUT).await,
        Err(_) => {
            warn!("Session still in use, camera released on drop");
            Ok(())
        },
    }
}

/// Print the status line whenever it changes
async fn print_status_changes(session: Arc<ScannerSession>) {
    let mut actions = session.subscribe();
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    let mut last: Option<(RedemptionStatus, String)> = None;

    loop {
        tokio::select! {
            received = actions.recv() => {
                if matches!(received, Err(RecvError::Closed)) {
                    return;
                }
            },
            _ = refresh.tick() => {},
        }

        let view = session.snapshot().await;
        let current = (view.status, view.message);
        if last.as_ref() != Some(&current) {
            println!("[{}] {} | {}", view.event_name, current.0, current.1);
            last = Some(current);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use admission_scanner::redemption::MockRedemptionService;

    #[test]
    fn plain_lines_are_scans() {
        assert_eq!(
            DeskCommand::parse("https://x/scan?ticketId=T1&nonce=abc\n"),
            Some(DeskCommand::Scan("https://x/scan?ticketId=T1&nonce=abc".to_string()))
        );
        assert_eq!(DeskCommand::parse("   "), None);
    }

    #[test]
    fn slash_commands_are_parsed() {
        assert_eq!(
            DeskCommand::parse("/manual T2"),
            Some(DeskCommand::Manual("T2".to_string()))
        );
        assert_eq!(DeskCommand::parse("/manual"), Some(DeskCommand::Manual(String::new())));
        assert_eq!(DeskCommand::parse("/stats"), Some(DeskCommand::Stats));
        assert_eq!(DeskCommand::parse("/history"), Some(DeskCommand::History));
        assert_eq!(DeskCommand::parse("/quit"), Some(DeskCommand::Quit));
        assert_eq!(
            DeskCommand::parse("/open"),
            Some(DeskCommand::Unknown("open".to_string()))
        );
    }

    #[tokio::test]
    async fn shutdown_releases_the_reader_while_printer_runs() {
        let (reader, _frames) = ChannelCaptureDevice::new();
        let tracker = reader.tracker();
        let session = Arc::new(
            ScannerSession::start(
                Box::new(reader),
                Arc::new(PassThroughDecoder),
                MockRedemptionService::new().shared(),
                SessionSettings::default(),
            )
            .await
            .unwrap(),
        );
        let printer = tokio::spawn(print_status_changes(Arc::clone(&session)));
        tokio::time::sleep(Duration::from_millis(20)).await;

        close_session(session, printer).await.unwrap();

        assert_eq!(tracker.releases(), 1);
    }
}
