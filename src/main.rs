use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use eximmon::channels::{
    CliTransport, EmailNotifier, SlackTransport, TelegramTransport, TransportManager,
};
use eximmon::config::AppConfig;
use eximmon::engine::{Engine, Notifier};
use eximmon::panel::SuspensionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    let config = AppConfig::load();
    let _log_guard = init_tracing(config.as_ref().ok().and_then(|c| c.log_dir.as_deref()));
    let config = config.context("failed to load configuration")?;

    if !config.has_transport() {
        bail!("no transport configured: set TELEGRAM_BOT_TOKEN, SLACK_BOT_TOKEN or EXIMMON_CLI=1");
    }

    eprintln!("📮 eximmon v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Panel: {} (modern UAPI {})",
        config.panel.host,
        if config.panel.prefer_modern { "first" } else { "disabled" }
    );
    eprintln!(
        "   Limits: {}/min, {}/hour",
        config.runtime.max_per_minute, config.runtime.max_per_hour
    );

    let client = SuspensionClient::new(config.panel.clone())?;

    let mut manager = TransportManager::new();
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(telegram) = config.telegram.clone() {
        eprintln!(
            "   Telegram: enabled ({} admins, alerts {})",
            telegram.admin_ids.len(),
            telegram
                .notify_chat_id
                .map_or_else(|| "off".to_string(), |id| format!("to {id}"))
        );
        let transport = Arc::new(TelegramTransport::new(telegram));
        notifiers.push(transport.clone());
        manager.add(transport);
    }

    if let Some(slack) = config.slack.clone() {
        eprintln!(
            "   Slack: enabled ({} admins, listening on {})",
            slack.admin_ids.len(),
            slack.listen_channels.join(", ")
        );
        let transport = Arc::new(SlackTransport::new(slack));
        notifiers.push(transport.clone());
        manager.add(transport);
    }

    if config.cli {
        eprintln!("   CLI: enabled");
        let transport = Arc::new(CliTransport::new());
        notifiers.push(transport.clone());
        manager.add(transport);
    }

    if let Some(email) = config.email.clone() {
        eprintln!("   Email alerts: {} via {}:{}", email.to, email.smtp_host, email.smtp_port);
        notifiers.push(Arc::new(EmailNotifier::new(email)));
    }

    let engine = Arc::new(Engine::new(config.runtime, Arc::new(client)).with_notifiers(notifiers));
    tracing::info!(
        transports = ?manager.names(),
        notifiers = ?engine.notifier_names(),
        "Starting"
    );

    manager
        .start(Arc::clone(&engine))
        .await
        .context("failed to start transports")?;

    shutdown_signal().await;
    tracing::info!("Shutdown requested");
    manager.shutdown().await;

    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "eximmon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
