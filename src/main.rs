use std::str::FromStr;
use std::sync::Arc;

use outreach_engine::config::EngineConfig;
use outreach_engine::content::{
    ComposerConfig, EmailComposer, LlmBackend, LlmConfig, StrategyRegistry, create_model,
};
use outreach_engine::engine::Dispatcher;
use outreach_engine::store::{LibSqlStore, Store};
use outreach_engine::transport::SmtpSender;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing: stdout always, daily-rolling file if LOG_DIR set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _guard;
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let file_layer = match std::env::var("LOG_DIR") {
            Ok(dir) => {
                let appender = tracing_appender::rolling::daily(dir, "outreach-engine.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                _guard = Some(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
            }
            Err(_) => {
                _guard = None;
                None
            }
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(file_layer)
            .init();
    }

    // ── Configuration ────────────────────────────────────────────────
    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let model =
        std::env::var("ENGINE_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let cron_expr = std::env::var("SEND_ENGINE_CRON")
        .unwrap_or_else(|_| "0 */2 8-17 * * Mon-Fri".to_string());
    let schedule = cron::Schedule::from_str(&cron_expr).unwrap_or_else(|e| {
        eprintln!("Error: invalid SEND_ENGINE_CRON ({cron_expr}): {e}");
        std::process::exit(1);
    });

    eprintln!("📮 Outreach Engine v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {model}");
    eprintln!("   Tick schedule: {cron_expr}");
    eprintln!("   Mailboxes configured: {}", config.accounts.len());
    if config.accounts.is_empty() {
        eprintln!("   Warning: no MAILBOX_n_* credentials set — every pass will skip");
    }

    // ── Database ─────────────────────────────────────────────────────
    let db_path =
        std::env::var("ENGINE_DB_PATH").unwrap_or_else(|_| "./data/outreach.db".to_string());
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Content generation ───────────────────────────────────────────
    let registry = Arc::new(StrategyRegistry::with_defaults());
    let llm = create_model(&LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    })?;
    let composer = EmailComposer::new(llm, ComposerConfig::default());
    eprintln!("   Strategies: {} registered\n", registry.count());

    // ── Dispatcher ───────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(
        store,
        composer,
        Arc::new(SmtpSender::new()),
        registry,
        config,
    );

    // One tick at a time: awaiting each pass keeps at most one engine
    // invocation in flight, which is what the quota counters assume.
    loop {
        let Some(next) = schedule.upcoming(chrono::Utc).next() else {
            tracing::warn!("Cron schedule has no upcoming ticks, exiting");
            return Ok(());
        };
        let wait = (next - chrono::Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(wait).await;

        let report = dispatcher.run_once().await;
        tracing::info!(
            outcome = report.outcome.label(),
            prospect_id = ?report.prospect_id,
            campaign_id = ?report.campaign_id,
            mailbox = report.mailbox.as_deref(),
            "Tick complete"
        );
    }
}
