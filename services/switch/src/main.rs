use sea_orm::Database;
use tracing::{error, info};

use blackout_core::tracing::init_tracing;
use blackout_switch::config::SwitchConfig;
use blackout_switch::infra::mail::SmtpDispatcher;
use blackout_switch::router::build_router;
use blackout_switch::state::AppState;
use blackout_switch::usecase::dispatch::DispatchPolicy;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %format!("{e:#}"), "switch service failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    use anyhow::Context as _;

    // Configuration is validated before anything is connected or bound.
    let config = SwitchConfig::from_env().context("load configuration")?;

    let mailer = SmtpDispatcher::new(&config.mail).context("configure SMTP")?;

    let db = Database::connect(&config.database_url)
        .await
        .context("connect to database")?;

    let redis = deadpool_redis::Config::from_url(&config.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .context("create Redis pool")?;

    let state = AppState {
        db,
        redis,
        mailer,
        admin_email: config.block_admin_email,
        code_ttl: config.code_ttl,
        dispatch_policy: DispatchPolicy {
            timeout: config.dispatch_timeout,
            max_attempts: config.dispatch_max_attempts,
        },
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.switch_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!("switch service listening on {addr}");
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
