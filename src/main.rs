use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use kasir_api as api;

#[derive(Debug, Parser)]
#[command(name = "kasir-api", version, about = "Multi-tenant point-of-sale API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Api,
    /// Apply pending migrations and exit
    Migrate,
    /// Insert the payment-method catalogue and an optional demo owner
    Seed {
        #[arg(long)]
        demo_owner_email: Option<String>,
        #[arg(long, default_value = "demo-password")]
        demo_owner_password: String,
    },
    /// Drop every table and migrate from scratch
    Resetdb {
        /// Required; resetting is destructive
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    match cli.command.unwrap_or(Command::Api) {
        Command::Api => serve(cfg, db_pool).await,
        Command::Migrate => {
            api::db::run_migrations(&db_pool).await?;
            info!("migrations applied");
            Ok(())
        }
        Command::Seed {
            demo_owner_email,
            demo_owner_password,
        } => seed(&cfg, db_pool, demo_owner_email, demo_owner_password).await,
        Command::Resetdb { yes } => {
            if !yes {
                anyhow::bail!("refusing to reset the database without --yes");
            }
            api::db::reset_database(&db_pool).await?;
            warn!("database reset");
            Ok(())
        }
    }
}

async fn build_auth(
    cfg: &api::config::AppConfig,
    db: Arc<api::db::DbPool>,
) -> anyhow::Result<Arc<api::auth::AuthService>> {
    let policy = api::auth::PolicyEnforcer::from_config(cfg.policy_path.as_deref())
        .await
        .context("failed to load access policy")?;
    Ok(Arc::new(api::auth::AuthService::new(
        api::auth::AuthConfig::from_app_config(cfg),
        db,
        Arc::new(policy),
    )))
}

async fn seed(
    cfg: &api::config::AppConfig,
    db_pool: api::db::DbPool,
    demo_owner_email: Option<String>,
    demo_owner_password: String,
) -> anyhow::Result<()> {
    api::db::run_migrations(&db_pool).await?;
    let created = api::services::payments::seed_payment_methods(&db_pool).await?;
    info!(created, "payment methods seeded");

    if let Some(email) = demo_owner_email {
        let auth = build_auth(cfg, Arc::new(db_pool)).await?;
        let request = api::auth::RegisterRequest {
            name: "Demo Owner".to_string(),
            email: email.clone(),
            password: demo_owner_password,
        };
        match auth.register(request).await {
            Ok(_) => info!(%email, "demo owner created"),
            Err(api::auth::AuthError::EmailTaken) => info!(%email, "demo owner already exists"),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn serve(cfg: api::config::AppConfig, db_pool: api::db::DbPool) -> anyhow::Result<()> {
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    api::handlers::health::init_start_time();

    let db_arc = Arc::new(db_pool);
    let auth_service = build_auth(&cfg, db_arc.clone()).await?;

    // Policy reloads arrive over redis pub/sub; the API still serves without it
    let redis_client = Arc::new(redis::Client::open(cfg.redis_url())?);
    api::auth::policy::spawn_reload_subscriber(
        auth_service.policy().clone(),
        redis_client,
        cfg.policy_channel.clone(),
    );

    let gateways = Arc::new(
        api::services::gateway::GatewayRegistry::from_config(&cfg)
            .context("failed to build payment gateways")?,
    );
    let mailer = api::services::notifications::mailer_from_config(&cfg)
        .map_err(|e| anyhow::anyhow!("failed to build mailer: {}", e))?;
    let (email_queue, _email_worker) =
        api::services::notifications::EmailQueue::start(mailer, cfg.email_queue_capacity);

    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        auth_service,
        gateways,
        api::services::payments::PaymentUrls::from_config(&cfg),
        email_queue,
    );

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        services,
    };
    let app = api::build_router(app_state);

    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host {}", cfg.host))?;
    let addr = SocketAddr::new(host, cfg.port);
    info!("kasir-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
