use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prospecta::config::Config;
use prospecta::db::{self, AppState, queries};
use prospecta::handlers;
use prospecta::licensing;
use prospecta::models::{CreateLicense, LicenseWithStatus, Plan};
use prospecta::payments::MercadoPagoClient;

#[derive(Parser, Debug)]
#[command(name = "prospecta", version, about = "Prospecta license and payment server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the database schema and exit
    InitDb,
    /// Issue a license without going through HTTP
    CreateLicense {
        /// trial or monthly
        #[arg(long, default_value = "monthly")]
        plan: Plan,
        /// Explicit key; generated when omitted
        #[arg(long)]
        key: Option<String>,
        #[arg(long, env = "ADMIN_API_KEY", hide_env_values = true)]
        admin_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap's env fallbacks see it
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("prospecta=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::InitDb => {
            db::create_pool(&config.database_path)
                .with_context(|| format!("Failed to open database at {}", config.database_path))?;
            tracing::info!("Database ready at {}", config.database_path);
            Ok(())
        }
        Command::CreateLicense {
            plan,
            key,
            admin_key,
        } => {
            licensing::verify_admin_key(&config.admin_api_key, admin_key.as_deref())
                .context("Admin key rejected")?;

            let pool = db::create_pool(&config.database_path)?;
            let conn = pool.get()?;
            let now = queries::now();
            let license = licensing::create_license(
                &conn,
                config.default_billing_days,
                &CreateLicense { plan, key },
                now,
            )?;
            println!(
                "{}",
                serde_json::to_string_pretty(&LicenseWithStatus::at(license, now))?
            );
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database_path)
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;

    let mercadopago = MercadoPagoClient::new(&config.mercadopago)?;
    if !mercadopago.is_configured() {
        tracing::warn!("MP_ACCESS_TOKEN is not set, payment creation is disabled");
    }

    let addr = config.addr();
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        mercadopago,
    };
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Prospecta v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
