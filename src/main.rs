use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yamdb_api::{
    AppState,
    bootstrap::ensure_superuser,
    config::{AppConfig, Env},
    create_router,
    credentials::{CredentialState, JwtCredentialIssuer},
    mail::{MailerState, MemoryMailer, SmtpMailer},
    repository::{InMemoryRepository, PostgresRepository, RepositoryState},
};

/// main
///
/// Initializes configuration, logging, persistence, mail and credentials, then
/// serves HTTP until the process is stopped.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise a verbose default for this crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yamdb_api=debug,tower_http=info,axum=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Persistence: Postgres when configured, in-memory otherwise (local only).
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            let postgres = PostgresRepository::new(pool);
            postgres
                .migrate()
                .await
                .expect("FATAL: Failed to apply database migrations.");
            tracing::info!("Connected to Postgres; migrations applied.");
            Arc::new(postgres)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store. Data is lost on exit.");
            Arc::new(InMemoryRepository::new())
        }
    };

    // 5. Mail: SMTP when configured, otherwise messages go to the log.
    let mailer: MailerState = match &config.smtp {
        Some(smtp) => Arc::new(
            SmtpMailer::new(smtp, &config.mail_from)
                .expect("FATAL: Invalid SMTP configuration."),
        ),
        None => {
            tracing::warn!("SMTP not configured; confirmation codes are written to the log.");
            Arc::new(MemoryMailer::new())
        }
    };

    let credentials: CredentialState = Arc::new(JwtCredentialIssuer::from_config(&config));

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let bootstrap_admin = config.bootstrap_admin.clone();
    let app_state = AppState {
        repo,
        credentials,
        mailer,
        config,
    };

    if let Some(admin) = bootstrap_admin {
        if let Err(e) = ensure_superuser(&app_state, &admin).await {
            tracing::error!("Failed to bootstrap superuser {}: {}", admin.username, e);
        }
    }

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app).await.expect("FATAL: HTTP server error.");
}
