use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use board::openapi::ApiDoc;
use board::repo::Repo;
use board::{config, AppConfig, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; deployments set real env vars.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env()?;
    info!("Bootstrapping board service");

    let repo = build_repo(&cfg).await?;
    let openapi = ApiDoc::openapi();
    let state = AppState { repo };

    let server_cfg = cfg.clone();
    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .max_age(3600);
        if let Some(front) = &server_cfg.frontend_url {
            cors = cors.allowed_origin(front);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::default().with_hsts(server_cfg.enable_hsts))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))
    .with_context(|| format!("binding {}:{}", cfg.bind_addr, cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);
    server.run().await?;
    Ok(())
}

/// One store handle for the life of the process, shared by every worker.
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    {
        if let Some(url) = &cfg.database_url {
            return connect_postgres(url, cfg.db_max_connections).await;
        }
    }
    in_memory_repo(cfg)
}

#[cfg(feature = "postgres-store")]
async fn connect_postgres(url: &str, max_connections: u32) -> anyhow::Result<Arc<dyn Repo>> {
    use board::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("connecting to postgres")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.context("running migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(feature = "inmem-store")]
fn in_memory_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use board::repo::inmem::InMemRepo;

    let repo = match &cfg.data_dir {
        Some(dir) => {
            info!("Using in-memory repository backend with snapshots in {}", dir.display());
            InMemRepo::with_data_dir(dir)
        }
        None => {
            info!("Using in-memory repository backend (volatile)");
            InMemRepo::new()
        }
    };
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "inmem-store"))]
fn in_memory_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("no store configured: set DATABASE_URL or enable the inmem-store feature")
}
