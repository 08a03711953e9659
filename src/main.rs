use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::{error, info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use karma::auth::TokenIssuer;
use karma::config::AppConfig;
use karma::google::HttpGoogleVerifier;
use karma::image_host::build_image_host;
use karma::mailer::build_mailer;
use karma::openapi::ApiDoc;
use karma::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use karma::repo::Repo;
use karma::{config, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration error: {e}");
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    info!("Bootstrapping karma server");
    info!(
        google = cfg.google_client_id.is_some(),
        smtp = cfg.smtp.is_some(),
        image_host = cfg.image_host.is_some(),
        front_end = %cfg.front_end_origin,
        "integrations"
    );

    let repo = build_repo(&cfg).await?;
    let mailer = build_mailer(cfg.smtp.as_ref()).context("building mailer")?;
    let image_host = build_image_host(cfg.image_host.as_ref()).context("building image host client")?;
    let google = Arc::new(HttpGoogleVerifier::new(cfg.google_client_id.clone()).context("building google client")?);

    let state = AppState {
        repo,
        image_host,
        google,
        mailer: mailer.clone(),
        tokens: TokenIssuer::new(
            cfg.jwt_secret.clone(),
            cfg.jwt_refresh_secret.clone(),
            cfg.jwt_ttl,
            cfg.jwt_refresh_ttl,
        ),
        limits: RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env()),
        bcrypt_cost: cfg.bcrypt_cost,
    };

    let openapi = ApiDoc::openapi();
    let front_end = cfg.front_end_origin.clone();
    let enable_hsts = cfg.enable_hsts;

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&front_end)
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allowed_header(header::HeaderName::from_static("x-google-token"))
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(enable_hsts).with_docs("/docs"))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())
    .with_context(|| format!("binding {}", cfg.bind_addr))?;

    info!("Listening on http://{}", cfg.bind_addr);
    let result = server.run().await;

    mailer.shutdown().await;
    info!("server stopped");
    result.context("server error")
}

async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    if let Some(url) = cfg.database_url.as_deref() {
        use sqlx::postgres::PgPoolOptions;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.db_max_connections)
            .connect_lazy(url)
            .context("creating Postgres pool")?;
        if cfg.run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await.context("running migrations")?;
            info!("migrations applied");
        }
        info!("Using Postgres repository backend");
        return Ok(Arc::new(karma::repo::pg::PgRepo::new(pool)));
    }
    in_memory_repo()
}

#[cfg(feature = "inmem-store")]
fn in_memory_repo() -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(karma::repo::inmem::InMemRepo::new()))
}

#[cfg(not(feature = "inmem-store"))]
fn in_memory_repo() -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("DATABASE_URL is required when the in-memory store is disabled")
}
