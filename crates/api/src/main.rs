use std::sync::Arc;

use anyhow::Context;

use userhub_api::app::{build_app, build_services};
use userhub_api::config::AppConfig;
use userhub_auth::CredentialVerifier;
use userhub_infra::seed_superadmin;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("load configuration")?;
    userhub_observability::init(config.log_format);

    if config.insecure_secret {
        tracing::warn!("JWT_SECRET not set; using insecure dev secret");
    }

    #[cfg(feature = "postgres")]
    let store = {
        let store = userhub_infra::PostgresIdentityStore::connect(&config.database_url)
            .await
            .context("connect to database")?;
        store.migrate().await.context("create tables")?;
        Arc::new(store)
    };
    #[cfg(not(feature = "postgres"))]
    let store = {
        tracing::warn!("using in-memory identity store; data is lost on restart");
        Arc::new(userhub_infra::InMemoryIdentityStore::new())
    };

    let verifier = CredentialVerifier::with_cost(config.bcrypt_cost);
    seed_superadmin(store.as_ref(), &config.admin_password, verifier)
        .await
        .context("seed superadmin")?;

    let services = build_services(&config, store).await?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
