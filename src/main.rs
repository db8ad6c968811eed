use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::info;

use leaf_doctor::{create_app, fetch::ensure_model, logger::init_logger, AppState, Config, TfModel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let config = Config::from_env()?;

    ensure_model(
        &config.model_path,
        config.model_url.as_deref(),
        config.github_token.as_deref(),
    )
    .await?;

    let model = TfModel::load(&config.model_path, &config.input_op, &config.output_op)
        .with_context(|| format!("failed to load model from {}", config.model_path.display()))?;
    let state = AppState::new(Arc::new(model));

    let app = create_app(state, &config);

    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr()))?;

    info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
