mod constants;
mod error;
mod handlers;
mod services;
mod setup;
mod state;
mod telemetry;

use geoview_core::AppConfig;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = AppConfig::from_env()?;

    telemetry::init_telemetry();

    // Initialize the application (database, repositories, routes)
    let (_state, router) = setup::initialize_app(config.clone()).await?;

    // Start the server
    setup::server::start_server(&config, router).await?;

    Ok(())
}
