use chathub::{
    init_logging, log_shutdown_info, log_startup_info, serve, GatewayState, Hub, HubConfig,
    LoggingConfig, ServerConfig, SharedSecretValidator,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LoggingConfig::from_env())?;
    log_startup_info("chathub", env!("CARGO_PKG_VERSION"));

    let hub_config = HubConfig::from_env()?;
    hub_config.validate()?;

    let server_config = ServerConfig::from_env()?;
    server_config.validate()?;

    let validator = Arc::new(SharedSecretValidator::from_env()?);

    let hub = Hub::spawn(hub_config);
    let state = GatewayState::new(hub, validator);

    serve(&server_config, state).await?;

    log_shutdown_info("chathub");
    Ok(())
}
