use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = relaycast::load_config()?;
    relaycast::init_tracing(&config.logging);
    info!("[APP] relaycast {} 启动中", relaycast_core::version());

    let mut state = relaycast::GatewayState::bootstrap(config).await?;
    tokio::signal::ctrl_c().await?;
    info!("[APP] 收到退出信号");
    state.shutdown().await;
    Ok(())
}
