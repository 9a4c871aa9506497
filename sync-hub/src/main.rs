use sync_hub::{Config, Server, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env, work dir, logging)
    dotenv::dotenv().ok();
    let config = Config::from_env();
    setup_environment(&config)?;

    print_banner();
    tracing::info!(
        environment = %config.environment,
        http_port = config.http_port,
        tcp_port = config.message_tcp_port,
        "Café sync hub starting..."
    );

    // 2. Run until Ctrl-C
    if let Err(e) = Server::new(config).run().await {
        tracing::error!("Server error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
