use shortcode_service::{
    audit_log::{Level, Package},
    config::{self, audit_log_capsule},
    server,
};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let container = config::init_container();
    let app = server::router(container.clone());

    let listener = TcpListener::bind(container.read(config::addr_capsule)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "Started listening on TCP");
    container.read(audit_log_capsule).log(
        Level::Info,
        Package::Server,
        format!("Microservice started and listening on {addr}"),
    );

    axum::serve(listener, app).await?;
    Ok(())
}
