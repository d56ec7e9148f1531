use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use porchlight::{App, Config, RequestResponse, Server};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let app = Arc::new(App::new(&config)?);

    let addr = SocketAddr::new(config.address, config.port);
    let mut server = Server::bind(addr)
        .await
        .with_context(|| format!("unable to listen on {addr}"))?;

    println!("Serving {}/ at {addr}.", config.live_path.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting.");
                break;
            }
            pending = server.next_request() => {
                let Some(RequestResponse(request, sender)) = pending else {
                    break;
                };
                let app = app.clone();
                tokio::task::spawn(async move {
                    let response = app.handle(&request).await;
                    // NOTE: Don't care if this fails.
                    let _ = sender.send(response);
                });
            }
        }
    }

    server.shutdown();
    Ok(())
}
