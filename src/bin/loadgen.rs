use std::sync::Arc;

use anyhow::Context;
use argh::FromArgs;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use smpp_loadgen::app::App;
use smpp_loadgen::{config, http, metrics};

#[derive(FromArgs)]
/// SMPP load generation and interoperability test client.
struct CliArgs {
    /// path to the YAML configuration file
    #[argh(option, short = 'c', default = "String::from(\"smpp-app.yaml\")")]
    config: String,

    /// override the configured REST server port
    #[argh(option)]
    server_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: CliArgs = argh::from_env();
    let mut conf = config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    if let Some(port) = args.server_port {
        conf.service.rest.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(conf.service.log.level.clone())),
        )
        .init();

    let app = Arc::new(App::new(&conf.service));
    app.start_sessions().await;

    let reporter_cancel = CancellationToken::new();
    let reporter = metrics::spawn_reporter(app.sink(), reporter_cancel.clone());

    let addr = conf.service.rest.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding REST listener on {addr}"))?;
    info!(%addr, "REST control surface listening");

    axum::serve(listener, http::router(Arc::clone(&app)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving REST API")?;

    info!("shutting down");
    app.stop_traffic().await;
    reporter_cancel.cancel();
    let _ = reporter.await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
