use std::{collections::HashMap, sync::Arc};

use clap::Parser;
use config::{ConfigSource, EnvSource, LayeredSource, Setting};
use tokio::net::TcpListener;
use transport::ReqwestTransport;
use workflow::Workflow;

mod args;
mod claims;
mod config;
mod credentials;
mod enrichment;
mod error;
mod properties;
mod transport;
mod workflow;

#[cfg(test)]
mod test_support;

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = args::Args::parse();

    // Values given on the command line win over the environment
    let mut overrides = HashMap::new();
    if let Some(path) = &args.client_id_path {
        let client_id = tokio::fs::read_to_string(path)
            .await
            .expect("failed to read client ID file");
        overrides.insert(
            Setting::ClientId.as_str().to_string(),
            client_id.trim().to_string(),
        );
    }
    if let Some(path) = &args.client_secret_path {
        let client_secret = tokio::fs::read_to_string(path)
            .await
            .expect("failed to read client secret file");
        overrides.insert(
            Setting::ClientSecret.as_str().to_string(),
            client_secret.trim().to_string(),
        );
    }
    if let Some(domain) = &args.domain {
        overrides.insert(Setting::Domain.as_str().to_string(), domain.clone());
    }

    let source = LayeredSource::new(overrides, EnvSource);

    // Settings are re-read for every token, so a missing one here is only a heads-up.
    for setting in Setting::ALL {
        if source.get(setting.as_str()).is_none() {
            tracing::warn!(
                "{} is not set; its claim will be null until it is",
                setting.as_str()
            );
        }
    }

    let transport = ReqwestTransport::new(args.connect_timeout(), args.request_timeout())
        .expect("failed to build http client");
    let workflow = Workflow::new(Arc::new(source), Arc::new(transport));

    let app = enrichment::make_router(AppState {
        workflow: Arc::new(workflow),
    });

    tracing::info!("listening on {}", args.http_listen);
    axum::serve(
        TcpListener::bind(&args.http_listen)
            .await
            .expect("failed to bind to listen port"),
        app.into_make_service(),
    )
    .await
    .expect("failed to serve HTTP");
}
