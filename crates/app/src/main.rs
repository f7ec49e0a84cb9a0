mod dispatch;
mod problem;
mod reply;
mod router;
mod telemetry;
#[cfg(test)]
mod testing;
mod webhook;

use std::{net::SocketAddr, sync::Arc};

use line_relay_line::LineClient;
use line_relay_openai::{OpenAiClient, SamplingParams};
use line_relay_util::{load_env_file, AppConfig};
use tracing::info;

use crate::reply::{OpenAiProvider, ReplyOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let mut http = reqwest::Client::builder();
    if let Some(timeout) = config.http_timeout {
        http = http.timeout(timeout);
    }
    let http = http.build()?;

    let completion = &config.completion;
    let provider = OpenAiProvider::new(
        OpenAiClient::new(
            completion.api_key.clone(),
            completion.base_url.clone(),
            http.clone(),
        ),
        completion.model.clone(),
        completion.api,
        SamplingParams {
            n: completion.candidates,
            ..SamplingParams::default()
        },
    );
    let line = LineClient::new(
        config.line.channel_access_token.clone(),
        config.line.api_base_url.clone(),
        http,
    );
    let orchestrator =
        ReplyOrchestrator::new(Arc::new(provider), Arc::new(line), completion.selection);

    let channel_secret: Arc<[u8]> = Arc::from(config.line.channel_secret.as_bytes());
    let state = router::AppState::new(metrics, channel_secret, orchestrator);

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        model = %completion.model,
        api = completion.api.as_str(),
        selection = completion.selection.as_str(),
        candidates = completion.candidates,
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
