use std::sync::Arc;

use floorgraph_client::api::GraphqlBackend;
use floorgraph_client::channel;
use floorgraph_client::config::{ClientConfig, IntentRoute};
use floorgraph_client::console::{self, ConsoleLine, PrintSurface};
use floorgraph_client::runtime::{Dispatch, Runtime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };
    tracing::info!(url = %config.base_url, ws = %config.ws_url, route = ?config.intent_route, "Starting floor graph console");

    let (sender, events) = match channel::connect(&config.ws_url).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open realtime channel");
            std::process::exit(1);
        }
    };
    let dispatch = match config.intent_route {
        IntentRoute::Http => Dispatch::Http,
        IntentRoute::Channel => Dispatch::Channel(sender),
    };

    let backend = Arc::new(GraphqlBackend::new(&config.base_url));
    let runtime = Runtime::connect(backend, dispatch).await;

    let (actions_tx, actions_rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", console::HELP);
        while let Ok(Some(line)) = lines.next_line().await {
            match console::parse_line(&line) {
                Ok(Some(ConsoleLine::Action(action))) => {
                    if actions_tx.send(action).await.is_err() {
                        break;
                    }
                }
                Ok(Some(ConsoleLine::Help)) => println!("{}", console::HELP),
                Ok(Some(ConsoleLine::Quit)) => break,
                Ok(None) => {}
                Err(e) => println!("> {}", e),
            }
        }
    });

    let mut surface = PrintSurface {
        verbose: std::env::var("FLOORGRAPH_VERBOSE").is_ok(),
    };
    if let Err(e) = runtime.run(events, actions_rx, &mut surface).await {
        tracing::error!(error = %e, "Console stopped");
        std::process::exit(1);
    }
}
