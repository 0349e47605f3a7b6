//! CLI command handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use tidecast_core::{
    ContentDescriptor, EventBus, EventKind, GatewayResolver, SimulatedGatewayProbe,
    SimulatedPaymentContract, StaticMetadataSource, StreamSession, TidecastConfig,
};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Stream a content id against simulated gateways and wallet
    Demo {
        /// Content id to stream
        #[arg(long, default_value = "content_001")]
        content: String,

        /// Explicitly requested quality variant
        #[arg(long)]
        quality: Option<String>,

        /// Number of leading gateways whose probes fail
        #[arg(long, default_value_t = 2)]
        failing_gateways: usize,

        /// Starting wallet balance in tokens
        #[arg(long, default_value_t = 5)]
        balance: u64,

        /// How long to keep the stream playing, in seconds
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Demo {
            content,
            quality,
            failing_gateways,
            balance,
            seconds,
        } => run_demo(content, quality, failing_gateways, balance, seconds).await,
    }
}

async fn run_demo(
    content: String,
    quality: Option<String>,
    failing_gateways: usize,
    balance: u64,
    seconds: u64,
) -> anyhow::Result<()> {
    let mut config = TidecastConfig::from_env();
    config.gateway.gateways = (1..=4)
        .map(|n| format!("https://gateway-{n}.example/ipfs"))
        .collect();
    // Short intervals so a few-second demo shows ticks and settlements
    config.session.tick_interval = Duration::from_secs(1);
    config.payment.settlement_interval = Duration::from_secs(2);

    let outcomes: Vec<(String, bool)> = config
        .gateway
        .gateways
        .iter()
        .enumerate()
        .map(|(index, gateway)| (gateway.clone(), index >= failing_gateways))
        .collect();
    let outcome_refs: Vec<(&str, bool)> = outcomes
        .iter()
        .map(|(gateway, up)| (gateway.as_str(), *up))
        .collect();
    let probe = Arc::new(SimulatedGatewayProbe::with_outcomes(&outcome_refs));

    let contract = Arc::new(SimulatedPaymentContract::new(balance));

    let metadata = Arc::new(StaticMetadataSource::new());
    metadata.insert(demo_descriptor(&content));

    let events = Arc::new(EventBus::new());
    for kind in EventKind::ALL {
        events.subscribe(kind, |event| {
            println!("event: {event:?}");
        });
    }

    let resolver = Arc::new(GatewayResolver::new(&config.gateway, probe));
    let mut session = StreamSession::new(
        config,
        "demo-viewer",
        resolver,
        contract.clone(),
        metadata,
        Arc::clone(&events),
    );

    session
        .start_stream(&content, quality.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("stream failed to start: {e}"))?;

    info!(
        status = %session.status(),
        gateway = ?session.selected_gateway(),
        fallback = session.is_fallback(),
        "demo stream running for {seconds}s"
    );
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    session.stop_stream();
    info!(
        ticks = session.tick_count(),
        remaining_balance = contract.balance(),
        "demo finished"
    );

    Ok(())
}

fn demo_descriptor(content_id: &str) -> ContentDescriptor {
    let mut sources = HashMap::new();
    for quality in ["low", "medium", "high"] {
        sources.insert(
            quality.to_string(),
            format!("{content_id}-{quality}"),
        );
    }
    ContentDescriptor {
        content_id: content_id.to_string(),
        title: format!("Demo {content_id}"),
        duration_secs: 120,
        sources,
        default_source: Some(content_id.to_string()),
    }
}
