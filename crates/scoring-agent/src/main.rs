use scoring_agent::broker::amqp::AmqpConnector;
use scoring_agent::{AgentConfig, AgentStatus, FixedScorer, Supervisor};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "scoring-agent")]
#[command(about = "Scores task responses and publishes rewards", long_about = None)]
struct Args {
    /// Optional YAML configuration file; environment variables take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = AgentConfig::load(args.config.as_deref())?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    tracing::info!("Starting scoring agent with config: {:?}", config);

    let status = Arc::new(AgentStatus::new(config.agent_id.clone())?);
    let connector = AmqpConnector::from_config(&config);
    let scorer = Arc::new(FixedScorer::new(config.fixed_score));

    let handle = Supervisor::new(config, connector, scorer, status)
        .start()
        .await?;

    // Handle shutdown signals
    let shutdown = handle.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });

    let exit = handle.join().await;
    tracing::info!(exit_code = exit.exit_code(), "Scoring agent stopped: {:?}", exit);

    Ok(ExitCode::from(exit.exit_code()))
}
