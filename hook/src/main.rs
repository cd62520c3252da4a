use clap::Parser;
use sendgrid_hook::{config::HookConfig, server};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Receives SendGrid event webhooks and forwards them to SQS")]
struct Args {
    /// Optional YAML config file. Environment variables override its values.
    #[arg(long, env = "SENDGRID_HOOK_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = HookConfig::load(args.config.as_deref()).await?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        config = args.config.as_deref().unwrap_or("<env>"),
        queue_url = cfg.queue_url.as_deref().unwrap_or_default(),
        "starting"
    );

    server::run(cfg).await
}
