use anyhow::Result;
use clap::Parser;

use chat_gateway::config::{Environment, Settings};
use chat_gateway::server::App;

#[derive(Parser, Debug)]
#[command(
    name = "chat-gateway",
    about = "Messaging gateway with request logging, access window, rate limiting and role checks",
    version
)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address to bind
    #[arg(long)]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Environment to run in
    #[arg(short, long)]
    environment: Option<Environment>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load()?;
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(environment) = args.environment {
        settings.environment = environment;
    }
    settings.validate()?;

    init_tracing(&settings);

    if settings.auth_tokens.is_empty() {
        let token = settings.generate_ephemeral_token();
        println!("{}", "=".repeat(60));
        println!("  No AUTH_TOKENS configured.");
        println!("  Generated ephemeral admin token for this run:");
        println!();
        println!("    {}", token);
        println!();
        println!("  Set AUTH_TOKENS=token:username:role[,..] to configure users.");
        println!("{}", "=".repeat(60));
    }

    tracing::info!(
        app = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        addr = %settings.server_addr(),
        request_log = %settings.request_log.path.display(),
        configured_users = settings.auth_tokens.len(),
        "Starting chat gateway"
    );

    let app = App::new(settings)?;
    app.run().await
}

fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.is_production() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
