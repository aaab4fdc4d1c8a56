use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cctray::app::App;
use cctray::config::{CliCommand, Config, Settings};
use cctray::usage::UsageFetcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    // One-shot diagnostics
    if matches!(cli.subcommand, Some(CliCommand::Check)) {
        return check(&settings).await;
    }

    // Run the application
    let mut app = App::new(settings);
    app.run().await
}

/// Single fetch, printed as JSON
async fn check(settings: &Settings) -> Result<()> {
    let fetcher = UsageFetcher::new(settings);
    let snapshot = fetcher.fetch().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("cctray=debug")
    } else {
        EnvFilter::new("cctray=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
