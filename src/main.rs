use clap::Parser;
use lead_scraper::pipeline::Delivery;
use lead_scraper::{logger, AppConfig, Cli, LeadError, LeadService, RunOutcome};
use tower::Service;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // .env があれば読み込む（${VAR} 置換用）
    let _ = dotenvy::dotenv();
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting lead-scraper");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    match run(&cli).await {
        Ok(outcome) => {
            println!("✅ Saved {} leads to {}", outcome.report.rows(), outcome.report.path().display());
            match outcome.delivery {
                Delivery::Sent { recipients } => {
                    println!("📧 Report emailed to {} recipient(s)", recipients)
                }
                Delivery::Disabled => println!("ℹ️  Email disabled in config, sending skipped"),
                Delivery::NotRequested => {}
            }
        }
        Err(e) => {
            tracing::error!("❌ Pipeline failed at stage {}: {}", e.stage(), e);
            eprintln!("❌ [{}] {}", e.stage(), e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<RunOutcome, LeadError> {
    // 収集前に引数と設定を検証する
    let request = cli.run_request()?;
    let config = cli.apply_overrides(AppConfig::load(&cli.config)?)?;

    let mut service = LeadService::new(config);
    service.call(request).await
}
