use std::sync::Arc;
use tradejournal::{
    config::Config, db::init_db, AppError, BinanceDataSource, DataSource, JournalPipeline,
    Repository, TimeMs,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(report) => println!("{}", report),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run() -> Result<String, AppError> {
    let config = Config::from_env()?;
    let pool = init_db(&config.database_path).await?;

    let repo = Arc::new(Repository::new(pool));
    let datasource: Arc<dyn DataSource> = Arc::new(BinanceDataSource::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.api_secret.clone(),
    ));
    let report_date = config.report_date;
    let pipeline = JournalPipeline::new(datasource, repo, config);

    let date = match report_date {
        Some(date) => date,
        None => pipeline
            .default_report_date(TimeMs::now())
            .map_err(tradejournal::PipelineError::from)?,
    };
    let report = pipeline.run(date).await?;

    tracing::info!(
        "Reported {} positions for {} ({} anomalies)",
        report.day_positions.len(),
        report.date,
        report.anomalies.len()
    );
    Ok(serde_json::to_string_pretty(&report).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e)))
}
