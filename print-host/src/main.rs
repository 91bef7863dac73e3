use anyhow::Context;
use print_host::{Config, PrintService, init_logger_with_file, stdio};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env is optional)
    dotenv::dotenv().ok();
    let config = Config::from_env();

    // 2. Logging; the guard flushes the file writer on exit
    let _guard = init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
    tracing::info!(?config, "print-host starting");

    // 3. Serve stdin until EOF
    let service = PrintService::from_config(config);
    let served = stdio::serve(&service, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("print-host failed")?;

    service.shutdown().await;
    tracing::info!(jobs = served, "print-host stopped");
    Ok(())
}
