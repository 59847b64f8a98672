use clap::Parser;
use cohort_search::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON result
    cohort_search::tracing::init(cli.verbose);

    cli.run().await.inspect_err(|e| {
        tracing::error!("cohort-search failed: {:#}", e);
    })
}
