mod cli;
mod config;
mod lastfm;
mod reconcile;
mod report;
mod resolver;
mod rules;
mod store;
mod tags;
mod types;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    cli::main().await
}
