use clap::Parser;
use mediafetch::cli::{Cli, run};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    mediafetch::init_tracing();

    run(Cli::parse()).await
}
