//! doccrew CLI: harvest documentation sources into JSON and query them with
//! an agent crew.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    doccrew_shared::load_dotenv();
    commands::run(cli).await
}
