use clap::Parser;

use hearth::config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    hearth::run(args).await
}
