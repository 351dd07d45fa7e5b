use clap::Parser;

use vma_writer::cli::Args;
use vma_writer::orchestrator::{self, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config {
        output_path: args.output,
        vmstate_endpoint: args.incoming,
        block_endpoint: args.nbd,
        drives: args.drives.into_iter().map(Into::into).collect(),
    };

    orchestrator::run(config, std::io::stdout()).await
}
