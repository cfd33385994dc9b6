use clap::Parser;
use quorumdb::config::{Args, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match args.command {
            Command::Serve(serve_args) => quorumdb::serve(serve_args).await,
            Command::Cluster(cluster_args) => quorumdb::cluster::run_cluster(cluster_args).await,
        }
    })
}
