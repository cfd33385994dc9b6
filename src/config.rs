//! Command-line surface. Every flag has a matching `QUORUMDB_*` environment variable via
//! `clap`'s `env` attribute, which is why there's no separate settings/env-indirection
//! layer the way a framework without built-in env support would need one.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "quorumdb", version, about = "A sharded, replicated key-value store")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single storage node.
    Serve(ServeArgs),
    /// Launch a local cluster of storage nodes by re-spawning this binary with `serve`.
    Cluster(ClusterArgs),
}

#[derive(Debug, ClapArgs)]
pub struct ServeArgs {
    /// Port to bind the HTTP server to.
    #[arg(long, env = "QUORUMDB_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory to persist data under. A fresh temporary directory is used (and removed
    /// on clean shutdown) if omitted.
    #[arg(long, env = "QUORUMDB_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Comma-separated base URLs of every node in the cluster, including this one.
    #[arg(long, env = "QUORUMDB_CLUSTER_URLS", value_delimiter = ',')]
    pub cluster_urls: Vec<Url>,

    /// Log every HTTP request/response via `tower_http`'s tracing layer.
    #[arg(long, env = "QUORUMDB_ACCESS_LOG")]
    pub access_log: bool,
}

#[derive(Debug, ClapArgs)]
pub struct ClusterArgs {
    /// Base port; shard `i` binds to `port + i`.
    #[arg(long, env = "QUORUMDB_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Number of `serve` child processes to launch.
    #[arg(long, env = "QUORUMDB_NUM_SHARDS", default_value_t = 3)]
    pub num_shards: usize,

    /// Directory under which each shard gets its own subdirectory.
    #[arg(long, env = "QUORUMDB_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Forwarded to every spawned `serve` child.
    #[arg(long, env = "QUORUMDB_ACCESS_LOG")]
    pub access_log: bool,
}
