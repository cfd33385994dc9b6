//! The `cluster` subcommand: a local multi-node launcher, ported from the original
//! `pydht.cluster.cluster_context`. Not part of the core storage/quorum correctness
//! surface — it exists to make `quorumdb cluster` a one-command way to try the system.

use crate::config::ClusterArgs;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use url::Url;

const READINESS_BUDGET: Duration = Duration::from_secs(5);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run_cluster(args: ClusterArgs) -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;

    let urls: Vec<Url> = (0..args.num_shards)
        .map(|i| Url::parse(&format!("http://127.0.0.1:{}/", args.port + i as u16)))
        .collect::<Result<_, _>>()?;
    let cluster_urls_arg = urls.iter().map(Url::to_string).collect::<Vec<_>>().join(",");

    let mut children: Vec<Child> = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        let mut command = Command::new(&exe);
        command
            .arg("serve")
            .arg("--port")
            .arg((args.port + i as u16).to_string())
            .arg("--cluster-urls")
            .arg(&cluster_urls_arg);
        if let Some(dir) = &args.directory {
            command.arg("--directory").arg(dir.join(format!("shard-{i}")));
        }
        if args.access_log {
            command.arg("--access-log");
        }
        command.kill_on_drop(true);

        tracing::info!(shard = i, url = %url, "starting shard");
        children.push(command.spawn()?);
    }

    for url in &urls {
        wait_until_ready(url).await?;
    }
    tracing::info!(shards = urls.len(), "cluster ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down cluster");
    for mut child in children {
        let _ = child.kill().await;
    }
    Ok(())
}

async fn wait_until_ready(url: &Url) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let status_url = url.join("v0/status")?;
    let deadline = Instant::now() + READINESS_BUDGET;

    loop {
        if let Ok(response) = client.get(status_url.clone()).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            anyhow::bail!("node at {url} did not become ready within {READINESS_BUDGET:?}");
        }
        tokio::time::sleep(READINESS_POLL_INTERVAL).await;
    }
}
