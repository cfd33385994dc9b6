//! The quorum engine: turns a client's `(key, ack, from)` request into a fan-out across
//! the replicas rendezvous hashing picks, and resolves the replies into a single answer.

use crate::placement::{rendezvous, Target};
use crate::record::Record;
use crate::replica_client::{ReplicaClient, ReplicaError};
use crate::store::{LocalStorage, StoreError};
use crate::task_watcher::TaskWatcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("bad parameters: {0}")]
    BadParameters(String),

    #[error("key not found")]
    NotFound {
        /// The most recent tombstone timestamp observed, if any replica reported one.
        tombstone_at: Option<DateTime<Utc>>,
    },

    #[error("only {observed} of {required} required replicas responded")]
    NotEnoughReplicas { required: usize, observed: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

/// The capability the HTTP handler depends on: quorum-aware reads and writes, plus
/// whole-node maintenance and shutdown. [`Coordinator`] is the only implementer; tests
/// call its inherent methods directly instead of substituting a fake, since the quorum
/// logic itself is what's under test.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: Vec<u8>, ack: usize, from_: usize, replicated: bool) -> Result<Record, CoordinatorError>;

    async fn upsert(
        &self,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        ack: usize,
        from_: usize,
        timestamp: DateTime<Utc>,
        replicated: bool,
    ) -> Result<(), CoordinatorError>;

    async fn compact(&self) -> Result<(), CoordinatorError>;
    async fn close(&self) -> Result<(), CoordinatorError>;
}

enum GetReply {
    Present(Record),
    Absent,
    Failed,
}

enum WriteReply {
    Success,
    Failed,
}

/// Everything the coordinator needs to reach every node in the cluster, including
/// itself.
pub struct Coordinator {
    local: Arc<dyn LocalStorage>,
    http: Client,
    cluster_urls: Vec<Url>,
    self_url: Option<Url>,
    watcher: Arc<TaskWatcher>,
}

impl Coordinator {
    pub fn new(
        local: Arc<dyn LocalStorage>,
        http: Client,
        cluster_urls: Vec<Url>,
        self_url: Option<Url>,
        watcher: Arc<TaskWatcher>,
    ) -> Self {
        Self {
            local,
            http,
            cluster_urls,
            self_url,
            watcher,
        }
    }

    fn targets_for(&self, key: &[u8], from_: usize, replicated: bool) -> Vec<Target> {
        if replicated {
            return vec![Target::Local];
        }
        rendezvous(key, &self.cluster_urls, self.self_url.as_ref(), from_)
    }

    fn validate_params(&self, available: usize, ack: usize, from_: usize) -> Result<(), CoordinatorError> {
        if from_ < 1 || from_ > available.max(1) {
            return Err(CoordinatorError::BadParameters(format!(
                "from must be between 1 and {}, got {from_}",
                available.max(1)
            )));
        }
        if ack < 1 || ack > from_ {
            return Err(CoordinatorError::BadParameters(format!(
                "ack must be between 1 and from ({from_}), got {ack}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for Coordinator {
    async fn get(
        &self,
        key: Vec<u8>,
        ack: usize,
        from_: usize,
        replicated: bool,
    ) -> Result<Record, CoordinatorError> {
        let targets = self.targets_for(&key, from_, replicated);
        if !replicated {
            self.validate_params(self.cluster_urls.len().max(1), ack, from_)?;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<GetReply>();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(targets.len());
        for target in targets {
            let local = self.local.clone();
            let http = self.http.clone();
            let key = key.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let reply = fetch_one(local, http, target, key).await;
                let _ = tx.send(reply);
            }));
        }
        drop(tx);

        let mut received = Vec::new();
        let mut successes = 0usize;
        while successes < ack {
            match rx.recv().await {
                Some(reply) => {
                    if !matches!(reply, GetReply::Failed) {
                        successes += 1;
                    }
                    received.push(reply);
                }
                None => break,
            }
        }

        for handle in handles {
            self.watcher.watch(handle);
        }

        if successes < ack {
            return Err(CoordinatorError::NotEnoughReplicas {
                required: ack,
                observed: successes,
            });
        }

        resolve_get(received)
    }

    async fn upsert(
        &self,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        ack: usize,
        from_: usize,
        timestamp: DateTime<Utc>,
        replicated: bool,
    ) -> Result<(), CoordinatorError> {
        let targets = self.targets_for(&key, from_, replicated);
        if !replicated {
            self.validate_params(self.cluster_urls.len().max(1), ack, from_)?;
        }

        let record = match &value {
            Some(v) => Record::present(v.clone(), timestamp),
            None => Record::tombstone(timestamp),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<WriteReply>();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(targets.len());
        for target in targets {
            let local = self.local.clone();
            let http = self.http.clone();
            let record = record.clone();
            let key = key.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let reply = write_one(local, http, target, key, record).await;
                let _ = tx.send(reply);
            }));
        }
        drop(tx);

        let mut successes = 0usize;
        while successes < ack {
            match rx.recv().await {
                Some(WriteReply::Success) => successes += 1,
                Some(WriteReply::Failed) => {}
                None => break,
            }
        }

        for handle in handles {
            self.watcher.watch(handle);
        }

        if successes < ack {
            return Err(CoordinatorError::NotEnoughReplicas {
                required: ack,
                observed: successes,
            });
        }
        Ok(())
    }

    async fn compact(&self) -> Result<(), CoordinatorError> {
        self.local
            .compact()
            .await
            .map_err(|err| CoordinatorError::Internal(err.to_string()))
    }

    async fn close(&self) -> Result<(), CoordinatorError> {
        self.local
            .close()
            .await
            .map_err(|err| CoordinatorError::Internal(err.to_string()))
    }
}

async fn fetch_one(
    local: Arc<dyn LocalStorage>,
    http: Client,
    target: Target,
    key: Vec<u8>,
) -> GetReply {
    match target {
        Target::Local => match local.get(key).await {
            Ok(record) => GetReply::Present(record),
            Err(StoreError::NotFound) => GetReply::Absent,
            Err(err) => {
                tracing::warn!(error = %err, "local read failed during fan-out");
                GetReply::Failed
            }
        },
        Target::Remote(url) => {
            let client = ReplicaClient::new(url, http);
            match client.get(&key).await {
                Ok(record) => GetReply::Present(record),
                Err(ReplicaError::NotFound) => GetReply::Absent,
                Err(err) => {
                    tracing::warn!(error = %err, "replica read failed during fan-out");
                    GetReply::Failed
                }
            }
        }
    }
}

async fn write_one(
    local: Arc<dyn LocalStorage>,
    http: Client,
    target: Target,
    key: Vec<u8>,
    record: Record,
) -> WriteReply {
    match target {
        Target::Local => match local.upsert(key, record).await {
            Ok(()) => WriteReply::Success,
            Err(err) => {
                tracing::warn!(error = %err, "local write failed during fan-out");
                WriteReply::Failed
            }
        },
        Target::Remote(url) => {
            let client = ReplicaClient::new(url, http);
            let result = match &record.value {
                Some(value) => client.put(&key, value, record.timestamp).await,
                None => client.delete(&key, record.timestamp).await,
            };
            match result {
                Ok(()) => WriteReply::Success,
                Err(err) => {
                    tracing::warn!(error = %err, "replica write failed during fan-out");
                    WriteReply::Failed
                }
            }
        }
    }
}

/// Merge every reply that came back before the ack threshold was reached: tombstones
/// and present values both count as "found", a tombstone beats absence, and among
/// multiple present/tombstone replies the one with the latest timestamp wins. Ties go
/// to whichever arrived first, since replies are consumed in arrival order.
fn resolve_get(replies: Vec<GetReply>) -> Result<Record, CoordinatorError> {
    let mut winner: Option<Record> = None;
    for reply in replies {
        let candidate = match reply {
            GetReply::Present(record) => record,
            GetReply::Absent | GetReply::Failed => continue,
        };
        winner = Some(match winner {
            None => candidate,
            Some(current) if candidate.timestamp > current.timestamp => candidate,
            Some(current) if candidate.timestamp == current.timestamp
                && !candidate.is_tombstone()
                && current.is_tombstone() =>
            {
                candidate
            }
            Some(current) => current,
        });
    }

    match winner {
        Some(record) if !record.is_tombstone() => Ok(record),
        Some(record) => Err(CoordinatorError::NotFound {
            tombstone_at: Some(record.timestamp),
        }),
        None => Err(CoordinatorError::NotFound { tombstone_at: None }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeStore {
        records: StdMutex<HashMap<Vec<u8>, Record>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                records: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl LocalStorage for FakeStore {
        async fn get(&self, key: Vec<u8>) -> Result<Record, StoreError> {
            self.records
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn upsert(&self, key: Vec<u8>, record: Record) -> Result<(), StoreError> {
            self.records.lock().unwrap().insert(key, record);
            Ok(())
        }

        async fn compact(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn single_node_coordinator() -> Coordinator {
        let watcher = Arc::new(TaskWatcher::spawn());
        Coordinator::new(
            Arc::new(FakeStore::new()),
            Client::new(),
            Vec::new(),
            None,
            watcher,
        )
    }

    #[tokio::test]
    async fn single_node_write_then_read_round_trips() {
        let c = single_node_coordinator();
        c.upsert(b"k".to_vec(), Some(b"v".to_vec()), 1, 1, Utc::now(), false)
            .await
            .unwrap();
        let got = c.get(b"k".to_vec(), 1, 1, false).await.unwrap();
        assert_eq!(got.value, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_on_single_node_is_not_found() {
        let c = single_node_coordinator();
        let err = c.get(b"missing".to_vec(), 1, 1, false).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound { tombstone_at: None }));
    }

    #[tokio::test]
    async fn bad_ack_from_is_rejected() {
        let c = single_node_coordinator();
        let err = c.get(b"k".to_vec(), 2, 1, false).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::BadParameters(_)));
    }

    #[tokio::test]
    async fn zero_from_is_rejected() {
        let c = single_node_coordinator();
        let err = c.get(b"k".to_vec(), 1, 0, false).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::BadParameters(_)));
    }

    #[test]
    fn resolve_prefers_latest_present_over_older_tombstone() {
        let older = Utc::now() - chrono::Duration::seconds(10);
        let newer = Utc::now();
        let replies = vec![
            GetReply::Present(Record::tombstone(older)),
            GetReply::Present(Record::present(b"v".to_vec(), newer)),
        ];
        let resolved = resolve_get(replies).unwrap();
        assert_eq!(resolved.value, Some(b"v".to_vec()));
    }

    #[test]
    fn resolve_prefers_latest_tombstone_over_older_present() {
        let older = Utc::now() - chrono::Duration::seconds(10);
        let newer = Utc::now();
        let replies = vec![
            GetReply::Present(Record::present(b"v".to_vec(), older)),
            GetReply::Present(Record::tombstone(newer)),
        ];
        let err = resolve_get(replies).unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound { tombstone_at: Some(_) }));
    }

    #[test]
    fn resolve_with_only_absent_and_failed_is_not_found() {
        let replies = vec![GetReply::Absent, GetReply::Failed];
        let err = resolve_get(replies).unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound { tombstone_at: None }));
    }
}
