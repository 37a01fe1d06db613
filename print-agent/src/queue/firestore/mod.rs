//! Firestore job store over the REST API.
//!
//! The subscription polls a `runQuery` filtered to actionable statuses and
//! diffs successive result sets by document `updateTime`. Status writes are
//! `documents:commit` calls with an update mask, so only the fields the agent
//! owns are touched.

mod value;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChangeKind, JobStore, JobUpdate, QueueEvent};
use crate::domain::{Job, JobStatus};
use crate::{Error, Result};

pub const DEFAULT_FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub api_base: String,
    pub project_id: String,
    pub database: String,
    pub collection: String,
    /// OAuth bearer token for the Firestore API.
    pub access_token: String,
    pub poll_interval_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_FIRESTORE_API_BASE.to_string(),
            project_id: String::new(),
            database: "(default)".to_string(),
            collection: "print_jobs".to_string(),
            access_token: String::new(),
            poll_interval_secs: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    update_time: Option<String>,
}

impl FirestoreDocument {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn to_job(&self) -> Result<Job> {
        let fields = value::decode_fields(&self.fields);
        let mut job: Job = serde_json::from_value(Value::Object(fields))?;
        job.id = self.id().to_string();
        Ok(job)
    }
}

struct SeenDocument {
    update_time: Option<String>,
    job: Option<Job>,
}

/// Turns successive query results into change events.
#[derive(Default)]
struct SnapshotDiff {
    seen: HashMap<String, SeenDocument>,
}

impl SnapshotDiff {
    fn apply(&mut self, documents: Vec<FirestoreDocument>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        let mut current = HashMap::with_capacity(documents.len());

        for doc in documents {
            let id = doc.id().to_string();
            let kind = match self.seen.remove(&id) {
                None => Some(ChangeKind::Added),
                Some(prev) if prev.update_time != doc.update_time => Some(ChangeKind::Modified),
                Some(prev) => {
                    current.insert(id, prev);
                    continue;
                }
            };

            let job = match doc.to_job() {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Skipping undecodable job document");
                    None
                }
            };
            if let (Some(kind), Some(job)) = (kind, &job) {
                events.push(QueueEvent {
                    kind,
                    job: job.clone(),
                });
            }
            current.insert(
                id,
                SeenDocument {
                    update_time: doc.update_time,
                    job,
                },
            );
        }

        for (_, gone) in self.seen.drain() {
            if let Some(job) = gone.job {
                events.push(QueueEvent {
                    kind: ChangeKind::Removed,
                    job,
                });
            }
        }

        self.seen = current;
        events
    }
}

/// [`JobStore`] backed by a Firestore collection.
#[derive(Clone)]
pub struct FirestoreJobStore {
    client: reqwest::Client,
    config: Arc<FirestoreConfig>,
}

impl FirestoreJobStore {
    pub fn new(client: reqwest::Client, config: FirestoreConfig) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(Error::config("FIRESTORE_PROJECT_ID is required"));
        }
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn database_path(&self) -> String {
        format!(
            "projects/{}/databases/{}",
            self.config.project_id, self.config.database
        )
    }

    fn documents_url(&self, action: &str) -> String {
        format!(
            "{}/{}/documents{}",
            self.config.api_base.trim_end_matches('/'),
            self.database_path(),
            action
        )
    }

    fn document_name(&self, job_id: &str) -> String {
        format!(
            "{}/documents/{}/{}",
            self.database_path(),
            self.config.collection,
            job_id
        )
    }

    fn actionable_query(&self) -> Value {
        let statuses: Vec<Value> = [JobStatus::Ready, JobStatus::PageCountRequest]
            .iter()
            .map(|s| json!({ "stringValue": s.to_string() }))
            .collect();
        json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.config.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "status" },
                        "op": "IN",
                        "value": { "arrayValue": { "values": statuses } }
                    }
                }
            }
        })
    }

    async fn post(&self, url: String, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::store(format!("Firestore request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::store(format!(
            "Firestore returned {}: {}",
            status,
            body.trim()
        )))
    }

    async fn query_actionable(&self) -> Result<Vec<FirestoreDocument>> {
        let items: Vec<RunQueryItem> = self
            .post(self.documents_url(":runQuery"), &self.actionable_query())
            .await?
            .json()
            .await
            .map_err(|e| Error::store(format!("unreadable runQuery response: {}", e)))?;
        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }

    fn commit_body(&self, job_id: &str, update: &JobUpdate) -> Value {
        let mut fields = Map::new();
        fields.insert(
            "status".to_string(),
            value::encode_value(&json!(update.status().to_string())),
        );
        let mut transforms = Vec::new();

        match update {
            JobUpdate::Printing => {}
            JobUpdate::Completed { .. } => transforms.push(json!({
                "fieldPath": "printedAt",
                "setToServerValue": "REQUEST_TIME"
            })),
            JobUpdate::PageCountCompleted { page_count } => {
                fields.insert("pageCount".to_string(), value::encode_value(&json!(page_count)));
            }
            JobUpdate::Failed { message } => {
                fields.insert("error_message".to_string(), value::encode_value(&json!(message)));
            }
        }

        let mask: Vec<&String> = fields.keys().collect();
        let mut write = json!({
            "update": { "name": self.document_name(job_id), "fields": fields },
            "updateMask": { "fieldPaths": mask },
            "currentDocument": { "exists": true }
        });
        if !transforms.is_empty() {
            write["updateTransforms"] = Value::Array(transforms);
        }
        json!({ "writes": [write] })
    }

    async fn poll(self, tx: mpsc::Sender<QueueEvent>, cancel: CancellationToken) {
        let interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut diff = SnapshotDiff::default();
        let mut failing = false;

        info!(
            collection = %self.config.collection,
            interval_secs = interval.as_secs(),
            "Listening for print jobs"
        );

        loop {
            match self.query_actionable().await {
                Ok(documents) => {
                    if failing {
                        info!("Firestore polling recovered");
                        failing = false;
                    }
                    for event in diff.apply(documents) {
                        debug!(job_id = %event.job.id, kind = %event.kind, "Queue change");
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    // Log the first failure of a streak only.
                    if !failing {
                        warn!(error = %e, "Firestore polling failed");
                        failing = true;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("Firestore subscription stopped");
    }
}

#[async_trait]
impl JobStore for FirestoreJobStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn subscribe(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<QueueEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(self.clone().poll(tx, cancel));
        Ok(rx)
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<()> {
        let body = self.commit_body(job_id, &update);
        self.post(self.documents_url(":commit"), &body).await?;
        debug!(job_id, status = %update.status(), "Wrote job status");
        Ok(())
    }
}
