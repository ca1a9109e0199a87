//! Host tag storage.
//!
//! The intake endpoint stores the tags of each host; series and check runs
//! of that host later inherit them.

use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tower::BoxError;

use crate::http::RequestContext;
use crate::ingest::labels::Label;

/// Labels stored for one host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntry {
    pub labels: Vec<Label>,
    pub last_reported: SystemTime,
}

#[async_trait]
pub trait HostTagStore: Send + Sync {
    /// Labels of `host`, or `None` if the host never reported.
    async fn get(&self, ctx: &RequestContext, host: &str) -> Result<Option<HostEntry>, BoxError>;

    async fn set(&self, ctx: &RequestContext, host: &str, labels: Vec<Label>) -> Result<(), BoxError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryHostTagStore {
    hosts: DashMap<String, HostEntry>,
}

impl InMemoryHostTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[async_trait]
impl HostTagStore for InMemoryHostTagStore {
    async fn get(&self, _ctx: &RequestContext, host: &str) -> Result<Option<HostEntry>, BoxError> {
        Ok(self.hosts.get(host).map(|entry| entry.value().clone()))
    }

    async fn set(&self, _ctx: &RequestContext, host: &str, labels: Vec<Label>) -> Result<(), BoxError> {
        self.hosts.insert(
            host.to_owned(),
            HostEntry {
                labels,
                last_reported: SystemTime::now(),
            },
        );
        Ok(())
    }
}
