//! Shares arbitrary source code under a short id, for permalink-style URLs.
//!
//! Grounded on `original_source/store/shared_code.go`: reuses the same
//! generic cache the Go original reuses, with a `ShortId` key and a longer
//! TTL than compile results get.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::Kv;
use crate::error::CoreError;
use crate::shortid::ShortId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedBlob {
    pub code: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

pub struct BlobStore {
    cache: Kv<ShortId, SharedBlob>,
    ttl: Duration,
}

impl BlobStore {
    pub fn open(path: impl AsRef<std::path::Path>, ttl: Duration) -> Result<Self, CoreError> {
        Ok(BlobStore { cache: Kv::open(path)?, ttl })
    }

    pub async fn share(&self, code: Vec<u8>) -> Result<ShortId, CoreError> {
        let id = ShortId::new();
        let blob = SharedBlob { code, created_at: Utc::now() };
        self.cache.set(&id, &blob, Some(self.ttl)).await?;
        Ok(id)
    }

    pub async fn get_share(&self, id: &ShortId) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.cache.get(id).await?.map(|blob| blob.code))
    }

    pub async fn close(self) {
        self.cache.close().await;
    }
}
