//! Estimation persistence hand-off
//!
//! The pipeline commits one `EstimationRecord` per finished request. Nothing
//! is written while analysis or validation is still in flight, so a dropped
//! request leaves no trace here.

use crate::error::ValuationError;
use crate::models::Estimation;
use crate::validator::ValidationVerdict;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstimationRecord {
    pub estimation: Estimation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ValidationVerdict>,
    pub user_id: Uuid,
    /// SHA-256 over the estimation and verdict, hex encoded.
    pub digest: String,
    pub committed_at: DateTime<Utc>,
}

impl EstimationRecord {
    pub fn new(estimation: Estimation, verdict: Option<ValidationVerdict>, user_id: Uuid) -> Self {
        let digest = compute_record_digest(&estimation, verdict.as_ref());
        Self {
            estimation,
            verdict,
            user_id,
            digest,
            committed_at: Utc::now(),
        }
    }
}

/// Receives finished records. Implementations must store a record whole or not at all.
#[async_trait::async_trait]
pub trait EstimationSink: Send + Sync {
    async fn commit(&self, record: EstimationRecord) -> Result<()>;
    async fn load(&self, estimation_id: &str) -> Result<Option<EstimationRecord>>;
}

/// In-memory sink for development and tests
pub struct InMemoryEstimationStore {
    records: Arc<RwLock<HashMap<String, EstimationRecord>>>,
}

impl InMemoryEstimationStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, estimation_id: &str) -> Option<EstimationRecord> {
        let records = self.records.read().await;
        records.get(estimation_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Estimation IDs committed for a user, oldest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Vec<String> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .values()
            .filter(|record| record.user_id == user_id)
            .map(|record| (record.estimation.estimation_id.clone(), record.committed_at))
            .collect();

        items.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        items.into_iter().map(|(id, _)| id).collect()
    }

    /// Re-hash a stored record and compare with its digest
    pub async fn verify_integrity(&self, estimation_id: &str) -> bool {
        let records = self.records.read().await;

        match records.get(estimation_id) {
            Some(record) => {
                compute_record_digest(&record.estimation, record.verdict.as_ref()) == record.digest
            }
            None => false,
        }
    }
}

impl Default for InMemoryEstimationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EstimationSink for InMemoryEstimationStore {
    async fn commit(&self, record: EstimationRecord) -> Result<()> {
        let mut records = self.records.write().await;

        let id = record.estimation.estimation_id.clone();
        if records.contains_key(&id) {
            return Err(ValuationError::Store(format!(
                "estimation {} was already committed",
                id
            )));
        }

        records.insert(id, record);
        Ok(())
    }

    async fn load(&self, estimation_id: &str) -> Result<Option<EstimationRecord>> {
        Ok(self.get(estimation_id).await)
    }
}

/// SHA-256 of the record content, streamed straight into the hasher.
pub fn compute_record_digest(estimation: &Estimation, verdict: Option<&ValidationVerdict>) -> String {
    let mut hasher = Sha256::new();

    let mut writer = HashWriter(&mut hasher);
    if serde_json::to_writer(&mut writer, estimation).is_err() {
        return String::new();
    }
    if let Some(verdict) = verdict {
        if serde_json::to_writer(&mut writer, verdict).is_err() {
            return String::new();
        }
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ConfidenceScores, JewelryAnalysis, ObjectType};
    use crate::valuation::ValuationService;

    fn estimation() -> Estimation {
        let analysis = JewelryAnalysis {
            object_type: ObjectType::Ring,
            estimated_weight_grams: 4.2,
            karat: 18,
            condition: Condition::Excellent,
            confidence: ConfidenceScores::default(),
            notes: None,
        };
        ValuationService::new().estimate(&analysis, 1_250_000).unwrap()
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let store = InMemoryEstimationStore::new();
        let est = estimation();
        let id = est.estimation_id.clone();
        let user = Uuid::new_v4();

        store.commit(EstimationRecord::new(est.clone(), None, user)).await.unwrap();

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.estimation, est);
        assert_eq!(record.digest.len(), 64);
        assert!(store.verify_integrity(&id).await);
        assert_eq!(store.list_for_user(user).await, vec![id]);
    }

    #[tokio::test]
    async fn test_double_commit_is_rejected() {
        let store = InMemoryEstimationStore::new();
        let est = estimation();

        store.commit(EstimationRecord::new(est.clone(), None, Uuid::nil())).await.unwrap();
        let second = store.commit(EstimationRecord::new(est, None, Uuid::nil())).await;

        assert!(matches!(second, Err(ValuationError::Store(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_tampered_record_fails_integrity() {
        let store = InMemoryEstimationStore::new();
        let est = estimation();
        let id = est.estimation_id.clone();

        let mut record = EstimationRecord::new(est, None, Uuid::nil());
        record.estimation.price_calculation.net_loan_amount += 1;
        store.commit(record).await.unwrap();

        assert!(!store.verify_integrity(&id).await);
        assert!(!store.verify_integrity("EST-missing").await);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let est = estimation();
        let a = compute_record_digest(&est, None);
        let b = compute_record_digest(&est, None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
