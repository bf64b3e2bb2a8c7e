use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use super::{GatewayError, NewUploadRecord, PersistenceGateway, RemoteId, RemoteRecord};

/// 进程内持久化网关 - 供演示程序与测试使用
#[derive(Debug, Default)]
pub struct MemoryGateway {
    records: Mutex<HashMap<RemoteId, RemoteRecord>>,
    next_id: AtomicU64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置记录，模拟上一次会话留下的数据
    pub fn seed(&self, records: Vec<RemoteRecord>) {
        let mut store = self.records.lock().expect("gateway store poisoned");
        for record in records {
            store.insert(record.id.clone(), record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("gateway store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create(&self, record: NewUploadRecord) -> Result<RemoteRecord, GatewayError> {
        let id = RemoteId::new(format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        let remote = RemoteRecord {
            id: id.clone(),
            name: record.name,
            size_bytes: record.size_bytes,
            mime_type: record.mime_type,
            preview: record.preview,
            status: Some(record.status),
            created_at: Some(Utc::now()),
        };

        self.records
            .lock()
            .expect("gateway store poisoned")
            .insert(id, remote.clone());

        Ok(remote)
    }

    async fn delete(&self, remote_id: &RemoteId) -> Result<(), GatewayError> {
        match self.records.lock().expect("gateway store poisoned").remove(remote_id) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound(remote_id.to_string())),
        }
    }

    async fn get(&self, remote_id: &RemoteId) -> Result<Option<RemoteRecord>, GatewayError> {
        Ok(self.records
            .lock()
            .expect("gateway store poisoned")
            .get(remote_id)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<RemoteRecord>, GatewayError> {
        let mut records: Vec<_> = self.records
            .lock()
            .expect("gateway store poisoned")
            .values()
            .cloned()
            .collect();

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(records)
    }
}
