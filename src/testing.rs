//! 테스트용 collaborator 구현

use crate::dispatch::{JobListener, SqlExecutor, SqlJob};
use crate::error::{CdcError, Result};
use crate::events::BinlogEvent;
use crate::offset::ReplicationPosition;
use crate::schema::{CatalogColumn, SchemaCatalog};
use crate::session::{BinlogSource, EventStream};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// 고정된 컬럼 정보를 돌려주는 카탈로그. 없는 테이블은 조회 실패
#[derive(Default)]
pub struct StaticCatalog {
    tables: HashMap<(String, String), Vec<CatalogColumn>>,
    calls: AtomicUsize,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, database: &str, table: &str, columns: &[(&str, &str)]) -> Self {
        let rows = columns
            .iter()
            .enumerate()
            .map(|(i, (name, data_type))| CatalogColumn {
                column_name: name.to_string(),
                ordinal_position: i as u32 + 1,
                data_type: data_type.to_string(),
                character_set_name: None,
            })
            .collect();
        self.tables
            .insert((database.to_string(), table.to_string()), rows);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchemaCatalog for StaticCatalog {
    async fn load_columns(&self, database: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tables
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| CdcError::QueryError(format!("Table '{}.{}' doesn't exist", database, table)))
    }
}

/// 제출된 작업을 기록만 하고, 완료는 테스트가 직접 알리는 executor
#[derive(Default)]
pub struct RecordingExecutor {
    submitted: Mutex<Vec<(String, String)>>,
    pending: Mutex<VecDeque<JobListener>>,
}

impl RecordingExecutor {
    /// (대상 노드, SQL) 제출 순서대로
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().clone()
    }

    /// 가장 오래된 미완료 작업 완료 처리
    pub fn complete_next(&self, result: Result<()>) {
        let listener = self.pending.lock().pop_front();
        if let Some(listener) = listener {
            listener.on_complete(result);
        }
    }
}

impl SqlExecutor for RecordingExecutor {
    fn submit(&self, job: SqlJob) {
        self.submitted.lock().push((job.destination, job.sql));
        self.pending.lock().push_back(job.listener);
    }
}

/// 테스트가 이벤트를 직접 흘려보내는 binlog source
#[derive(Default)]
pub struct ChannelSource {
    sender: Mutex<Option<mpsc::UnboundedSender<BinlogEvent>>>,
    positions: Mutex<Vec<ReplicationPosition>>,
    disconnects: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

impl ChannelSource {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn sender(&self) -> Option<mpsc::UnboundedSender<BinlogEvent>> {
        self.sender.lock().clone()
    }

    /// 서버 쪽에서 스트림이 끊긴 상황
    pub fn close_stream(&self) {
        self.sender.lock().take();
    }

    pub fn positions(&self) -> Vec<ReplicationPosition> {
        self.positions.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.positions.lock().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl BinlogSource for ChannelSource {
    async fn connect(&self, position: &ReplicationPosition) -> Result<EventStream> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(CdcError::ConnectionError("Connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock() = Some(tx);
        self.positions.lock().push(position.clone());
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.sender.lock().take();
        Ok(())
    }
}

/// 조건이 참이 될 때까지 최대 1초 대기
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
