//! 연결 및 마이그레이션 설정

use crate::codec::LiteralQuoting;
use crate::error::{CdcError, Result};
use crate::offset::ReplicationPosition;
use crate::router::{MigrationTask, SlotRange, TaskRouter};
use crate::statement::{RowBatchMode, UpdateWhereImage};
use mysql_async::{Opts, OptsBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// MySQL 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    /// 복제 클라이언트 server id
    pub server_id: u32,
    /// 초기 연결 handshake 제한 시간 (0이면 무제한)
    pub timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
            server_id: 1,
            timeout_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn build_opts(&self) -> Result<Opts> {
        if self.hostname.is_empty() {
            return Err(CdcError::ConfigError("hostname is empty".to_string()));
        }

        let builder = OptsBuilder::default()
            .ip_or_hostname(self.hostname.clone())
            .tcp_port(self.port)
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .db_name(self.database.clone());

        Ok(Opts::from(builder))
    }
}

/// 시작 위치 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    pub filename: String,
    #[serde(default = "default_binlog_position")]
    pub position: u64,
}

fn default_binlog_position() -> u64 {
    // MySQL binlog은 4 바이트 매직 넘버로 시작
    4
}

/// task 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub schema: String,
    pub table: String,
    pub to: String,
    /// [start, end] 쌍 목록
    pub slots: Vec<(i64, i64)>,
}

/// idle 체크 주기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleCheckConfig {
    pub initial_delay_ms: u64,
    pub period_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for IdleCheckConfig {
    fn default() -> Self {
        IdleCheckConfig {
            initial_delay_ms: 5_000,
            period_ms: 15_000,
            idle_timeout_ms: 60_000,
        }
    }
}

impl IdleCheckConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// 마이그레이션 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub connection: ConnectionConfig,
    pub position: PositionConfig,
    pub tasks: Vec<TaskConfig>,
    /// 데이터 노드 ID → mysql URL
    #[serde(default)]
    pub destinations: HashMap<String, String>,
    #[serde(default)]
    pub ignored_server_ids: HashSet<u32>,
    #[serde(default)]
    pub ignored_tables: Vec<String>,
    #[serde(default = "default_true")]
    pub group_events_by_tx: bool,
    #[serde(default)]
    pub row_batch_mode: RowBatchMode,
    #[serde(default)]
    pub update_where_image: UpdateWhereImage,
    #[serde(default)]
    pub literal_quoting: LiteralQuoting,
    #[serde(default)]
    pub idle_check: IdleCheckConfig,
    /// 디코딩된 이벤트 재생 파일 (바이너리용)
    #[serde(default)]
    pub replay_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl MigrationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MigrationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(CdcError::ConfigError("no migration tasks configured".to_string()));
        }

        for task in &self.tasks {
            for &(start, end) in &task.slots {
                SlotRange::new(start, end)?;
            }
            if !self.destinations.is_empty() && !self.destinations.contains_key(&task.to) {
                return Err(CdcError::ConfigError(format!(
                    "task {}.{} targets unknown destination {}",
                    task.schema, task.table, task.to
                )));
            }
        }

        Ok(())
    }

    pub fn build_tasks(&self) -> Result<Vec<Arc<MigrationTask>>> {
        self.tasks
            .iter()
            .map(|task| {
                let slots = task
                    .slots
                    .iter()
                    .map(|&(start, end)| SlotRange::new(start, end))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(MigrationTask::new(
                    task.schema.clone(),
                    task.table.clone(),
                    task.to.clone(),
                    slots,
                )))
            })
            .collect()
    }

    pub fn build_router(&self) -> Result<TaskRouter> {
        Ok(TaskRouter::new(self.build_tasks()?).with_ignored_tables(&self.ignored_tables))
    }

    pub fn start_position(&self) -> ReplicationPosition {
        ReplicationPosition::new(
            self.position.filename.clone(),
            self.position.position,
            self.connection.server_id,
        )
    }
}
