//! 마이그레이션 task 정의 및 라우팅
//!
//! 변경 사항이 어떤 task에 속하는지 (schema, table, slot 범위)로 결정합니다.

use crate::error::{CdcError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// slot 범위 (양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: i64,
    pub end: i64,
}

impl SlotRange {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(CdcError::ConfigError(format!(
                "Invalid slot range: {} > {}",
                start, end
            )));
        }
        Ok(SlotRange { start, end })
    }

    pub fn contains(&self, slot: i64) -> bool {
        slot >= self.start && slot <= self.end
    }
}

/// 마이그레이션 task
///
/// 설정에서 만들어지며, 이 크레이트는 마지막 활동 시각과 에러 플래그만 바꿉니다.
#[derive(Debug)]
pub struct MigrationTask {
    pub schema: String,
    pub table: String,
    /// 대상 데이터 노드 ID
    pub to: String,
    pub slots: Vec<SlotRange>,
    last_activity: Mutex<DateTime<Utc>>,
    has_error: AtomicBool,
}

impl MigrationTask {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        to: impl Into<String>,
        slots: Vec<SlotRange>,
    ) -> Self {
        MigrationTask {
            schema: schema.into(),
            table: table.into(),
            to: to.into(),
            slots,
            last_activity: Mutex::new(Utc::now()),
            has_error: AtomicBool::new(false),
        }
    }

    /// slot이 task의 범위 중 하나에 속하는지 확인 (None은 항상 false)
    pub fn in_range(&self, slot: Option<i64>) -> bool {
        match slot {
            Some(slot) => self.slots.iter().any(|range| range.contains(slot)),
            None => false,
        }
    }

    pub fn matches(&self, database: &str, table: &str) -> bool {
        self.schema.eq_ignore_ascii_case(database) && self.table.eq_ignore_ascii_case(table)
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::Acquire)
    }

    /// 에러 플래그 설정 (한번 설정되면 이 크레이트는 해제하지 않음)
    pub fn mark_error(&self) {
        self.has_error.store(true, Ordering::Release);
    }

    /// 외부 운영자가 에러 플래그를 해제할 때 사용
    pub fn clear_error(&self) {
        self.has_error.store(false, Ordering::Release);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }

    pub fn touch(&self, now: DateTime<Utc>) {
        *self.last_activity.lock() = now;
    }

    /// 로그용 이름
    pub fn name(&self) -> String {
        format!("{}.{}->{}", self.schema, self.table, self.to)
    }
}

/// task 라우터
#[derive(Debug, Default)]
pub struct TaskRouter {
    tasks: Vec<Arc<MigrationTask>>,
    /// ASCII 소문자로 정규화된 schema 집합
    schemas: HashSet<String>,
    /// 소문자 "table" 또는 "db.table"
    ignored_tables: HashSet<String>,
}

impl TaskRouter {
    pub fn new(tasks: Vec<Arc<MigrationTask>>) -> Self {
        let schemas = tasks.iter().map(|t| t.schema.to_ascii_lowercase()).collect();
        TaskRouter {
            tasks,
            schemas,
            ignored_tables: HashSet::new(),
        }
    }

    pub fn with_ignored_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored_tables = tables
            .into_iter()
            .map(|t| t.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn tasks(&self) -> &[Arc<MigrationTask>] {
        &self.tasks
    }

    /// 비싼 컬럼 조회/SQL 생성 전에 사용하는 빠른 필터
    pub fn is_relevant(&self, database: &str, table: &str) -> bool {
        if database.is_empty() || table.is_empty() {
            return false;
        }

        let database = database.to_ascii_lowercase();
        if !self.schemas.contains(&database) {
            return false;
        }

        let table = table.to_ascii_lowercase();
        if self.ignored_tables.contains(&table)
            || self.ignored_tables.contains(&format!("{}.{}", database, table))
        {
            return false;
        }

        self.tasks.iter().any(|t| t.table.eq_ignore_ascii_case(&table))
    }

    /// (schema, table)이 일치하는 모든 task
    pub fn matching_tasks<'a>(
        &'a self,
        database: &'a str,
        table: &'a str,
    ) -> impl Iterator<Item = &'a Arc<MigrationTask>> + 'a {
        self.tasks.iter().filter(move |t| t.matches(database, table))
    }

    /// 모든 task의 마지막 활동 시각 갱신
    pub fn touch_all(&self, now: DateTime<Utc>) {
        for task in &self.tasks {
            task.touch(now);
        }
    }
}
