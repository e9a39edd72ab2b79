//! 복제 이벤트 → task별 SQL 변환기
//!
//! 세션의 I/O 태스크가 이벤트를 하나씩 순서대로 넘겨줍니다. 변환기는 테이블 ID 캐시,
//! 컬럼 캐시, 트랜잭션 상태를 단독으로 소유합니다.
//!
//! 처리 흐름:
//! 1. TABLE_MAP: 테이블 ID 기록, 대상 테이블이면 컬럼 정보 확보
//! 2. WRITE/UPDATE/DELETE_ROWS: SQL 생성 → slot 범위가 맞는 task로 전달
//! 3. QUERY: BEGIN/COMMIT 추적, 나머지는 (schema, table)이 맞는 task로 그대로 전달
//! 4. XID: 트랜잭션 종료

use crate::codec::ValueCodec;
use crate::config::MigrationConfig;
use crate::dispatch::{DispatchGateway, SqlExecutor};
use crate::error::{CdcError, Result};
use crate::events::*;
use crate::offset::SharedPosition;
use crate::router::TaskRouter;
use crate::schema::{ColumnSchema, SchemaCache, SchemaCatalog};
use crate::statement::{parse_target, RowBatchMode, RowStatement, StatementBuilder, UpdateWhereImage};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 트랜잭션 그룹 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    InTransaction,
}

/// 변환 옵션
#[derive(Debug, Clone)]
pub struct TranslatorOptions {
    /// false면 QUERY 이벤트를 전혀 처리하지 않음
    pub group_events_by_tx: bool,
    pub row_batch_mode: RowBatchMode,
    pub update_where_image: UpdateWhereImage,
    pub ignored_server_ids: HashSet<u32>,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        TranslatorOptions {
            group_events_by_tx: true,
            row_batch_mode: RowBatchMode::default(),
            update_where_image: UpdateWhereImage::default(),
            ignored_server_ids: HashSet::new(),
        }
    }
}

impl TranslatorOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        TranslatorOptions {
            group_events_by_tx: config.group_events_by_tx,
            row_batch_mode: config.row_batch_mode,
            update_where_image: config.update_where_image,
            ignored_server_ids: config.ignored_server_ids.clone(),
        }
    }
}

pub struct EventTranslator<C, E> {
    catalog: C,
    gateway: DispatchGateway<E>,
    router: Arc<TaskRouter>,
    codec: ValueCodec,
    options: TranslatorOptions,
    cache: SchemaCache,
    position: SharedPosition,
    tx_state: TxState,
}

impl<C: SchemaCatalog, E: SqlExecutor> EventTranslator<C, E> {
    pub fn new(
        catalog: C,
        gateway: DispatchGateway<E>,
        router: Arc<TaskRouter>,
        codec: ValueCodec,
        options: TranslatorOptions,
        position: SharedPosition,
    ) -> Self {
        EventTranslator {
            catalog,
            gateway,
            router,
            codec,
            options,
            cache: SchemaCache::new(),
            position,
            tx_state: TxState::Idle,
        }
    }

    pub fn router(&self) -> &Arc<TaskRouter> {
        &self.router
    }

    pub fn position(&self) -> &SharedPosition {
        &self.position
    }

    pub fn tx_state(&self) -> TxState {
        self.tx_state
    }

    /// 컬럼이 바뀐 테이블의 캐시 무효화
    pub fn invalidate_schema(&mut self, database: &str, table: &str) -> bool {
        self.cache.invalidate(database, table)
    }

    /// 새 연결 시작 시 연결 범위 상태 초기화
    pub fn reset_connection(&mut self) {
        self.cache.reset_table_ids();
        self.tx_state = TxState::Idle;
    }

    /// 이벤트 하나 처리. 전달된 문장 수를 반환
    ///
    /// 에러는 이 이벤트만 버리면 되는 것으로, 호출자는 다음 이벤트를 계속 처리합니다.
    pub async fn handle_event(&mut self, event: &BinlogEvent) -> Result<usize> {
        debug!("Event: {:?}", event.header.event_type);

        let ignored = self.options.ignored_server_ids.contains(&event.header.server_id);

        match &event.data {
            BinlogEventData::TableMap(data) => {
                self.on_table_map(data).await?;
                Ok(0)
            }
            BinlogEventData::Rotate(data) => {
                let mut position = self.position.write();
                let previous = position.file_sequence();
                position.rotate(data.next_binlog_name.clone(), data.position);
                match (previous, position.file_sequence()) {
                    (Some(prev), Some(next)) if next < prev => warn!(
                        "Rotated backwards from sequence {} to {}:{}",
                        prev, data.next_binlog_name, data.position
                    ),
                    _ => info!("Rotated to {}:{}", data.next_binlog_name, data.position),
                }
                Ok(0)
            }
            BinlogEventData::WriteRows(_)
            | BinlogEventData::UpdateRows(_)
            | BinlogEventData::DeleteRows(_)
            | BinlogEventData::Query(_)
                if ignored =>
            {
                debug!("Skipping event from ignored server {}", event.header.server_id);
                Ok(0)
            }
            BinlogEventData::WriteRows(data) => self.on_write_rows(data),
            BinlogEventData::UpdateRows(data) => self.on_update_rows(data),
            BinlogEventData::DeleteRows(data) => self.on_delete_rows(data),
            BinlogEventData::Query(data) => Ok(self.on_query(data)),
            BinlogEventData::Xid(_) => {
                if self.options.group_events_by_tx {
                    self.tx_state = TxState::Idle;
                }
                Ok(0)
            }
            BinlogEventData::Other => Ok(0),
        }
    }

    async fn on_table_map(&mut self, data: &TableMapData) -> Result<()> {
        self.cache.record_table(data.clone());
        if self.router.is_relevant(&data.database, &data.table) {
            self.cache
                .resolve(&self.catalog, &data.database, &data.table)
                .await?;
        }
        Ok(())
    }

    /// 행 이벤트의 테이블 조회. 대상이 아니면 None
    fn row_table(&self, table_id: u64) -> Result<Option<(&TableMapData, Arc<ColumnSchema>)>> {
        let table = self.cache.table(table_id).ok_or_else(|| {
            CdcError::TranslationError(format!("Rows event for unmapped table id {}", table_id))
        })?;

        if !self.router.is_relevant(&table.database, &table.table) {
            return Ok(None);
        }

        let schema = self.cache.cached(&table.database, &table.table).ok_or_else(|| {
            CdcError::TranslationError(format!(
                "No column schema for {}.{}",
                table.database, table.table
            ))
        })?;

        Ok(Some((table, schema)))
    }

    fn on_write_rows(&self, data: &WriteRowsData) -> Result<usize> {
        let Some((table, schema)) = self.row_table(data.table_id)? else {
            return Ok(0);
        };
        let builder = StatementBuilder::new(&table.table, &schema, &self.codec);
        let statements: Vec<_> = builder.insert(data)?.into_iter().collect();
        Ok(self.route(table, &statements))
    }

    fn on_update_rows(&self, data: &UpdateRowsData) -> Result<usize> {
        let Some((table, schema)) = self.row_table(data.table_id)? else {
            return Ok(0);
        };
        let builder = StatementBuilder::new(&table.table, &schema, &self.codec);
        let statements = builder.update(
            data,
            self.options.row_batch_mode,
            self.options.update_where_image,
        )?;
        Ok(self.route(table, &statements))
    }

    fn on_delete_rows(&self, data: &DeleteRowsData) -> Result<usize> {
        let Some((table, schema)) = self.row_table(data.table_id)? else {
            return Ok(0);
        };
        let builder = StatementBuilder::new(&table.table, &schema, &self.codec);
        let statements = builder.delete(data, self.options.row_batch_mode)?;
        Ok(self.route(table, &statements))
    }

    /// slot 범위가 맞는 task마다 같은 문장을 전달
    fn route(&self, table: &TableMapData, statements: &[RowStatement]) -> usize {
        let mut dispatched = 0;
        for stmt in statements {
            for task in self.router.matching_tasks(&table.database, &table.table) {
                if task.in_range(stmt.slot) && self.gateway.dispatch(task, &stmt.sql) {
                    dispatched += 1;
                }
            }
            debug!(
                "{} on {}.{} slot={:?}: {}",
                stmt.op.as_str(),
                table.database,
                table.table,
                stmt.slot,
                stmt.sql
            );
        }
        dispatched
    }

    fn on_query(&mut self, data: &QueryEventData) -> usize {
        if !self.options.group_events_by_tx {
            return 0;
        }

        let query = data.query.trim();
        if query.eq_ignore_ascii_case("BEGIN") {
            self.tx_state = TxState::InTransaction;
            return 0;
        }
        // 비트랜잭션 엔진은 XID 대신 COMMIT 쿼리를 남김
        if query.eq_ignore_ascii_case("COMMIT") {
            self.tx_state = TxState::Idle;
            return 0;
        }
        if query.starts_with('#') {
            return 0;
        }

        let Some(target) = parse_target(query) else {
            debug!("No target table in query: {}", query);
            return 0;
        };
        let database = target.schema.as_deref().unwrap_or(&data.database);
        if !self.router.is_relevant(database, &target.table) {
            return 0;
        }

        let mut dispatched = 0;
        for task in self.router.matching_tasks(database, &target.table) {
            if self.gateway.dispatch(task, &data.query) {
                dispatched += 1;
            }
        }
        debug!("{} passthrough to {} tasks: {}", OperationType::Ddl.as_str(), dispatched, query);
        dispatched
    }
}
