//! 테이블 컬럼 메타데이터 캐시
//!
//! TABLE_MAP 이벤트로 들어온 테이블 ID와 (database, table)별 컬럼 정보를 관리합니다.
//! 컬럼 정보는 캐시에 없을 때만 카탈로그에서 읽어옵니다. DDL 이후 서버가 새 테이블 ID를
//! 배정해도 같은 (database, table) 키가 캐시에 있으면 다시 읽지 않으므로,
//! 컬럼이 바뀐 경우에는 `invalidate`를 호출해야 합니다.

use crate::config::ConnectionConfig;
use crate::error::{CdcError, Result};
use crate::events::TableMapData;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME, ORDINAL_POSITION, DATA_TYPE, CHARACTER_SET_NAME \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_NAME = ? AND TABLE_SCHEMA = ?";

/// 카탈로그 조회 결과 한 행
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub column_name: String,
    pub ordinal_position: u32,
    pub data_type: String,
    pub character_set_name: Option<String>,
}

/// 컬럼 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub charset: Option<String>,
}

/// (database, table)의 1부터 시작하는 컬럼 위치 → 컬럼 정보
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: BTreeMap<u32, ColumnDef>,
}

impl ColumnSchema {
    pub fn from_catalog(rows: Vec<CatalogColumn>) -> Self {
        let columns = rows
            .into_iter()
            .map(|row| {
                (
                    row.ordinal_position,
                    ColumnDef {
                        name: row.column_name,
                        data_type: row.data_type,
                        charset: row.character_set_name,
                    },
                )
            })
            .collect();
        ColumnSchema { columns }
    }

    pub fn get(&self, position: u32) -> Option<&ColumnDef> {
        self.columns.get(&position)
    }

    /// 비트맵 위치(0부터)로 컬럼 조회
    pub fn column_at_bit(&self, bit: usize) -> Result<&ColumnDef> {
        u32::try_from(bit + 1)
            .ok()
            .and_then(|pos| self.get(pos))
            .ok_or_else(|| {
                CdcError::TranslationError(format!("No column at ordinal position {}", bit + 1))
            })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// 스키마 카탈로그 조회 collaborator
pub trait SchemaCatalog: Send + Sync {
    fn load_columns(
        &self,
        database: &str,
        table: &str,
    ) -> impl Future<Output = Result<Vec<CatalogColumn>>> + Send;
}

/// INFORMATION_SCHEMA 기반 카탈로그
///
/// 캐시 미스마다 연결을 하나 열고, 결과와 상관없이 닫습니다.
pub struct MySqlCatalog {
    opts: Opts,
}

impl MySqlCatalog {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        Ok(MySqlCatalog {
            opts: config.build_opts()?,
        })
    }
}

impl SchemaCatalog for MySqlCatalog {
    async fn load_columns(&self, database: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        let mut conn = Conn::new(self.opts.clone())
            .await
            .map_err(|e| CdcError::ConnectionError(format!("Failed to open catalog connection: {}", e)))?;

        let result: std::result::Result<Vec<(String, u64, String, Option<String>)>, _> =
            conn.exec(COLUMNS_QUERY, (table, database)).await;

        if let Err(e) = conn.disconnect().await {
            warn!("Failed to close catalog connection: {}", e);
        }

        let rows = result.map_err(|e| CdcError::QueryError(format!("Failed to query columns: {}", e)))?;

        rows.into_iter()
            .map(|(column_name, position, data_type, character_set_name)| {
                let ordinal_position = u32::try_from(position).map_err(|_| {
                    CdcError::QueryError(format!("Ordinal position out of range: {}", position))
                })?;
                Ok(CatalogColumn {
                    column_name,
                    ordinal_position,
                    data_type,
                    character_set_name,
                })
            })
            .collect()
    }
}

/// 테이블 ID 및 컬럼 정보 캐시 (변환기 소유)
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables_by_id: HashMap<u64, TableMapData>,
    columns: HashMap<String, Arc<ColumnSchema>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(database: &str, table: &str) -> String {
        format!("{}.{}", database, table)
    }

    /// TABLE_MAP 이벤트의 테이블 ID 기록 (기존 ID는 덮어씀)
    pub fn record_table(&mut self, data: TableMapData) {
        self.tables_by_id.insert(data.table_id, data);
    }

    pub fn table(&self, table_id: u64) -> Option<&TableMapData> {
        self.tables_by_id.get(&table_id)
    }

    pub fn cached(&self, database: &str, table: &str) -> Option<Arc<ColumnSchema>> {
        self.columns.get(&Self::key(database, table)).cloned()
    }

    /// 캐시에 없으면 카탈로그에서 읽어 저장
    pub async fn resolve<C: SchemaCatalog>(
        &mut self,
        catalog: &C,
        database: &str,
        table: &str,
    ) -> Result<Arc<ColumnSchema>> {
        let key = Self::key(database, table);
        if let Some(schema) = self.columns.get(&key) {
            return Ok(schema.clone());
        }

        let rows = catalog
            .load_columns(database, table)
            .await
            .map_err(|e| CdcError::CatalogError {
                table: key.clone(),
                reason: e.to_string(),
            })?;

        let schema = Arc::new(ColumnSchema::from_catalog(rows));
        if schema.is_empty() {
            return Err(CdcError::CatalogError {
                table: key,
                reason: "no columns found".to_string(),
            });
        }
        info!("Loaded {} columns for {}", schema.len(), key);
        self.columns.insert(key, schema.clone());
        Ok(schema)
    }

    /// 컬럼 정보 무효화. 다음 TABLE_MAP에서 다시 읽음
    pub fn invalidate(&mut self, database: &str, table: &str) -> bool {
        let removed = self.columns.remove(&Self::key(database, table)).is_some();
        if removed {
            debug!("Invalidated column cache for {}.{}", database, table);
        }
        removed
    }

    /// 테이블 ID는 연결 범위이므로 재접속 시 비움
    pub fn reset_table_ids(&mut self) {
        self.tables_by_id.clear();
    }
}
