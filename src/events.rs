//! 디코딩된 복제 이벤트 타입 및 데이터 구조 정의
//!
//! 프로토콜 디코더가 넘겨주는 이벤트를 그대로 표현합니다.
//! 이 크레이트는 디코딩을 하지 않고, 이미 타입이 붙은 이벤트만 소비합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MySQL Binlog 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum EventType {
    /// 알 수 없는 이벤트
    #[default]
    Unknown = 0,
    /// 쿼리 이벤트 (DDL, BEGIN, 문장 기반 DML)
    QueryEvent = 2,
    /// 로테이션 이벤트 (새 binlog 파일)
    RotateEvent = 4,
    /// XID 이벤트 (트랜잭션 커밋)
    XidEvent = 16,
    /// 테이블 맵 이벤트
    TableMapEvent = 19,
    /// GA 이전 인코딩 WRITE_ROWS
    PreGaWriteRowsEvent = 20,
    /// GA 이전 인코딩 UPDATE_ROWS
    PreGaUpdateRowsEvent = 21,
    /// GA 이전 인코딩 DELETE_ROWS
    PreGaDeleteRowsEvent = 22,
    /// v1 WRITE_ROWS
    WriteRowsEventV1 = 23,
    /// v1 UPDATE_ROWS
    UpdateRowsEventV1 = 24,
    /// v1 DELETE_ROWS
    DeleteRowsEventV1 = 25,
    /// 확장(v2) WRITE_ROWS 이벤트 (INSERT)
    WriteRowsEvent = 30,
    /// 확장(v2) UPDATE_ROWS 이벤트 (UPDATE)
    UpdateRowsEvent = 31,
    /// 확장(v2) DELETE_ROWS 이벤트 (DELETE)
    DeleteRowsEvent = 32,
    /// GTID 이벤트
    GtidEvent = 33,
    /// 익명 GTID 이벤트
    AnonymousGtidEvent = 34,
}

/// Binlog 이벤트 헤더
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventHeader {
    /// 이벤트 타입스탬프 (초 단위)
    pub timestamp: u32,
    /// 이벤트 타입
    pub event_type: EventType,
    /// MySQL 서버 ID
    pub server_id: u32,
    /// 이벤트 길이 (바이트)
    pub event_length: u32,
    /// 다음 이벤트 위치
    pub next_pos: u32,
    /// 이벤트 플래그
    pub flags: u16,
}

/// 행 이벤트에 포함된 컬럼 비트맵
///
/// 비트 0이 첫 번째 컬럼이며, 바이트 내부는 LSB부터 채워집니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnBitmap(Vec<u8>);

impl ColumnBitmap {
    /// 0부터 시작하는 컬럼 위치들로 비트맵 생성
    pub fn from_positions(positions: &[usize]) -> Self {
        let len = positions.iter().max().map(|max| max / 8 + 1).unwrap_or(0);
        let mut bytes = vec![0u8; len];
        for &pos in positions {
            bytes[pos / 8] |= 1 << (pos % 8);
        }
        ColumnBitmap(bytes)
    }

    pub fn is_set(&self, pos: usize) -> bool {
        self.0
            .get(pos / 8)
            .map(|byte| byte & (1 << (pos % 8)) != 0)
            .unwrap_or(false)
    }

    /// 켜진 비트 위치를 오름차순으로 순회
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.0.len() * 8).filter(move |&pos| self.is_set(pos))
    }
}

/// 테이블 맵 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMapData {
    /// 테이블 ID (연결 범위 내에서만 유효)
    pub table_id: u64,
    /// 데이터베이스명
    pub database: String,
    /// 테이블명
    pub table: String,
}

/// WRITE_ROWS 이벤트 데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRowsData {
    /// 테이블 ID
    pub table_id: u64,
    /// 포함된 컬럼 비트맵
    pub columns_present: ColumnBitmap,
    /// 행 데이터들 (포함된 컬럼 값만, 비트 순서대로)
    pub rows: Vec<Vec<CellValue>>,
}

/// UPDATE_ROWS 이벤트 데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRowsData {
    /// 테이블 ID
    pub table_id: u64,
    /// 변경 전 이미지에 포함된 컬럼 비트맵
    pub columns_before: ColumnBitmap,
    /// 변경 후 이미지에 포함된 컬럼 비트맵
    pub columns_after: ColumnBitmap,
    /// 변경 전후 데이터 쌍들
    pub rows: Vec<(Vec<CellValue>, Vec<CellValue>)>,
}

/// DELETE_ROWS 이벤트 데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRowsData {
    /// 테이블 ID
    pub table_id: u64,
    /// 포함된 컬럼 비트맵
    pub columns_present: ColumnBitmap,
    /// 행 데이터들
    pub rows: Vec<Vec<CellValue>>,
}

/// 셀 값 (디코더가 넘겨준 런타임 표현 그대로)
///
/// 같은 `datetime` 컬럼이라도 스토리지 엔진에 따라 `DateTime` 또는
/// epoch 밀리초 `Int`로 들어올 수 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Time(String),
    Json(serde_json::Value),
}

impl CellValue {
    /// slot 컬럼 값으로 해석
    pub fn as_slot(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }
}

/// 쿼리 이벤트 데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEventData {
    /// 스레드 ID
    #[serde(default)]
    pub thread_id: u32,
    /// 기본 데이터베이스명
    pub database: String,
    /// 쿼리 문자열
    pub query: String,
}

/// 회전 이벤트 데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotateEventData {
    /// 새 바이너리 로그 파일명
    pub next_binlog_name: String,
    /// 새 파일의 시작 위치
    pub position: u64,
}

/// XID 이벤트 데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XidEventData {
    pub xid: u64,
}

/// 모든 Binlog 이벤트를 포함하는 열거형
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BinlogEventData {
    TableMap(TableMapData),
    Rotate(RotateEventData),
    WriteRows(WriteRowsData),
    UpdateRows(UpdateRowsData),
    DeleteRows(DeleteRowsData),
    Query(QueryEventData),
    Xid(XidEventData),
    /// 처리 대상이 아닌 이벤트
    Other,
}

/// 완성된 Binlog 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinlogEvent {
    /// 이벤트 헤더
    #[serde(default)]
    pub header: EventHeader,
    /// 이벤트 데이터
    pub data: BinlogEventData,
}

impl BinlogEvent {
    pub fn new(event_type: EventType, data: BinlogEventData) -> Self {
        BinlogEvent {
            header: EventHeader {
                event_type,
                ..Default::default()
            },
            data,
        }
    }
}

/// 행 변경 연산 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
    Ddl,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "INSERT",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::Ddl => "DDL",
        }
    }
}
