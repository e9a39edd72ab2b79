//! slot 기반 MySQL 리샤딩/마이그레이션용 binlog CDC 변환기
//!
//! 복제 이벤트 스트림을 받아 행 변경과 DDL을 SQL로 재구성하고,
//! (schema, table, slot 범위)가 맞는 마이그레이션 task의 대상 노드로 전달합니다.
//! 주요 구성:
//! - 테이블 컬럼 메타데이터 캐시
//! - 셀 값 → SQL 리터럴 변환 (시간대 처리 포함)
//! - task 라우팅 및 task별 fail-closed 전달
//! - 복제 세션 수명 주기와 idle 체크

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod offset;
pub mod replay;
pub mod router;
pub mod schema;
pub mod session;
pub mod statement;
pub mod translator;

#[cfg(test)]
mod testing;

pub use codec::{LiteralQuoting, SessionZone, ValueCodec};
pub use config::{ConnectionConfig, MigrationConfig};
pub use dispatch::{DispatchGateway, MySqlExecutor, SqlExecutor, SqlJob};
pub use error::{CdcError, Result};
pub use events::{BinlogEvent, BinlogEventData, CellValue, EventType};
pub use offset::ReplicationPosition;
pub use replay::ReplaySource;
pub use router::{MigrationTask, SlotRange, TaskRouter};
pub use schema::{MySqlCatalog, SchemaCatalog};
pub use session::{BinlogSource, IdleLogger, IdleWatchdog, ReplicationSession};
pub use translator::{EventTranslator, TranslatorOptions};
