//! 마이그레이션 CDC 에러 타입

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdcError {
    #[error("MySQL 연결 에러: {0}")]
    ConnectionError(String),

    #[error("복제 스트림이 이미 열려 있습니다")]
    AlreadyConnected,

    #[error("Timeout 에러")]
    Timeout,

    #[error("카탈로그 조회 에러 ({table}): {reason}")]
    CatalogError { table: String, reason: String },

    #[error("이벤트 변환 에러: {0}")]
    TranslationError(String),

    #[error("유효하지 않은 slot 값: {0}")]
    InvalidSlot(String),

    #[error("쿼리 실행 에러: {0}")]
    QueryError(String),

    #[error("SQL 실행 실패 (task {task}): {reason}")]
    ExecutionError { task: String, reason: String },

    #[error("설정 에러: {0}")]
    ConfigError(String),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("채널이 닫혔습니다")]
    ChannelClosed,

    #[error("예상치 못한 에러: {0}")]
    Other(String),
}

impl From<io::Error> for CdcError {
    fn from(err: io::Error) -> Self {
        CdcError::IoError(err.to_string())
    }
}

impl From<mysql_async::Error> for CdcError {
    fn from(err: mysql_async::Error) -> Self {
        CdcError::QueryError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;
