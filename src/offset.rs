//! 복제 재시작 위치 추적
//!
//! Binlog 파일명 + 위치 + 복제 클라이언트 server id로 재접속 지점을 표현합니다.
//! 예: "mysql-bin.000003" 파일의 4097 바이트 위치

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 재접속 시 사용하는 복제 위치
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicationPosition {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001")
    pub filename: String,
    /// 바이트 위치
    pub position: u64,
    /// 복제 클라이언트로 사용할 server id
    pub server_id: u32,
}

impl ReplicationPosition {
    pub fn new(filename: impl Into<String>, position: u64, server_id: u32) -> Self {
        ReplicationPosition {
            filename: filename.into(),
            position,
            server_id,
        }
    }

    /// 파일명에서 시퀀스 번호 추출
    pub fn file_sequence(&self) -> Option<u64> {
        self.filename.rsplit('.').next().and_then(|s| s.parse().ok())
    }

    /// ROTATE 이벤트 반영
    pub fn rotate(&mut self, filename: String, position: u64) {
        self.filename = filename;
        self.position = position;
    }
}

impl fmt::Display for ReplicationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (server_id={})", self.filename, self.position, self.server_id)
    }
}

/// 세션과 변환기가 공유하는 위치
pub type SharedPosition = Arc<RwLock<ReplicationPosition>>;

pub fn shared(position: ReplicationPosition) -> SharedPosition {
    Arc::new(RwLock::new(position))
}
