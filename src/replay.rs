//! 디코딩된 이벤트 파일 재생
//!
//! 한 줄에 `BinlogEvent` JSON 하나씩 들어 있는 파일을 스트림으로 흘려보냅니다.
//! 프로토콜 디코더가 덤프한 이벤트를 다시 적용하거나, 로컬에서 task 설정을 검증할 때 사용합니다.
//! 빈 줄과 `//`로 시작하는 줄은 무시합니다.

use crate::error::{CdcError, Result};
use crate::events::BinlogEvent;
use crate::offset::ReplicationPosition;
use crate::session::{BinlogSource, EventStream};
use parking_lot::Mutex;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct ReplaySource {
    path: PathBuf,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ReplaySource {
            path: path.into(),
            reader: Mutex::new(None),
        }
    }
}

/// 한 줄 파싱. 건너뛸 줄이면 None
pub fn parse_line(line: &str) -> Result<Option<BinlogEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

impl BinlogSource for ReplaySource {
    async fn connect(&self, position: &ReplicationPosition) -> Result<EventStream> {
        let file = File::open(&self.path).await.map_err(|e| {
            CdcError::ConnectionError(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        info!(
            "Replaying {} (requested position {})",
            self.path.display(),
            position
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.path.clone();
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0usize;
            loop {
                line_no += 1;
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read {}: {}", path.display(), e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Some(event)) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("{}:{}: {}", path.display(), line_no, e);
                        break;
                    }
                }
            }
            info!("Replay of {} finished after {} lines", path.display(), line_no - 1);
        });

        if let Some(previous) = self.reader.lock().replace(handle) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BinlogEventData;
    use std::io::Write;

    #[test]
    fn test_parse_line_skips_comments() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("  // header").unwrap().is_none());
        assert!(parse_line("{not json").is_err());
    }

    #[tokio::test]
    async fn test_replay_streams_events_in_order() {
        let path = std::env::temp_dir().join(format!("binlog_migrate_replay_{}.jsonl", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "// mydb.orders").unwrap();
            writeln!(
                file,
                r#"{{"data":{{"TableMap":{{"table_id":7,"database":"mydb","table":"orders"}}}}}}"#
            )
            .unwrap();
            writeln!(file).unwrap();
            writeln!(
                file,
                r#"{{"header":{{"server_id":3}},"data":{{"Query":{{"database":"mydb","query":"BEGIN"}}}}}}"#
            )
            .unwrap();
        }

        let source = ReplaySource::new(&path);
        let mut rx = source
            .connect(&ReplicationPosition::new("mysql-bin.000001", 4, 1))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.data, BinlogEventData::TableMap(_)));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.header.server_id, 3);
        assert!(rx.recv().await.is_none());

        source.disconnect().await.unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_connection_error() {
        let source = ReplaySource::new("/nonexistent/binlog_migrate.jsonl");
        let result = source
            .connect(&ReplicationPosition::new("mysql-bin.000001", 4, 1))
            .await;
        assert!(matches!(result, Err(CdcError::ConnectionError(_))));
    }
}
