//! 생성된 SQL을 task의 대상 노드로 전달
//!
//! 실행은 외부 executor가 비동기로 처리하고, 실패하면 listener가 task의 에러 플래그를 켭니다.
//! 에러 플래그가 켜진 task로는 더 이상 문장을 보내지 않습니다.

use crate::error::{CdcError, Result};
use crate::router::MigrationTask;
use chrono::Utc;
use mysql_async::prelude::*;
use mysql_async::{Opts, Pool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 실행 결과를 원래 task로 되돌려주는 listener
#[derive(Debug)]
pub struct JobListener {
    task: Arc<MigrationTask>,
    sql: String,
}

impl JobListener {
    pub fn new(task: Arc<MigrationTask>, sql: impl Into<String>) -> Self {
        JobListener {
            task,
            sql: sql.into(),
        }
    }

    pub fn on_complete(self, result: Result<()>) {
        match result {
            Ok(()) => debug!("Executed on {}: {}", self.task.to, self.sql),
            Err(e) => {
                let err = CdcError::ExecutionError {
                    task: self.task.name(),
                    reason: e.to_string(),
                };
                error!("{} sql: {}", err, self.sql);
                self.task.mark_error();
            }
        }
    }
}

/// 실행 요청 하나
#[derive(Debug)]
pub struct SqlJob {
    pub destination: String,
    pub sql: String,
    pub listener: JobListener,
}

/// 비동기 SQL 실행 collaborator
///
/// `submit`은 블로킹하면 안 되며, 실행이 끝나면 반드시 listener를 호출해야 합니다.
pub trait SqlExecutor: Send + Sync {
    fn submit(&self, job: SqlJob);
}

/// task 단위 전달 게이트웨이
pub struct DispatchGateway<E> {
    executor: Arc<E>,
}

impl<E> Clone for DispatchGateway<E> {
    fn clone(&self) -> Self {
        DispatchGateway {
            executor: self.executor.clone(),
        }
    }
}

impl<E: SqlExecutor> DispatchGateway<E> {
    pub fn new(executor: Arc<E>) -> Self {
        DispatchGateway { executor }
    }

    /// 에러 플래그가 켜진 task면 버리고 false 반환
    pub fn dispatch(&self, task: &Arc<MigrationTask>, sql: &str) -> bool {
        if task.has_error() {
            debug!("Task {} has error, dropping: {}", task.name(), sql);
            return false;
        }

        task.touch(Utc::now());
        self.executor.submit(SqlJob {
            destination: task.to.clone(),
            sql: sql.to_string(),
            listener: JobListener::new(task.clone(), sql),
        });
        true
    }
}

/// 대상 노드별 mysql_async 풀과 순차 실행 워커
pub struct MySqlExecutor {
    workers: HashMap<String, mpsc::UnboundedSender<SqlJob>>,
}

impl MySqlExecutor {
    /// 노드 ID → mysql URL. tokio 런타임 안에서 호출해야 함
    pub fn new(destinations: &HashMap<String, String>) -> Result<Self> {
        let mut workers = HashMap::new();
        for (destination, url) in destinations {
            let opts = Opts::from_url(url).map_err(|e| {
                CdcError::ConfigError(format!("Invalid url for {}: {}", destination, e))
            })?;
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_worker(destination.clone(), Pool::new(opts), rx));
            workers.insert(destination.clone(), tx);
        }
        info!("Started {} destination workers", workers.len());
        Ok(MySqlExecutor { workers })
    }
}

impl SqlExecutor for MySqlExecutor {
    fn submit(&self, job: SqlJob) {
        let Some(worker) = self.workers.get(&job.destination) else {
            let reason = format!("unknown destination {}", job.destination);
            job.listener.on_complete(Err(CdcError::Other(reason)));
            return;
        };

        if let Err(mpsc::error::SendError(job)) = worker.send(job) {
            job.listener.on_complete(Err(CdcError::ChannelClosed));
        }
    }
}

async fn run_worker(destination: String, pool: Pool, mut rx: mpsc::UnboundedReceiver<SqlJob>) {
    while let Some(job) = rx.recv().await {
        let result = execute(&pool, &job.sql).await;
        job.listener.on_complete(result);
    }

    debug!("Worker for {} stopped", destination);
    if let Err(e) = pool.disconnect().await {
        warn!("Failed to disconnect pool for {}: {}", destination, e);
    }
}

async fn execute(pool: &Pool, sql: &str) -> Result<()> {
    let mut conn = pool
        .get_conn()
        .await
        .map_err(|e| CdcError::ConnectionError(format!("Failed to get connection: {}", e)))?;
    conn.query_drop(sql).await?;
    Ok(())
}
