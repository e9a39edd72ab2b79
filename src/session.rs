//! 복제 세션 관리
//!
//! 세션은 DISCONNECTED / CONNECTED 두 상태만 가지며, connect는 DISCONNECTED에서만 허용됩니다.
//! connect / disconnect / is_connected는 하나의 배타 락 아래에서 실행됩니다.
//!
//! 연결되면 두 개의 태스크가 돕니다:
//! - 이벤트 펌프: 스트림에서 이벤트를 하나씩 꺼내 변환기에 넘김 (이벤트 간 재진입 없음)
//! - idle 체크: 초기 지연 후 주기적으로 task의 마지막 활동 시각을 watchdog에 넘김

use crate::config::IdleCheckConfig;
use crate::dispatch::SqlExecutor;
use crate::error::{CdcError, Result};
use crate::events::BinlogEvent;
use crate::offset::{ReplicationPosition, SharedPosition};
use crate::router::{MigrationTask, TaskRouter};
use crate::schema::SchemaCatalog;
use crate::translator::EventTranslator;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 디코딩된 이벤트 스트림
pub type EventStream = mpsc::UnboundedReceiver<BinlogEvent>;

/// 복제 클라이언트 collaborator (프로토콜 디코딩 담당)
pub trait BinlogSource: Send + Sync + 'static {
    /// 주어진 위치부터 스트리밍 시작
    fn connect(
        &self,
        position: &ReplicationPosition,
    ) -> impl Future<Output = Result<EventStream>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}

/// idle 체크 collaborator. 재접속 정책은 구현체가 결정
pub trait IdleWatchdog: Send + Sync + 'static {
    fn check(&self, tasks: &[Arc<MigrationTask>], now: DateTime<Utc>);
}

/// 일정 시간 이상 활동이 없는 task를 경고 로그로 남기는 watchdog
pub struct IdleLogger {
    idle_timeout: Duration,
}

impl IdleLogger {
    pub fn new(idle_timeout: Duration) -> Self {
        IdleLogger { idle_timeout }
    }

    fn is_idle(&self, task: &MigrationTask, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(task.last_activity())
            .to_std()
            .map(|elapsed| elapsed > self.idle_timeout)
            .unwrap_or(false)
    }

    pub fn idle_tasks<'a>(
        &self,
        tasks: &'a [Arc<MigrationTask>],
        now: DateTime<Utc>,
    ) -> Vec<&'a Arc<MigrationTask>> {
        tasks
            .iter()
            .filter(|t| !t.has_error() && self.is_idle(t, now))
            .collect()
    }
}

impl IdleWatchdog for IdleLogger {
    fn check(&self, tasks: &[Arc<MigrationTask>], now: DateTime<Utc>) {
        for task in self.idle_tasks(tasks, now) {
            warn!(
                "Task {} idle since {}",
                task.name(),
                task.last_activity().to_rfc3339()
            );
        }
    }
}

struct ActiveSession {
    pump: JoinHandle<()>,
    idle_check: JoinHandle<()>,
}

impl ActiveSession {
    fn is_live(&self) -> bool {
        !self.pump.is_finished()
    }

    fn stop(self) {
        self.pump.abort();
        self.idle_check.abort();
    }
}

enum SessionState {
    Disconnected,
    Connected(ActiveSession),
}

/// 복제 세션
pub struct ReplicationSession<S, C, E> {
    source: Arc<S>,
    translator: Arc<Mutex<EventTranslator<C, E>>>,
    router: Arc<TaskRouter>,
    position: SharedPosition,
    watchdog: Arc<dyn IdleWatchdog>,
    idle_check: IdleCheckConfig,
    state: Mutex<SessionState>,
}

impl<S, C, E> ReplicationSession<S, C, E>
where
    S: BinlogSource,
    C: SchemaCatalog + 'static,
    E: SqlExecutor + 'static,
{
    pub fn new(
        source: Arc<S>,
        translator: EventTranslator<C, E>,
        watchdog: Arc<dyn IdleWatchdog>,
        idle_check: IdleCheckConfig,
    ) -> Self {
        let router = translator.router().clone();
        let position = translator.position().clone();
        ReplicationSession {
            source,
            translator: Arc::new(Mutex::new(translator)),
            router,
            position,
            watchdog,
            idle_check,
            state: Mutex::new(SessionState::Disconnected),
        }
    }

    pub fn position(&self) -> ReplicationPosition {
        self.position.read().clone()
    }

    pub async fn connect(&self) -> Result<()> {
        self.open(None).await
    }

    /// 초기 연결 handshake에만 제한 시간 적용
    pub async fn connect_timeout(&self, timeout: Duration) -> Result<()> {
        self.open(Some(timeout)).await
    }

    async fn open(&self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.state.lock().await;

        if let SessionState::Connected(active) = &*state {
            if active.is_live() {
                return Err(CdcError::AlreadyConnected);
            }
        }
        // 스트림이 스스로 끝난 세션 정리
        if let SessionState::Connected(stale) =
            std::mem::replace(&mut *state, SessionState::Disconnected)
        {
            debug!("Cleaning up finished replication session");
            stale.stop();
        }

        let position = self.position();
        info!("Opening replication stream at {}", position);

        let stream = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.connect(&position))
                .await
                .map_err(|_| CdcError::Timeout)??,
            None => self.source.connect(&position).await?,
        };

        self.translator.lock().await.reset_connection();
        self.router.touch_all(Utc::now());

        let pump = tokio::spawn(pump_events(stream, self.translator.clone()));
        let idle_check = tokio::spawn(run_idle_check(
            self.watchdog.clone(),
            self.router.clone(),
            self.idle_check.clone(),
        ));

        *state = SessionState::Connected(ActiveSession { pump, idle_check });
        info!("Replication stream connected");
        Ok(())
    }

    /// 활성 세션이 없으면 아무 것도 하지 않음
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if let SessionState::Connected(active) =
            std::mem::replace(&mut *state, SessionState::Disconnected)
        {
            let result = self.source.disconnect().await;
            active.stop();
            info!("Replication stream disconnected at {}", self.position());
            result?;
        }

        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        matches!(&*self.state.lock().await, SessionState::Connected(active) if active.is_live())
    }
}

async fn pump_events<C, E>(mut stream: EventStream, translator: Arc<Mutex<EventTranslator<C, E>>>)
where
    C: SchemaCatalog,
    E: SqlExecutor,
{
    let mut event_count: u64 = 0;
    while let Some(event) = stream.recv().await {
        event_count += 1;
        let mut translator = translator.lock().await;
        if let Err(e) = translator.handle_event(&event).await {
            warn!(
                "Dropping event #{} ({:?}): {}",
                event_count, event.header.event_type, e
            );
        }
    }
    info!("Replication stream ended. Total events received: {}", event_count);
}

async fn run_idle_check(watchdog: Arc<dyn IdleWatchdog>, router: Arc<TaskRouter>, config: IdleCheckConfig) {
    tokio::time::sleep(config.initial_delay()).await;
    let mut ticker = tokio::time::interval(config.period().max(Duration::from_millis(1)));
    loop {
        ticker.tick().await;
        watchdog.check(router.tasks(), Utc::now());
    }
}
