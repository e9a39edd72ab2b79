/// binlog 마이그레이션 실행기
///
/// 설정 파일의 task 목록대로 재생 파일의 이벤트를 SQL로 바꿔 대상 노드에 적용합니다.
///
/// 사용법:
///   MIGRATE_CONFIG=migrate.json RUST_LOG=info cargo run
use binlog_migrate::offset;
use binlog_migrate::{
    CdcError, DispatchGateway, EventTranslator, IdleLogger, MigrationConfig, MySqlCatalog,
    MySqlExecutor, ReplaySource, ReplicationSession, SessionZone, TranslatorOptions, ValueCodec,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path = env::var("MIGRATE_CONFIG").unwrap_or_else(|_| "migrate.json".to_string());
    let config = MigrationConfig::from_json_file(&config_path)?;
    info!("Loaded {} tasks from {}", config.tasks.len(), config_path);

    let replay_path = config
        .replay_path
        .clone()
        .ok_or_else(|| CdcError::ConfigError("replay_path is required".to_string()))?;

    let router = Arc::new(config.build_router()?);
    let catalog = MySqlCatalog::new(&config.connection)?;
    let executor = Arc::new(MySqlExecutor::new(&config.destinations)?);

    let translator = EventTranslator::new(
        catalog,
        DispatchGateway::new(executor),
        router.clone(),
        ValueCodec::new(SessionZone::System, config.literal_quoting),
        TranslatorOptions::from_config(&config),
        offset::shared(config.start_position()),
    );

    let session = ReplicationSession::new(
        Arc::new(ReplaySource::new(replay_path)),
        translator,
        Arc::new(IdleLogger::new(config.idle_check.idle_timeout())),
        config.idle_check.clone(),
    );

    match config.connection.timeout() {
        Some(timeout) => session.connect_timeout(timeout).await?,
        None => session.connect().await?,
    }

    // 스트림이 끝나거나 Ctrl+C까지 대기
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if !session.is_connected().await {
                    break;
                }
            }
        }
    }

    session.disconnect().await?;
    info!("Stopped at {}", session.position());

    for task in router.tasks() {
        if task.has_error() {
            warn!("Task {} stopped on error", task.name());
        }
    }

    Ok(())
}
