use std::path::Path;
use std::sync::Arc;

use timetable_engine::jobs::JobManager;
use timetable_engine::repository::{SnapshotCache, SqliteRepository};
use timetable_engine::server::{AppState, run_server};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db_path =
        std::env::var("TIMETABLE_DB").unwrap_or_else(|_| "data/timetable.db".to_string());
    if let Some(dir) = Path::new(&db_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).expect("failed to create the database directory");
        }
    }
    let repository =
        Arc::new(SqliteRepository::open(&db_path).expect("failed to open the schedule database"));

    let bind_addr =
        std::env::var("TIMETABLE_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let state = AppState {
        repository,
        jobs: Arc::new(JobManager::new()),
        cache: Arc::new(SnapshotCache::new()),
    };

    run_server(state, &bind_addr).await.expect("server failed");
}
