// SQLite Broker Connection

use crate::connection::{connect_options, create_pool};
use crate::migration::run_migrations;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stevedore_core::domain::{Job, JobId, JobPayload, JobState, JobType, WorkerState};
use stevedore_core::error::{AppError, Result};
use stevedore_core::port::{
    BrokerTarget, Connection, ConnectionFactory, TimeProvider, WorkerRegistration,
};
use tracing::{debug, info};

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // SQLite error codes: https://www.sqlite.org/rescode.html
            let code = db_err.code().map(|c| c.into_owned());
            let primary = code.as_deref().and_then(|c| c.parse::<i32>().ok()).map(|c| c & 0xff);
            match (code.as_deref(), primary) {
                (Some(code @ ("2067" | "1555")), _) => AppError::Database(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                (_, Some(5)) => AppError::Database(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                (_, Some(13)) => AppError::Database(format!("Database full: {}", db_err.message())),
                // SQLITE_CANTOPEN / SQLITE_NOTADB: the broker itself is unusable
                (Some(code), Some(14 | 26)) => AppError::Connection(format!(
                    "Cannot open broker database [{}]: {}",
                    code,
                    db_err.message()
                )),
                (Some(code), _) => AppError::Database(format!(
                    "Database error [{}]: {}",
                    code,
                    db_err.message()
                )),
                (None, _) => AppError::Database(format!("Database error: {}", db_err.message())),
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => AppError::Connection(err.to_string()),
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

const JOB_COLUMNS: &str =
    "id, queue, job_type, payload, state, created_at, started_at, finished_at, worker_name, error";

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// `Connection` backed by a SQLite database file.
///
/// Several processes may open the same file; claims are single atomic
/// statements, so a job is handed to exactly one worker.
pub struct SqliteConnection {
    id: String,
    target: BrokerTarget,
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteConnection {
    /// Wrap an already migrated pool
    pub fn new(
        pool: SqlitePool,
        target: BrokerTarget,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let id = format!(
            "sqlite-{}-{}",
            std::process::id(),
            NEXT_CONNECTION.fetch_add(1, Ordering::SeqCst)
        );
        Self {
            id,
            target,
            pool,
            time_provider,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &BrokerTarget {
        &self.target
    }

    async fn enqueue(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, queue, job_type, payload, state,
                created_at, started_at, finished_at, worker_name, error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.queue)
        .bind(job.job_type.as_str())
        .bind(job.payload.as_value().to_string())
        .bind(job.state.as_str())
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(&job.worker_name)
        .bind(&job.error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn pop_next(&self, queue: &str, worker: &str) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();

        // One statement: select the oldest queued row and claim it
        let sql = format!(
            r#"
            UPDATE jobs
            SET state = ?, started_at = ?, worker_name = ?
            WHERE seq = (
                SELECT seq FROM jobs
                WHERE queue = ? AND state = ?
                ORDER BY seq ASC
                LIMIT 1
            )
              AND state = ?
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(JobState::Started.as_str())
            .bind(now)
            .bind(worker)
            .bind(queue)
            .bind(JobState::Queued.as_str())
            .bind(JobState::Queued.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, started_at = ?, finished_at = ?, worker_name = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(job.state.as_str())
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(&job.worker_name)
        .bind(&job.error)
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {} not found", job.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = ? AND state = ?")
                .bind(queue)
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn register_worker(
        &self,
        registration: &WorkerRegistration,
        stale_after_ms: i64,
    ) -> Result<()> {
        let stale_before = self.time_provider.now_millis() - stale_after_ms;
        let queues = serde_json::to_string(&registration.queues)?;

        // Replaces the existing row only if its heartbeat is stale
        let result = sqlx::query(
            r#"
            INSERT INTO workers (name, pid, queues, state, current_job, birth, last_heartbeat)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                pid = excluded.pid,
                queues = excluded.queues,
                state = excluded.state,
                current_job = excluded.current_job,
                birth = excluded.birth,
                last_heartbeat = excluded.last_heartbeat
            WHERE workers.last_heartbeat < ?
            "#,
        )
        .bind(&registration.name)
        .bind(i64::from(registration.pid))
        .bind(&queues)
        .bind(registration.state.as_str())
        .bind(&registration.current_job)
        .bind(registration.birth)
        .bind(registration.last_heartbeat)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Configuration(format!(
                "There exists an active worker named '{}' already",
                registration.name
            )));
        }
        debug!(worker = %registration.name, "Registered worker");
        Ok(())
    }

    async fn update_worker(
        &self,
        name: &str,
        state: WorkerState,
        current_job: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workers
            SET state = ?, current_job = ?, last_heartbeat = ?
            WHERE name = ?
            "#,
        )
        .bind(state.as_str())
        .bind(current_job)
        .bind(self.time_provider.now_millis())
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn unregister_worker(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM workers WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRegistration>> {
        let rows: Vec<WorkerRow> = sqlx::query_as(
            r#"
            SELECT name, pid, queues, state, current_job, birth, last_heartbeat
            FROM workers
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(WorkerRow::into_registration).collect()
    }
}

/// Opens SQLite broker connections and brings the schema up to date.
///
/// Every failure to open or migrate the database is an `AppError::Connection`.
pub struct SqliteConnectionFactory {
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteConnectionFactory {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { time_provider }
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    fn check_target(&self, target: &BrokerTarget) -> Result<()> {
        connect_options(&target.url).map(|_| ())
    }

    async fn connect(&self, target: &BrokerTarget) -> Result<Arc<dyn Connection>> {
        self.check_target(target)?;

        let as_connection_error = |e: AppError| match e {
            AppError::Configuration(_) => e,
            AppError::Connection(msg) | AppError::Database(msg) => {
                AppError::Connection(format!("Error connecting to {}: {}", target, msg))
            }
            other => AppError::Connection(format!("Error connecting to {}: {}", target, other)),
        };

        let pool = create_pool(&target.url).await.map_err(as_connection_error)?;
        run_migrations(&pool).await.map_err(as_connection_error)?;

        let connection = SqliteConnection::new(pool, target.clone(), self.time_provider.clone());
        info!(broker = %target, connection = %connection.id(), "Opened broker connection");
        Ok(Arc::new(connection))
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    job_type: String,
    payload: String,
    state: String,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    worker_name: Option<String>,
    error: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let state = JobState::parse(&self.state).ok_or_else(|| {
            AppError::Database(format!("Job {} has unknown state '{}'", self.id, self.state))
        })?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload)?;

        Ok(Job {
            id: self.id,
            queue: self.queue,
            job_type: JobType::new(self.job_type),
            payload: JobPayload::new(payload),
            state,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            worker_name: self.worker_name,
            error: self.error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WorkerRow {
    name: String,
    pid: i64,
    queues: String,
    state: String,
    current_job: Option<String>,
    birth: i64,
    last_heartbeat: i64,
}

impl WorkerRow {
    fn into_registration(self) -> Result<WorkerRegistration> {
        let state = WorkerState::parse(&self.state).ok_or_else(|| {
            AppError::Database(format!(
                "Worker {} has unknown state '{}'",
                self.name, self.state
            ))
        })?;
        let pid = u32::try_from(self.pid).map_err(|_| {
            AppError::Database(format!("Worker {} has invalid pid {}", self.name, self.pid))
        })?;

        Ok(WorkerRegistration {
            queues: serde_json::from_str(&self.queues)?,
            name: self.name,
            pid,
            state,
            current_job: self.current_job,
            birth: self.birth,
            last_heartbeat: self.last_heartbeat,
        })
    }
}
