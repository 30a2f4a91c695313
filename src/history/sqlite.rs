use super::HistoryStore;
use crate::error::HistoryError;
use crate::models::{AgentIdentity, AgentRegistration, Request, RequestStatus, Response};
use crate::utils::time;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

const REQUEST_COLUMNS: &str =
    "request_id, session_id, prompt, options, status, is_pause, created_at, updated_at";

const AGENT_COLUMNS: &str = "agent_id, context, model, credits_spent, tool_calls, files_changed, \
     created_at, last_activity";

/// SQLite-backed history store.
///
/// Uses sqlx for async database operations, so it runs on the tokio runtime
/// and is safe to share across tasks.
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (or create) the database and initialize the schema.
    ///
    /// The path can be:
    /// - A file path like "sessions.db" or "./data/sessions.db"
    /// - ":memory:" for an in-memory database (testing)
    pub async fn open(path: &str) -> Result<Self, HistoryError> {
        let in_memory = path == ":memory:";
        let connection_string = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            // Ensure parent directory exists
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
            format!("sqlite://{}", path)
        };

        // A single connection keeps every query on the same in-memory database
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(SqliteConnectOptions::from_str(&connection_string)?.create_if_missing(true))
            .await?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Initialize the database schema (tables and indexes).
    async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                prompt TEXT NOT NULL,
                options TEXT,
                status TEXT NOT NULL,
                is_pause INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL UNIQUE,
                response_text TEXT NOT NULL,
                cancelled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL UNIQUE,
                context TEXT,
                model TEXT,
                credits_spent INTEGER NOT NULL DEFAULT 0,
                tool_calls INTEGER NOT NULL DEFAULT 0,
                files_changed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_session ON session_requests(session_id)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_status ON session_requests(status)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Convert a database row to a Request.
    fn row_to_request(row: SqliteRow) -> Result<Request, HistoryError> {
        let options_json: Option<String> = row.try_get("options")?;
        let options = match options_json {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        let status_str: String = row.try_get("status")?;
        let status = RequestStatus::from_str(&status_str)
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Request {
            request_id: row.try_get("request_id")?,
            session_id: row.try_get("session_id")?,
            prompt: row.try_get("prompt")?,
            options,
            status,
            is_pause: row.try_get("is_pause")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Convert a database row to an AgentIdentity.
    fn row_to_agent(row: SqliteRow) -> Result<AgentIdentity, HistoryError> {
        Ok(AgentIdentity {
            agent_id: row.try_get("agent_id")?,
            context: row.try_get("context")?,
            model: row.try_get("model")?,
            credits_spent: row.try_get("credits_spent")?,
            tool_calls: row.try_get("tool_calls")?,
            files_changed: row.try_get("files_changed")?,
            created_at: row.try_get("created_at")?,
            last_activity: row.try_get("last_activity")?,
        })
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentIdentity>, HistoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agent_sessions WHERE agent_id = $1",
            AGENT_COLUMNS
        ))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_agent).transpose()
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn record_request(&self, request: &Request) -> Result<(), HistoryError> {
        let options_json = if request.options.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&request.options)?)
        };

        sqlx::query(
            "INSERT INTO session_requests
                (request_id, session_id, prompt, options, status, is_pause, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&request.request_id)
        .bind(&request.session_id)
        .bind(&request.prompt)
        .bind(options_json)
        .bind(request.status.as_str())
        .bind(request.is_pause)
        .bind(&request.created_at)
        .bind(&request.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_response(&self, response: &Response) -> Result<(), HistoryError> {
        let mut tx = self.pool.begin().await?;

        // A deleted request gets no orphan response row
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO session_responses (request_id, response_text, cancelled, created_at)
             SELECT $1, $2, $3, $4
             WHERE EXISTS (SELECT 1 FROM session_requests WHERE request_id = $1)",
        )
        .bind(&response.request_id)
        .bind(&response.text)
        .bind(response.cancelled)
        .bind(&response.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() > 0 {
            sqlx::query(
                "UPDATE session_requests SET status = $1, updated_at = $2
                 WHERE request_id = $3 AND status = 'PENDING'",
            )
            .bind(response.resulting_status().as_str())
            .bind(&response.created_at)
            .bind(&response.request_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<(), HistoryError> {
        sqlx::query(
            "UPDATE session_requests SET status = $1, updated_at = $2
             WHERE request_id = $3 AND status = 'PENDING'",
        )
        .bind(status.as_str())
        .bind(time::now_utc())
        .bind(request_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<Request>, HistoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM session_requests WHERE request_id = $1",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_request).transpose()
    }

    async fn recent_requests(&self, limit: u32) -> Result<Vec<Request>, HistoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM session_requests ORDER BY created_at DESC, id DESC LIMIT $1",
            REQUEST_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_request).collect()
    }

    async fn delete_request(&self, request_id: &str) -> Result<bool, HistoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM session_responses WHERE request_id = $1")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM session_requests WHERE request_id = $1")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn pending_requests(&self) -> Result<Vec<Request>, HistoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM session_requests WHERE status = 'PENDING'
             ORDER BY created_at DESC, id DESC",
            REQUEST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_request).collect()
    }

    async fn record_agent(
        &self,
        registration: AgentRegistration,
    ) -> Result<AgentIdentity, HistoryError> {
        let agent = AgentIdentity::register(registration);

        sqlx::query(
            "INSERT INTO agent_sessions
                (agent_id, context, model, credits_spent, tool_calls, files_changed, created_at, last_activity)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&agent.agent_id)
        .bind(&agent.context)
        .bind(&agent.model)
        .bind(agent.credits_spent)
        .bind(agent.tool_calls)
        .bind(agent.files_changed)
        .bind(&agent.created_at)
        .bind(&agent.last_activity)
        .execute(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn find_agents(
        &self,
        hint: &str,
        limit: u32,
    ) -> Result<Vec<AgentIdentity>, HistoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agent_sessions
             WHERE context IS NOT NULL AND instr(lower(context), lower($1)) > 0
             ORDER BY last_activity DESC, id DESC LIMIT $2",
            AGENT_COLUMNS
        ))
        .bind(hint)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_agent).collect()
    }

    async fn recent_agents(&self, limit: u32) -> Result<Vec<AgentIdentity>, HistoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agent_sessions ORDER BY last_activity DESC, id DESC LIMIT $1",
            AGENT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_agent).collect()
    }

    async fn touch_agent(
        &self,
        agent_id: &str,
        context: Option<&str>,
    ) -> Result<Option<AgentIdentity>, HistoryError> {
        let Some(mut agent) = self.get_agent(agent_id).await? else {
            return Ok(None);
        };
        agent.touch(context);

        sqlx::query("UPDATE agent_sessions SET context = $1, last_activity = $2 WHERE agent_id = $3")
            .bind(&agent.context)
            .bind(&agent.last_activity)
            .bind(&agent.agent_id)
            .execute(&self.pool)
            .await?;

        Ok(Some(agent))
    }
}
