//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, the embedded schema
//! migration, and [`DbClient`], which implements the task and user store
//! capabilities.
//!
//! Every statement is built from fixed SQL fragments with `$n` placeholders.
//! Caller-supplied values only ever travel as bind parameters.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use std::time::Duration;
use tasklane_core::{
    Activity, ListingQuery, NewUser, SortColumn, StoreError, StoreResult, Task, TaskDraft, TaskId,
    TaskStatus, User, UserId,
};
use tasklane_storage::{MutationOutcome, RowGuard, TaskMutation, TaskQuery, TaskStore, UserStore};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

/// Schema applied by [`run_migrations`].
const INIT_MIGRATION: &str = include_str!("../migrations/0001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        Self {
            host: lookup("TASKLANE_DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: lookup("TASKLANE_DB_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: lookup("TASKLANE_DB_NAME").unwrap_or_else(|| "tasklane".to_string()),
            user: lookup("TASKLANE_DB_USER").unwrap_or_else(|| "postgres".to_string()),
            password: lookup("TASKLANE_DB_PASSWORD").unwrap_or_default(),
            max_size: lookup("TASKLANE_DB_POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                lookup("TASKLANE_DB_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

/// Apply the embedded schema.
pub async fn run_migrations(pool: &Pool) -> ApiResult<()> {
    let conn = pool.get().await?;
    conn.batch_execute(INIT_MIGRATION).await?;
    tracing::info!("Database schema applied");
    Ok(())
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(operation: &str) -> impl FnOnce(PoolError) -> StoreError + '_ {
    move |e| StoreError::unavailable(operation, e)
}

fn pg_error(operation: &str) -> impl FnOnce(tokio_postgres::Error) -> StoreError + '_ {
    move |e| {
        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            let field = e
                .as_db_error()
                .and_then(|db| db.constraint())
                .map(|c| {
                    c.trim_start_matches("users_")
                        .trim_end_matches("_key")
                        .to_string()
                })
                .unwrap_or_else(|| "email".to_string());
            return StoreError::Duplicate { field };
        }
        StoreError::unavailable(operation, e)
    }
}

fn corrupt(table: &str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// LISTING SQL
// ============================================================================

const TASK_COLUMNS: &str = "id, user_id, title, description, status, due_at, version, \
                            is_deleted, created_at, updated_at, deleted_at";

const USER_COLUMNS: &str =
    "id, email, password_hash, active, activation_token, verified_at, created_at";

/// A bind parameter for a listing statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Date(NaiveDate),
    BigInt(i64),
}

impl SqlParam {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            SqlParam::Text(v) => v,
            SqlParam::Date(v) => v,
            SqlParam::BigInt(v) => v,
        }
    }
}

/// A parameterized listing statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Build the listing query for `query`.
///
/// Filter values become bind parameters; the sort column and direction come
/// from closed enums, so no caller text reaches the SQL string.
pub fn listing_sql(query: &ListingQuery) -> ListingStatement {
    let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE is_deleted = FALSE");
    let mut params = Vec::new();

    let mut push = |fragment: &str, param: SqlParam, sql: &mut String| {
        params.push(param);
        sql.push_str(&format!(" AND {fragment} ${}", params.len()));
    };

    if let Some(status) = query.status {
        push("status =", SqlParam::Text(status.as_db_str().to_string()), &mut sql);
    }
    if let Some(after) = query.due_after {
        push("due_at >=", SqlParam::Date(after), &mut sql);
    }
    if let Some(before) = query.due_before {
        push("due_at <=", SqlParam::Date(before), &mut sql);
    }

    let direction = query.direction.as_sql();
    match query.sort_by {
        SortColumn::Id => sql.push_str(&format!(" ORDER BY id {direction}")),
        column => sql.push_str(&format!(
            " ORDER BY {} {direction}, id {direction}",
            column.as_column()
        )),
    }

    params.push(SqlParam::BigInt(query.limit()));
    sql.push_str(&format!(" LIMIT ${}", params.len()));
    params.push(SqlParam::BigInt(query.offset()));
    sql.push_str(&format!(" OFFSET ${}", params.len()));

    ListingStatement { sql, params }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn task_from_row(row: &Row) -> StoreResult<Task> {
    let status: String = row.try_get("status").map_err(|e| corrupt("tasks", e))?;
    let version: i32 = row.try_get("version").map_err(|e| corrupt("tasks", e))?;
    Ok(Task {
        id: TaskId::new(row.try_get("id").map_err(|e| corrupt("tasks", e))?),
        user_id: UserId::new(row.try_get("user_id").map_err(|e| corrupt("tasks", e))?),
        title: row.try_get("title").map_err(|e| corrupt("tasks", e))?,
        description: row.try_get("description").map_err(|e| corrupt("tasks", e))?,
        status: TaskStatus::from_db_str(&status).map_err(|e| corrupt("tasks", e))?,
        due_at: row.try_get("due_at").map_err(|e| corrupt("tasks", e))?,
        version: u32::try_from(version).map_err(|e| corrupt("tasks", e))?,
        is_deleted: row.try_get("is_deleted").map_err(|e| corrupt("tasks", e))?,
        created_at: row.try_get("created_at").map_err(|e| corrupt("tasks", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| corrupt("tasks", e))?,
        deleted_at: row.try_get("deleted_at").map_err(|e| corrupt("tasks", e))?,
    })
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    Ok(User {
        id: UserId::new(row.try_get("id").map_err(|e| corrupt("users", e))?),
        email: row.try_get("email").map_err(|e| corrupt("users", e))?,
        password_hash: row.try_get("password_hash").map_err(|e| corrupt("users", e))?,
        active: row.try_get("active").map_err(|e| corrupt("users", e))?,
        activation_token: row.try_get("activation_token").map_err(|e| corrupt("users", e))?,
        verified_at: row.try_get("verified_at").map_err(|e| corrupt("users", e))?,
        created_at: row.try_get("created_at").map_err(|e| corrupt("users", e))?,
    })
}

fn version_from_row(row: &Row) -> StoreResult<u32> {
    let version: i32 = row.try_get(0).map_err(|e| corrupt("tasks", e))?;
    u32::try_from(version).map_err(|e| corrupt("tasks", e))
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// Postgres-backed task and user store.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self, operation: &str) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error(operation))
    }
}

#[async_trait]
impl TaskStore for DbClient {
    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        let conn = self.get_conn("query_tasks").await?;
        let rows = match query {
            TaskQuery::ById(id) => {
                let sql =
                    format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND is_deleted = FALSE");
                conn.query(sql.as_str(), &[&id.get()])
                    .await
                    .map_err(pg_error("query_task_by_id"))?
            }
            TaskQuery::Listing(listing) => {
                let statement = listing_sql(listing);
                let params: Vec<&(dyn ToSql + Sync)> =
                    statement.params.iter().map(SqlParam::as_sql).collect();
                conn.query(statement.sql.as_str(), &params)
                    .await
                    .map_err(pg_error("query_task_listing"))?
            }
        };
        rows.iter().map(task_from_row).collect()
    }

    async fn insert(&self, owner: UserId, draft: &TaskDraft) -> StoreResult<Task> {
        let conn = self.get_conn("insert_task").await?;
        let sql = format!(
            "INSERT INTO tasks (user_id, title, description, status, due_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {TASK_COLUMNS}"
        );
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &owner.get(),
                    &draft.title,
                    &draft.description,
                    &draft.status.as_db_str(),
                    &draft.due_at,
                ],
            )
            .await
            .map_err(pg_error("insert_task"))?;
        task_from_row(&row)
    }

    async fn update(
        &self,
        guard: &RowGuard,
        mutation: &TaskMutation,
    ) -> StoreResult<MutationOutcome> {
        let conn = self.get_conn("update_task").await?;
        let (id, owner) = (guard.id.get(), guard.owner.get());
        let rows = match mutation {
            TaskMutation::Update(changes) => {
                // due_at is only written when supplied.
                let base = "UPDATE tasks SET title = $1, description = $2, status = $3, \
                            due_at = COALESCE($4, due_at), updated_at = NOW(), \
                            version = version + 1 \
                            WHERE id = $5 AND user_id = $6 AND is_deleted = FALSE";
                let status = changes.status.as_db_str();
                let result = match changes.expected_version {
                    Some(expected) => {
                        // Versions are stored as INT4; a larger guard matches no row.
                        let Ok(expected) = i32::try_from(expected) else {
                            return Ok(MutationOutcome::none());
                        };
                        let sql = format!("{base} AND version = $7 RETURNING version");
                        conn.query(
                            sql.as_str(),
                            &[
                                &changes.title,
                                &changes.description,
                                &status,
                                &changes.due_at,
                                &id,
                                &owner,
                                &expected,
                            ],
                        )
                        .await
                    }
                    None => {
                        let sql = format!("{base} RETURNING version");
                        conn.query(
                            sql.as_str(),
                            &[
                                &changes.title,
                                &changes.description,
                                &status,
                                &changes.due_at,
                                &id,
                                &owner,
                            ],
                        )
                        .await
                    }
                };
                result.map_err(pg_error("update_task"))?
            }
            TaskMutation::SoftDelete { at } => conn
                .query(
                    "UPDATE tasks SET is_deleted = TRUE, deleted_at = $1 \
                     WHERE id = $2 AND user_id = $3 AND is_deleted = FALSE \
                     RETURNING version",
                    &[at, &id, &owner],
                )
                .await
                .map_err(pg_error("soft_delete_task"))?,
        };

        match rows.first() {
            Some(row) => Ok(MutationOutcome {
                rows_affected: rows.len() as u64,
                version: Some(version_from_row(row)?),
            }),
            None => Ok(MutationOutcome::none()),
        }
    }

    async fn find_owned(&self, guard: &RowGuard) -> StoreResult<Option<Task>> {
        let conn = self.get_conn("find_owned_task").await?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE id = $1 AND user_id = $2 AND is_deleted = FALSE"
        );
        let row = conn
            .query_opt(sql.as_str(), &[&guard.id.get(), &guard.owner.get()])
            .await
            .map_err(pg_error("find_owned_task"))?;
        row.as_ref().map(task_from_row).transpose()
    }
}

#[async_trait]
impl UserStore for DbClient {
    async fn insert_user(&self, user: &NewUser) -> StoreResult<User> {
        let conn = self.get_conn("insert_user").await?;
        let sql = format!(
            "INSERT INTO users (email, password_hash, activation_token) \
             VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let row = conn
            .query_one(
                sql.as_str(),
                &[&user.email, &user.password_hash, &user.activation_token],
            )
            .await
            .map_err(pg_error("insert_user"))?;
        user_from_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let conn = self.get_conn("find_user_by_email").await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = conn
            .query_opt(sql.as_str(), &[&email])
            .await
            .map_err(pg_error("find_user_by_email"))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn activate_user(&self, token: &str) -> StoreResult<Option<UserId>> {
        let conn = self.get_conn("activate_user").await?;
        let row = conn
            .query_opt(
                "UPDATE users SET active = TRUE, activation_token = NULL, verified_at = NOW() \
                 WHERE activation_token = $1 RETURNING id",
                &[&token],
            )
            .await
            .map_err(pg_error("activate_user"))?;
        row.map(|r| r.try_get::<_, i64>(0).map(UserId::new))
            .transpose()
            .map_err(|e| corrupt("users", e))
    }

    async fn record_activity(&self, user: UserId, activity: Activity) -> StoreResult<()> {
        let mut conn = self.get_conn("record_activity").await?;
        let tx = conn
            .transaction()
            .await
            .map_err(pg_error("record_activity"))?;
        let activity = activity.as_db_str();
        tx.execute(
            "UPDATE user_activity_log SET superseded = TRUE, updated_at = NOW() \
             WHERE user_id = $1 AND activity = $2 AND superseded = FALSE",
            &[&user.get(), &activity],
        )
        .await
        .map_err(pg_error("record_activity"))?;
        tx.execute(
            "INSERT INTO user_activity_log (user_id, activity) VALUES ($1, $2)",
            &[&user.get(), &activity],
        )
        .await
        .map_err(pg_error("record_activity"))?;
        tx.commit().await.map_err(pg_error("record_activity"))
    }

    async fn record_session(&self, user: UserId, token_digest: &str) -> StoreResult<()> {
        let conn = self.get_conn("record_session").await?;
        conn.execute(
            "INSERT INTO sessions (user_id, token_digest) VALUES ($1, $2)",
            &[&user.get(), &token_digest],
        )
        .await
        .map_err(pg_error("record_session"))?;
        Ok(())
    }
}
