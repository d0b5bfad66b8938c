//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgExecutor, PgPool, Postgres, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::{ConsumeOutcome, DispatchStore};
use crate::{
    device::DeviceId,
    error::TokenRejection,
    models::{AckOutcome, AuthorizationToken, Command, TokenState},
};

/// Store backed by the `authorization_tokens` and `commands` tables
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store on top of an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> DatabaseResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        info!("Dispatch schema is up to date");
        Ok(())
    }

    /// Work out why a conditional consume matched no row
    async fn classify_rejection(&self, code: &str) -> DatabaseResult<TokenRejection> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM authorization_tokens WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::query)?;

        let rejection = match state {
            None => TokenRejection::NotFound,
            Some(state) => match state.parse::<TokenState>().map_err(DatabaseError::Decode)? {
                TokenState::Consumed => TokenRejection::AlreadyUsed,
                TokenState::New => TokenRejection::Expired,
            },
        };
        Ok(rejection)
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> DatabaseResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| DatabaseError::Decode(format!("{}: {}", name, e)))
}

fn token_from_row(row: &PgRow) -> DatabaseResult<AuthorizationToken> {
    let state: String = column(row, "state")?;

    Ok(AuthorizationToken {
        id: column(row, "id")?,
        code: column(row, "code")?,
        device_id: DeviceId::from_stored(column(row, "device_id")?),
        tenant_id: column(row, "tenant_id")?,
        state: state.parse().map_err(DatabaseError::Decode)?,
        issued_at: column(row, "issued_at")?,
        expires_at: column(row, "expires_at")?,
        consumed_at: column(row, "consumed_at")?,
    })
}

fn command_from_row(row: &PgRow) -> DatabaseResult<Command> {
    let action: String = column(row, "action")?;
    let status: String = column(row, "status")?;

    Ok(Command {
        id: column(row, "id")?,
        device_id: DeviceId::from_stored(column(row, "device_id")?),
        action: action.parse().map_err(DatabaseError::Decode)?,
        status: status.parse().map_err(DatabaseError::Decode)?,
        origin_token_id: column(row, "origin_token_id")?,
        created_at: column(row, "created_at")?,
        ack_at: column(row, "ack_at")?,
        ack_success: column(row, "ack_success")?,
    })
}

async fn insert_command<'e, E>(executor: E, command: &Command) -> DatabaseResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO commands (id, device_id, action, status, origin_token_id, created_at, ack_at, ack_success)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(command.id)
    .bind(command.device_id.as_str())
    .bind(command.action.as_str())
    .bind(command.status.as_str())
    .bind(command.origin_token_id)
    .bind(command.created_at)
    .bind(command.ack_at)
    .bind(command.ack_success)
    .execute(executor)
    .await
    .map_err(DatabaseError::query)?;

    Ok(())
}

#[async_trait]
impl DispatchStore for PgStore {
    async fn insert_token(&self, token: &AuthorizationToken) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authorization_tokens (id, code, device_id, tenant_id, state, issued_at, expires_at, consumed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(token.id)
        .bind(&token.code)
        .bind(token.device_id.as_str())
        .bind(&token.tenant_id)
        .bind(token.state.as_str())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.consumed_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::query)?;

        Ok(())
    }

    async fn find_token(&self, code: &str) -> DatabaseResult<Option<AuthorizationToken>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, device_id, tenant_id, state, issued_at, expires_at, consumed_at
            FROM authorization_tokens
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::query)?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn consume_token(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<ConsumeOutcome> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::query)?;

        // Compare-and-set on state: a concurrent consumer blocks on the row
        // lock and re-evaluates the predicate after this transaction commits.
        let claimed = sqlx::query(
            r#"
            UPDATE authorization_tokens
            SET state = 'CONSUMED', consumed_at = $2
            WHERE code = $1 AND state = 'NEW' AND expires_at > $2
            RETURNING id, code, device_id, tenant_id, state, issued_at, expires_at, consumed_at
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::query)?;

        let Some(row) = claimed else {
            tx.rollback().await.map_err(DatabaseError::query)?;
            return self
                .classify_rejection(code)
                .await
                .map(ConsumeOutcome::Rejected);
        };

        let token = token_from_row(&row)?;
        let command = Command::for_token(&token, now);
        insert_command(&mut *tx, &command).await?;

        tx.commit().await.map_err(DatabaseError::query)?;

        Ok(ConsumeOutcome::Consumed { token, command })
    }

    async fn enqueue_command(&self, command: &Command) -> DatabaseResult<()> {
        insert_command(&self.pool, command).await
    }

    async fn next_pending_command(&self, device_id: &DeviceId) -> DatabaseResult<Option<Command>> {
        let row = sqlx::query(
            r#"
            SELECT id, device_id, action, status, origin_token_id, created_at, ack_at, ack_success
            FROM commands
            WHERE device_id = $1 AND status = 'PENDING'
            ORDER BY created_at ASC, seq ASC
            LIMIT 1
            "#,
        )
        .bind(device_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::query)?;

        row.as_ref().map(command_from_row).transpose()
    }

    async fn find_command(&self, id: Uuid) -> DatabaseResult<Option<Command>> {
        let row = sqlx::query(
            r#"
            SELECT id, device_id, action, status, origin_token_id, created_at, ack_at, ack_success
            FROM commands
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::query)?;

        row.as_ref().map(command_from_row).transpose()
    }

    async fn acknowledge_command(
        &self,
        id: Uuid,
        success: bool,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<AckOutcome>> {
        let row = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'DELIVERED', ack_at = $2, ack_success = $3
            WHERE id = $1 AND status = 'PENDING'
            RETURNING id, device_id, action, status, origin_token_id, created_at, ack_at, ack_success
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(success)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::query)?;

        if let Some(row) = row {
            return Ok(Some(AckOutcome::Acknowledged(command_from_row(&row)?)));
        }

        Ok(self
            .find_command(id)
            .await?
            .map(AckOutcome::AlreadyAcknowledged))
    }

    async fn purge_expired_tokens(&self, cutoff: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM authorization_tokens
            WHERE state = 'NEW' AND expires_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::query)?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        common::database::health_check(&self.pool).await
    }
}
