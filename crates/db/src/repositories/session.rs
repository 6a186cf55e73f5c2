use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use cantina_core::context::RecommendationContext;
use cantina_core::domain::session::{Session, SessionId, SessionStatus, SessionToken};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id,
    token,
    mode,
    context_json,
    status,
    message_count,
    budget_initial,
    bottles_target,
    rating,
    feedback,
    created_at,
    last_activity,
    ended_at";

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(session_from_row).transpose()
    }

    async fn find_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token = ?"))
            .bind(&token.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(session_from_row).transpose()
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let context_json = session
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("context encode failed: {error}")))?;

        sqlx::query(
            "INSERT INTO sessions (
                id,
                token,
                mode,
                context_json,
                status,
                message_count,
                budget_initial,
                bottles_target,
                rating,
                feedback,
                created_at,
                last_activity,
                ended_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                token = excluded.token,
                mode = excluded.mode,
                context_json = excluded.context_json,
                status = excluded.status,
                message_count = excluded.message_count,
                budget_initial = excluded.budget_initial,
                bottles_target = excluded.bottles_target,
                rating = excluded.rating,
                feedback = excluded.feedback,
                last_activity = excluded.last_activity,
                ended_at = excluded.ended_at",
        )
        .bind(&session.id.0)
        .bind(&session.token.0)
        .bind(&session.mode)
        .bind(context_json.as_deref())
        .bind(session.status.as_str())
        .bind(i64::from(session.message_count))
        .bind(session.budget_initial.map(|value| value.to_string()))
        .bind(session.bottles_target.map(i64::from))
        .bind(session.rating.map(i64::from))
        .bind(session.feedback.as_deref())
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_activity.to_rfc3339())
        .bind(session.ended_at.map(|value| value.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn session_from_row(row: SqliteRow) -> Result<Session, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = parse_status(&status_raw)?;

    let context = row
        .try_get::<Option<String>, _>("context_json")?
        .map(|raw| {
            serde_json::from_str::<RecommendationContext>(&raw).map_err(|error| {
                RepositoryError::Decode(format!("context decode failed: {error}"))
            })
        })
        .transpose()?;

    Ok(Session {
        id: SessionId(row.try_get("id")?),
        token: SessionToken(row.try_get("token")?),
        mode: row.try_get("mode")?,
        context,
        status,
        message_count: parse_u32("message_count", row.try_get("message_count")?)?,
        budget_initial: parse_optional_decimal(
            "budget_initial",
            row.try_get("budget_initial")?,
        )?,
        bottles_target: row
            .try_get::<Option<i64>, _>("bottles_target")?
            .map(|value| parse_u32("bottles_target", value))
            .transpose()?,
        rating: row
            .try_get::<Option<i64>, _>("rating")?
            .map(|value| {
                u8::try_from(value).map_err(|_| {
                    RepositoryError::Decode(format!("invalid value for `rating`: {value}"))
                })
            })
            .transpose()?,
        feedback: row.try_get("feedback")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        last_activity: parse_timestamp("last_activity", row.try_get("last_activity")?)?,
        ended_at: parse_optional_timestamp("ended_at", row.try_get("ended_at")?)?,
    })
}

fn parse_status(value: &str) -> Result<SessionStatus, RepositoryError> {
    match value {
        "created" => Ok(SessionStatus::Created),
        "active" => Ok(SessionStatus::Active),
        "ended" => Ok(SessionStatus::Ended),
        other => Err(RepositoryError::Decode(format!("unknown session status `{other}`"))),
    }
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, &raw)).transpose()
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
