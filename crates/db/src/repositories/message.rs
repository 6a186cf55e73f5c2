use sqlx::{sqlite::SqliteRow, Row};

use cantina_core::domain::message::{Message, MessageId, MessageKind, MessageRole};
use cantina_core::domain::session::SessionId;

use super::session::parse_timestamp;
use super::{HistoryVisibility, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn append(&self, message: Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (id, session_id, role, kind, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.session_id.0)
        .bind(message.role.as_str())
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, session_id, role, kind, content, created_at
             FROM messages
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
        visibility: HistoryVisibility,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError> {
        // Insertion order is the transcript order; the limit keeps the newest
        // turns and the outer sort restores chronology.
        let rows = match visibility {
            HistoryVisibility::VisibleOnly => {
                sqlx::query(
                    "SELECT id, session_id, role, kind, content, created_at
                     FROM (
                        SELECT rowid AS seq, id, session_id, role, kind, content, created_at
                        FROM messages
                        WHERE session_id = ? AND kind = 'standard'
                        ORDER BY seq DESC
                        LIMIT ?
                     )
                     ORDER BY seq ASC",
                )
                .bind(&session_id.0)
                .bind(limit.map_or(i64::MAX, i64::from))
                .fetch_all(&self.pool)
                .await?
            }
            HistoryVisibility::IncludeHidden => {
                sqlx::query(
                    "SELECT id, session_id, role, kind, content, created_at
                     FROM (
                        SELECT rowid AS seq, id, session_id, role, kind, content, created_at
                        FROM messages
                        WHERE session_id = ?
                        ORDER BY seq DESC
                        LIMIT ?
                     )
                     ORDER BY seq ASC",
                )
                .bind(&session_id.0)
                .bind(limit.map_or(i64::MAX, i64::from))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(message_from_row).collect()
    }
}

pub(crate) fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = match role_raw.as_str() {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        other => {
            return Err(RepositoryError::Decode(format!("unknown message role `{other}`")));
        }
    };

    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = match kind_raw.as_str() {
        "standard" => MessageKind::Standard,
        "initial_context" => MessageKind::InitialContext,
        other => {
            return Err(RepositoryError::Decode(format!("unknown message kind `{other}`")));
        }
    };

    Ok(Message {
        id: MessageId(row.try_get("id")?),
        session_id: SessionId(row.try_get("session_id")?),
        role,
        kind,
        content: row.try_get("content")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use cantina_core::domain::message::Message;
    use cantina_core::domain::session::Session;

    use super::SqlMessageRepository;
    use crate::migrations;
    use crate::repositories::{
        HistoryVisibility, MessageRepository, SessionRepository, SqlSessionRepository,
    };
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn hidden_turns_are_excluded_from_visible_history() {
        let pool = setup_pool().await;
        let session = seeded_session(&pool).await;
        let repo = SqlMessageRepository::new(pool.clone());

        let briefing = Message::initial_context(session.id.clone(), "briefing turn");
        let question = Message::user(session.id.clone(), "something light with the branzino?");
        let answer = Message::assistant(session.id.clone(), "A Vermentino would suit it well.");

        repo.append(briefing.clone()).await.expect("append briefing");
        repo.append(question.clone()).await.expect("append question");
        repo.append(answer.clone()).await.expect("append answer");

        let visible = repo
            .list_for_session(&session.id, HistoryVisibility::VisibleOnly, None)
            .await
            .expect("visible history");
        assert_eq!(visible, vec![question.clone(), answer.clone()]);

        let full = repo
            .list_for_session(&session.id, HistoryVisibility::IncludeHidden, None)
            .await
            .expect("full history");
        assert_eq!(full, vec![briefing, question, answer]);

        pool.close().await;
    }

    #[tokio::test]
    async fn history_limit_keeps_the_newest_turns_in_order() {
        let pool = setup_pool().await;
        let session = seeded_session(&pool).await;
        let repo = SqlMessageRepository::new(pool.clone());

        let mut appended = Vec::new();
        for index in 0..5 {
            let message = Message::user(session.id.clone(), format!("turn {index}"));
            repo.append(message.clone()).await.expect("append");
            appended.push(message);
        }

        let capped = repo
            .list_for_session(&session.id, HistoryVisibility::IncludeHidden, Some(2))
            .await
            .expect("capped history");

        assert_eq!(capped, appended[3..].to_vec());

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn seeded_session(pool: &DbPool) -> Session {
        let session = Session::new_b2c();
        SqlSessionRepository::new(pool.clone()).save(session.clone()).await.expect("save session");
        session
    }
}
