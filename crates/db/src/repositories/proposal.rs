use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use cantina_core::domain::message::{Message, MessageId};
use cantina_core::domain::product::ProductId;
use cantina_core::domain::proposal::{
    ConsumptionMode, ProposalGroupId, ProposalId, WineProposal,
};
use cantina_core::domain::session::SessionId;

use super::session::{
    parse_decimal, parse_optional_decimal, parse_optional_timestamp, parse_timestamp, parse_u32,
};
use super::{ConfirmOutcome, ProposalRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProposalRepository {
    pool: DbPool,
}

impl SqlProposalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const PROPOSAL_COLUMNS: &str = "id,
    session_id,
    message_id,
    proposal_group_id,
    product_id,
    product_name,
    rank,
    reason,
    is_best,
    mode,
    journey_id,
    journey_position,
    price,
    margin,
    is_selected,
    selected_at,
    created_at";

#[async_trait::async_trait]
impl ProposalRepository for SqlProposalRepository {
    async fn record_assistant_turn(
        &self,
        message: Message,
        proposals: Vec<WineProposal>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

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
        .execute(&mut *tx)
        .await?;

        for proposal in &proposals {
            sqlx::query(
                "INSERT INTO wine_proposals (
                    id,
                    session_id,
                    message_id,
                    proposal_group_id,
                    product_id,
                    product_name,
                    rank,
                    reason,
                    is_best,
                    mode,
                    journey_id,
                    journey_position,
                    price,
                    margin,
                    is_selected,
                    selected_at,
                    created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&proposal.id.0)
            .bind(&proposal.session_id.0)
            .bind(&proposal.message_id.0)
            .bind(&proposal.proposal_group_id.0)
            .bind(&proposal.product_id.0)
            .bind(&proposal.product_name)
            .bind(i64::from(proposal.rank))
            .bind(proposal.reason.as_deref())
            .bind(proposal.is_best)
            .bind(proposal.mode.as_str())
            .bind(proposal.journey_id.as_deref())
            .bind(proposal.journey_position.map(i64::from))
            .bind(proposal.price.to_string())
            .bind(proposal.margin.map(|value| value.to_string()))
            .bind(proposal.is_selected)
            .bind(proposal.selected_at.map(|value| value.to_rfc3339()))
            .bind(proposal.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn rankings_for_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Vec<WineProposal>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS}
             FROM wine_proposals
             WHERE message_id = ?
             ORDER BY rank ASC"
        ))
        .bind(&message_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(proposal_from_row).collect()
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<WineProposal>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS}
             FROM wine_proposals
             WHERE session_id = ?
             ORDER BY created_at ASC, rank ASC"
        ))
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(proposal_from_row).collect()
    }

    async fn confirm(
        &self,
        session_id: &SessionId,
        product_ids: &[ProductId],
    ) -> Result<ConfirmOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = ConfirmOutcome::default();
        let selected_at = Utc::now().to_rfc3339();

        for product_id in product_ids {
            let row = sqlx::query(
                "SELECT
                    COUNT(*) AS proposal_count,
                    SUM(is_selected) AS selected_count
                 FROM wine_proposals
                 WHERE session_id = ? AND product_id = ?",
            )
            .bind(&session_id.0)
            .bind(&product_id.0)
            .fetch_one(&mut *tx)
            .await?;

            let proposal_count = row.try_get::<i64, _>("proposal_count")?;
            let selected_count = row.try_get::<Option<i64>, _>("selected_count")?.unwrap_or(0);

            if proposal_count == 0 {
                outcome.unknown.push(product_id.clone());
                continue;
            }
            if selected_count > 0 {
                outcome.already_selected.push(product_id.clone());
                continue;
            }

            // The most recent proposal of the product carries the selection
            // fact; earlier rounds stay untouched.
            sqlx::query(
                "UPDATE wine_proposals
                 SET is_selected = 1, selected_at = ?
                 WHERE id = (
                    SELECT id FROM wine_proposals
                    WHERE session_id = ? AND product_id = ?
                    ORDER BY rowid DESC
                    LIMIT 1
                 )",
            )
            .bind(&selected_at)
            .bind(&session_id.0)
            .bind(&product_id.0)
            .execute(&mut *tx)
            .await?;

            outcome.confirmed.push(product_id.clone());
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn confirm_journey(
        &self,
        session_id: &SessionId,
        journey_id: &str,
    ) -> Result<Option<ConfirmOutcome>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT product_id
             FROM wine_proposals
             WHERE session_id = ? AND journey_id = ?
             ORDER BY journey_position ASC",
        )
        .bind(&session_id.0)
        .bind(journey_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let product_ids = rows
            .into_iter()
            .map(|row| Ok(ProductId(row.try_get("product_id")?)))
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        self.confirm(session_id, &product_ids).await.map(Some)
    }
}

fn proposal_from_row(row: SqliteRow) -> Result<WineProposal, RepositoryError> {
    let mode_raw = row.try_get::<String, _>("mode")?;
    let mode = match mode_raw.as_str() {
        "single" => ConsumptionMode::Single,
        "journey" => ConsumptionMode::Journey,
        other => {
            return Err(RepositoryError::Decode(format!("unknown consumption mode `{other}`")));
        }
    };

    Ok(WineProposal {
        id: ProposalId(row.try_get("id")?),
        session_id: SessionId(row.try_get("session_id")?),
        message_id: MessageId(row.try_get("message_id")?),
        proposal_group_id: ProposalGroupId(row.try_get("proposal_group_id")?),
        product_id: ProductId(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        rank: parse_u32("rank", row.try_get("rank")?)?,
        reason: row.try_get("reason")?,
        is_best: row.try_get("is_best")?,
        mode,
        journey_id: row.try_get("journey_id")?,
        journey_position: row
            .try_get::<Option<i64>, _>("journey_position")?
            .map(|value| parse_u32("journey_position", value))
            .transpose()?,
        price: parse_decimal("price", &row.try_get::<String, _>("price")?)?,
        margin: parse_optional_decimal("margin", row.try_get("margin")?)?,
        is_selected: row.try_get("is_selected")?,
        selected_at: parse_optional_timestamp("selected_at", row.try_get("selected_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
