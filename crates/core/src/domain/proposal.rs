use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::message::MessageId;
use crate::domain::product::{Product, ProductId};
use crate::domain::session::SessionId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

/// Groups every proposal persisted for one assistant turn. Rankings reads
/// resolve a message to its group and return the rows in rank order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalGroupId(pub String);

impl ProposalGroupId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionMode {
    Single,
    Journey,
}

impl ConsumptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Journey => "journey",
        }
    }
}

/// One ranked wine inside a proposal group.
///
/// `price` and `margin` are snapshots taken at proposal time. Catalog edits
/// after the fact never alter what the ledger says was offered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WineProposal {
    pub id: ProposalId,
    pub session_id: SessionId,
    pub message_id: MessageId,
    pub proposal_group_id: ProposalGroupId,
    pub product_id: ProductId,
    pub product_name: String,
    pub rank: u32,
    pub reason: Option<String>,
    pub is_best: bool,
    pub mode: ConsumptionMode,
    pub journey_id: Option<String>,
    pub journey_position: Option<u32>,
    pub price: Decimal,
    pub margin: Option<Decimal>,
    pub is_selected: bool,
    pub selected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WineProposal {
    pub fn single(
        session_id: SessionId,
        message_id: MessageId,
        group_id: ProposalGroupId,
        product: &Product,
        rank: u32,
        reason: Option<String>,
        is_best: bool,
    ) -> Self {
        Self::build(
            session_id,
            message_id,
            group_id,
            product,
            rank,
            reason,
            is_best,
            ConsumptionMode::Single,
            None,
            None,
        )
    }

    pub fn journey_slot(
        session_id: SessionId,
        message_id: MessageId,
        group_id: ProposalGroupId,
        product: &Product,
        rank: u32,
        reason: Option<String>,
        is_best: bool,
        journey_id: String,
        journey_position: u32,
    ) -> Self {
        Self::build(
            session_id,
            message_id,
            group_id,
            product,
            rank,
            reason,
            is_best,
            ConsumptionMode::Journey,
            Some(journey_id),
            Some(journey_position),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        session_id: SessionId,
        message_id: MessageId,
        group_id: ProposalGroupId,
        product: &Product,
        rank: u32,
        reason: Option<String>,
        is_best: bool,
        mode: ConsumptionMode,
        journey_id: Option<String>,
        journey_position: Option<u32>,
    ) -> Self {
        Self {
            id: ProposalId(Uuid::new_v4().to_string()),
            session_id,
            message_id,
            proposal_group_id: group_id,
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            rank,
            reason,
            is_best,
            mode,
            journey_id,
            journey_position,
            price: product.price,
            margin: product.margin,
            is_selected: false,
            selected_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_selected(&mut self) {
        if !self.is_selected {
            self.is_selected = true;
            self.selected_at = Some(Utc::now());
        }
    }
}
