use tracing::warn;

use cantina_core::context::{JourneyPreference, RecommendationContext};
use cantina_core::domain::message::Message;
use cantina_core::domain::product::Product;
use cantina_core::domain::proposal::{ProposalGroupId, WineProposal};
use cantina_core::domain::session::Session;
use cantina_core::errors::ApplicationError;
use cantina_core::journey::{JourneyCandidate, JourneyPlan};

use crate::llm::{
    GenerationClient, GenerationError, GenerationOutput, GenerationRequest, ProposedWine,
};

/// Everything one assistant turn produced, grouped by consumption mode.
#[derive(Clone, Debug, PartialEq)]
pub enum ProposalBatch {
    Single {
        group_id: ProposalGroupId,
        proposals: Vec<WineProposal>,
    },
    Journey {
        group_id: ProposalGroupId,
        journeys: Vec<JourneyPlan>,
        proposals: Vec<WineProposal>,
    },
}

impl ProposalBatch {
    pub fn group_id(&self) -> &ProposalGroupId {
        match self {
            Self::Single { group_id, .. } | Self::Journey { group_id, .. } => group_id,
        }
    }

    pub fn proposals(&self) -> &[WineProposal] {
        match self {
            Self::Single { proposals, .. } | Self::Journey { proposals, .. } => proposals,
        }
    }

    pub fn into_proposals(self) -> Vec<WineProposal> {
        match self {
            Self::Single { proposals, .. } | Self::Journey { proposals, .. } => proposals,
        }
    }
}

/// One fully validated assistant turn, ready to be persisted atomically.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalTurn {
    pub message: Message,
    pub batch: ProposalBatch,
}

pub struct Orchestrator<C> {
    client: C,
}

impl<C> Orchestrator<C>
where
    C: GenerationClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Delegate to the generation collaborator and map its raw output into a
    /// well-formed proposal group. Ranking is accepted as given; structure is
    /// not: duplicate or non-contiguous ranks and unresolved product
    /// references reject the whole turn.
    pub async fn propose(
        &self,
        session: &Session,
        context: &RecommendationContext,
        history: Vec<Message>,
        candidates: Vec<Product>,
    ) -> Result<ProposalTurn, ApplicationError> {
        let request = GenerationRequest {
            context: context.clone(),
            history,
            candidates: candidates.clone(),
        };

        let output = self.client.generate(&request).await.map_err(|error| match error {
            GenerationError::Unavailable(message) => {
                ApplicationError::GenerationUnavailable(message)
            }
            GenerationError::Malformed(message) => {
                self.reject(session, &message);
                ApplicationError::MalformedGeneration(message)
            }
        })?;

        let message = Message::assistant(session.id.clone(), output.prose.clone());
        let group_id = ProposalGroupId::mint();

        let batch = match context.journey_preference {
            JourneyPreference::Single => {
                self.map_single_batch(session, &message, group_id, &output, &candidates)?
            }
            JourneyPreference::Journey => {
                self.map_journey_batch(session, &message, group_id, context, &output, &candidates)?
            }
        };

        Ok(ProposalTurn { message, batch })
    }

    fn map_single_batch(
        &self,
        session: &Session,
        message: &Message,
        group_id: ProposalGroupId,
        output: &GenerationOutput,
        candidates: &[Product],
    ) -> Result<ProposalBatch, ApplicationError> {
        let mut wines = output.wines.clone();
        wines.sort_by_key(|wine| wine.rank);
        self.validate_rank_contiguity(session, &wines)?;

        let mut proposals = Vec::with_capacity(wines.len());
        for wine in &wines {
            let product = self.resolve_product(session, &wine.product_ref, candidates)?;
            let is_best = wine.best || wine.rank == 1;
            proposals.push(WineProposal::single(
                session.id.clone(),
                message.id.clone(),
                group_id.clone(),
                product,
                wine.rank,
                wine.reason.clone(),
                is_best,
            ));
        }

        Ok(ProposalBatch::Single { group_id, proposals })
    }

    fn map_journey_batch(
        &self,
        session: &Session,
        message: &Message,
        group_id: ProposalGroupId,
        context: &RecommendationContext,
        output: &GenerationOutput,
        candidates: &[Product],
    ) -> Result<ProposalBatch, ApplicationError> {
        let bottles_target = context.bottles_target.ok_or_else(|| {
            ApplicationError::MalformedGeneration(
                "journey mode requires a bottle target on the context".to_owned(),
            )
        })?;

        if output.journeys.is_empty() {
            let reason = "journey mode output carried no journeys".to_owned();
            self.reject(session, &reason);
            return Err(ApplicationError::MalformedGeneration(reason));
        }

        let mut journeys = Vec::with_capacity(output.journeys.len());
        let mut proposals = Vec::new();
        // Ranks run across all alternative journeys in the group so the
        // group-wide 1..N invariant holds.
        let mut rank = 0u32;

        for proposed in &output.journeys {
            let mut slots = Vec::with_capacity(proposed.slots.len());
            for slot in &proposed.slots {
                let product = self.resolve_product(session, &slot.product_ref, candidates)?;
                slots.push((product.clone(), slot.reason.clone()));
            }

            let plan = JourneyPlan::sequence(
                proposed.label.clone(),
                bottles_target,
                slots.iter()
                    .map(|(product, reason)| JourneyCandidate {
                        product_id: product.id.clone(),
                        reason: reason.clone(),
                    })
                    .collect(),
            )
            .map_err(|error| {
                let reason = error.to_string();
                self.reject(session, &reason);
                ApplicationError::MalformedGeneration(reason)
            })?;

            for (position, (product, reason)) in slots.iter().enumerate() {
                rank += 1;
                proposals.push(WineProposal::journey_slot(
                    session.id.clone(),
                    message.id.clone(),
                    group_id.clone(),
                    product,
                    rank,
                    reason.clone(),
                    rank == 1,
                    plan.id.clone(),
                    position as u32 + 1,
                ));
            }

            journeys.push(plan);
        }

        Ok(ProposalBatch::Journey { group_id, journeys, proposals })
    }

    fn validate_rank_contiguity(
        &self,
        session: &Session,
        wines: &[ProposedWine],
    ) -> Result<(), ApplicationError> {
        for (index, wine) in wines.iter().enumerate() {
            let expected = index as u32 + 1;
            if wine.rank != expected {
                let reason = format!(
                    "proposal ranks must run 1..{} without gaps or duplicates, found rank {} at position {expected}",
                    wines.len(),
                    wine.rank
                );
                self.reject(session, &reason);
                return Err(ApplicationError::MalformedGeneration(reason));
            }
        }
        Ok(())
    }

    fn resolve_product<'a>(
        &self,
        session: &Session,
        product_ref: &str,
        candidates: &'a [Product],
    ) -> Result<&'a Product, ApplicationError> {
        let resolved = candidates.iter().find(|product| {
            product.id.0 == product_ref || product.name.eq_ignore_ascii_case(product_ref)
        });

        resolved.ok_or_else(|| {
            let reason = format!("generation referenced unknown product `{product_ref}`");
            self.reject(session, &reason);
            ApplicationError::MalformedGeneration(reason)
        })
    }

    fn reject(&self, session: &Session, reason: &str) {
        warn!(
            event_name = "generation.output_rejected",
            session_id = %session.id.0,
            reason,
            "rejecting malformed generation output"
        );
    }
}
