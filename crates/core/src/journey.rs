//! Tasting-journey sequencing.
//!
//! A journey is an ordered path of one wine per course slot. The generation
//! collaborator proposes candidate wines per course; the sequencer pins them
//! to slots and enforces that the path length matches the declared bottle
//! target. Several alternative journeys may be offered in the same turn, each
//! under its own id, and the guest commits to exactly one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::errors::DomainError;

/// One candidate wine for a course slot, in course order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyCandidate {
    pub product_id: ProductId,
    pub reason: Option<String>,
}

/// Wine #`position` of N along the path. Positions start at 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneySlot {
    pub position: u32,
    pub product_id: ProductId,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyPlan {
    pub id: String,
    pub label: Option<String>,
    pub slots: Vec<JourneySlot>,
}

impl JourneyPlan {
    /// Pin candidates to slots in course order. The candidate list must fill
    /// the declared bottle target exactly, neither short nor long.
    pub fn sequence(
        label: Option<String>,
        bottles_target: u32,
        candidates: Vec<JourneyCandidate>,
    ) -> Result<Self, DomainError> {
        if candidates.len() != bottles_target as usize {
            return Err(DomainError::InvariantViolation(format!(
                "journey requires {bottles_target} slots, got {}",
                candidates.len()
            )));
        }

        let slots = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| JourneySlot {
                position: index as u32 + 1,
                product_id: candidate.product_id,
                reason: candidate.reason,
            })
            .collect();

        Ok(Self { id: Uuid::new_v4().to_string(), label, slots })
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.slots.iter().map(|slot| slot.product_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{JourneyCandidate, JourneyPlan};
    use crate::domain::product::ProductId;
    use crate::errors::DomainError;

    fn candidate(id: &str) -> JourneyCandidate {
        JourneyCandidate { product_id: ProductId(id.to_owned()), reason: None }
    }

    #[test]
    fn sequence_assigns_positions_in_course_order() {
        let plan = JourneyPlan::sequence(
            Some("Percorso classico".to_owned()),
            3,
            vec![candidate("p-1"), candidate("p-2"), candidate("p-3")],
        )
        .expect("three candidates for three slots");

        let positions: Vec<u32> = plan.slots.iter().map(|slot| slot.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(plan.product_ids(), vec![
            ProductId("p-1".to_owned()),
            ProductId("p-2".to_owned()),
            ProductId("p-3".to_owned()),
        ]);
    }

    #[test]
    fn sequence_rejects_short_or_long_paths() {
        let short = JourneyPlan::sequence(None, 3, vec![candidate("p-1")]);
        assert!(matches!(short, Err(DomainError::InvariantViolation(_))));

        let long = JourneyPlan::sequence(None, 1, vec![candidate("p-1"), candidate("p-2")]);
        assert!(long.is_err());
    }

    #[test]
    fn alternative_journeys_get_distinct_ids() {
        let first = JourneyPlan::sequence(None, 1, vec![candidate("p-1")]).expect("one slot");
        let second = JourneyPlan::sequence(None, 1, vec![candidate("p-2")]).expect("one slot");
        assert_ne!(first.id, second.id);
    }
}
