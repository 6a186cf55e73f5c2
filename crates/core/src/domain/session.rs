use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::RecommendationContext;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Opaque client-visible handle. All session-scoped API calls are keyed by
/// this token rather than any authenticated identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

/// One guest interaction episode, from QR scan to feedback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub token: SessionToken,
    pub mode: String,
    pub context: Option<RecommendationContext>,
    pub status: SessionStatus,
    pub message_count: u32,
    pub budget_initial: Option<Decimal>,
    pub bottles_target: Option<u32>,
    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new_b2c() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId(Uuid::new_v4().to_string()),
            token: SessionToken::mint(),
            mode: "b2c".to_owned(),
            context: None,
            status: SessionStatus::Created,
            message_count: 0,
            budget_initial: None,
            bottles_target: None,
            rating: None,
            feedback: None,
            created_at: now,
            last_activity: now,
            ended_at: None,
        }
    }

    /// Lifecycle is strictly monotonic: created -> active -> ended.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::Created, SessionStatus::Active)
                | (SessionStatus::Created, SessionStatus::Ended)
                | (SessionStatus::Active, SessionStatus::Ended)
        )
    }

    pub fn transition_to(&mut self, next: SessionStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            if next == SessionStatus::Ended {
                self.ended_at = Some(Utc::now());
            }
            return Ok(());
        }

        Err(DomainError::InvalidSessionTransition { from: self.status, to: next })
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn increment_message_count(&mut self) {
        self.message_count = self.message_count.saturating_add(1);
    }

    /// Adopt a frozen context: snapshot it and lift the declared budget and
    /// bottle target into their dedicated analytics columns.
    pub fn declare_context(&mut self, context: RecommendationContext) {
        self.budget_initial = context.budget;
        self.bottles_target = context.bottles_target;
        self.context = Some(context);
    }

    /// Record the one-and-only feedback pair and end the session.
    pub fn record_feedback(
        &mut self,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<(), DomainError> {
        if self.rating.is_some() {
            return Err(DomainError::FeedbackAlreadyRecorded { session_id: self.id.0.clone() });
        }
        if !(1..=5).contains(&rating) {
            return Err(DomainError::InvariantViolation(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }

        self.rating = Some(rating);
        self.feedback = feedback.filter(|text| !text.trim().is_empty());
        if self.status != SessionStatus::Ended {
            self.transition_to(SessionStatus::Ended)?;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Created | SessionStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionStatus};
    use crate::context::{ContextBuilder, Dish, JourneyPreference, WineTypePreference};
    use crate::errors::DomainError;
    use rust_decimal::Decimal;

    fn context_fixture() -> crate::context::RecommendationContext {
        ContextBuilder::new()
            .dish(Dish::named("Tagliata di manzo"))
            .guest_count(4)
            .wine_type(WineTypePreference::Red)
            .journey_preference(JourneyPreference::Single)
            .budget(Some(Decimal::new(3_000, 2)))
            .build()
            .expect("valid context")
    }

    #[test]
    fn lifecycle_is_monotonic() {
        let mut session = Session::new_b2c();
        session.transition_to(SessionStatus::Active).expect("created -> active");
        session.transition_to(SessionStatus::Ended).expect("active -> ended");

        let error = session
            .transition_to(SessionStatus::Active)
            .expect_err("ended sessions never reactivate");
        assert!(matches!(error, DomainError::InvalidSessionTransition { .. }));
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn declaring_context_lifts_budget_and_bottle_target() {
        let mut session = Session::new_b2c();
        session.declare_context(context_fixture());

        assert_eq!(session.budget_initial, Some(Decimal::new(3_000, 2)));
        assert!(session.context.is_some());
    }

    #[test]
    fn feedback_is_recorded_once() {
        let mut session = Session::new_b2c();
        session.transition_to(SessionStatus::Active).expect("activate");

        session.record_feedback(5, Some("Ottima esperienza".to_owned())).expect("first feedback");
        assert_eq!(session.status, SessionStatus::Ended);
        assert_eq!(session.rating, Some(5));

        let error = session.record_feedback(1, None).expect_err("second feedback must fail");
        assert!(matches!(error, DomainError::FeedbackAlreadyRecorded { .. }));
        assert_eq!(session.rating, Some(5), "first rating survives the rejected retry");
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let mut session = Session::new_b2c();
        session.transition_to(SessionStatus::Active).expect("activate");

        let error = session.record_feedback(6, None).expect_err("rating above 5");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
        assert!(session.rating.is_none());
    }

    #[test]
    fn blank_feedback_text_is_dropped() {
        let mut session = Session::new_b2c();
        session.transition_to(SessionStatus::Active).expect("activate");
        session.record_feedback(4, Some("   ".to_owned())).expect("feedback");
        assert!(session.feedback.is_none());
    }
}
