pub mod bottles;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod journey;

pub use bottles::{bottles_needed, bottles_needed_with_courses};
pub use context::{ContextBuilder, Dish, JourneyPreference, RecommendationContext, WineTypePreference};
pub use domain::message::{Message, MessageId, MessageKind, MessageRole};
pub use domain::product::{Product, ProductId, WineType};
pub use domain::proposal::{ConsumptionMode, ProposalGroupId, ProposalId, WineProposal};
pub use domain::session::{Session, SessionId, SessionStatus, SessionToken};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use journey::{JourneyCandidate, JourneyPlan, JourneySlot};
