use async_trait::async_trait;
use thiserror::Error;

use cantina_core::domain::message::{Message, MessageId};
use cantina_core::domain::product::{Product, ProductId, WineType};
use cantina_core::domain::proposal::WineProposal;
use cantina_core::domain::session::{Session, SessionId, SessionToken};

pub mod memory;
pub mod message;
pub mod product;
pub mod proposal;
pub mod session;

pub use memory::{
    InMemoryMessageRepository, InMemoryProductRepository, InMemoryProposalRepository,
    InMemorySessionRepository,
};
pub use message::SqlMessageRepository;
pub use product::SqlProductRepository;
pub use proposal::SqlProposalRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Whether hidden context turns are included in a transcript read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryVisibility {
    VisibleOnly,
    IncludeHidden,
}

/// Per-product outcome of a confirm call. `unknown` products were never
/// proposed in the session and must be rejected by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub confirmed: Vec<ProductId>,
    pub already_selected: Vec<ProductId>,
    pub unknown: Vec<ProductId>,
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    async fn find_by_token(&self, token: &SessionToken)
        -> Result<Option<Session>, RepositoryError>;
    async fn save(&self, session: Session) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: Message) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError>;
    async fn list_for_session(
        &self,
        session_id: &SessionId,
        visibility: HistoryVisibility,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    /// Append an assistant turn and its proposal group in one transaction.
    /// Either the message and every proposal land together or nothing does;
    /// a message id never exists with a half-inserted group behind it.
    async fn record_assistant_turn(
        &self,
        message: Message,
        proposals: Vec<WineProposal>,
    ) -> Result<(), RepositoryError>;

    /// All proposals produced by one assistant turn, rank ascending.
    async fn rankings_for_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Vec<WineProposal>, RepositoryError>;

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<WineProposal>, RepositoryError>;

    /// Mark products as selected. Idempotent per product within a session:
    /// the first confirmation records the fact, repeats are no-ops.
    async fn confirm(
        &self,
        session_id: &SessionId,
        product_ids: &[ProductId],
    ) -> Result<ConfirmOutcome, RepositoryError>;

    /// Bulk-confirm every wine in a journey. Returns `None` when the journey
    /// id was never proposed in the session.
    async fn confirm_journey(
        &self,
        session_id: &SessionId,
        journey_id: &str,
    ) -> Result<Option<ConfirmOutcome>, RepositoryError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn list_available(
        &self,
        wine_type: Option<WineType>,
    ) -> Result<Vec<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
}
