use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cantina_core::domain::message::Message;
use cantina_core::domain::product::Product;
use cantina_core::RecommendationContext;

/// What the collaborator is asked to produce for one turn.
#[derive(Clone, Debug, Serialize)]
pub struct GenerationRequest {
    pub context: RecommendationContext,
    pub history: Vec<Message>,
    pub candidates: Vec<Product>,
}

/// One ranked wine in the collaborator's raw output. `product_ref` may be a
/// catalog id or a display name; the orchestrator resolves it against the
/// candidate set and rejects anything unresolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposedWine {
    pub product_ref: String,
    pub rank: u32,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub best: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposedJourney {
    #[serde(default)]
    pub label: Option<String>,
    pub slots: Vec<ProposedWine>,
}

/// Raw collaborator output, accepted as given for ranking but untrusted for
/// structure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub prose: String,
    #[serde(default)]
    pub wines: Vec<ProposedWine>,
    #[serde(default)]
    pub journeys: Vec<ProposedJourney>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("generation output could not be decoded: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError>;
}

#[async_trait]
impl<T> GenerationClient for std::sync::Arc<T>
where
    T: GenerationClient + ?Sized,
{
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        (**self).generate(request).await
    }
}
