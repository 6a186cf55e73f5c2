//! Guest-facing session API, keyed by anonymous session tokens.
//!
//! Endpoints:
//! - `POST /api/v1/sessions`: open a session
//! - `POST /api/v1/sessions/{token}/messages`: customer turn (optional inline context)
//! - `GET  /api/v1/messages/{message_id}/rankings`: ledger read, rank order
//! - `POST /api/v1/sessions/{token}/confirm`: confirm wines or a whole journey
//! - `POST /api/v1/sessions/{token}/feedback`: one rating per session, ends it
//! - `POST /api/v1/sessions/{token}/end`: explicit close
//! - `GET  /api/v1/sessions/{token}/history`: visible transcript

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use cantina_agent::{select_candidates, GenerationClient, Orchestrator, ProposalBatch};
use cantina_core::config::SessionConfig;
use cantina_core::context::{
    ContextBuilder, Dish, JourneyPreference, RecommendationContext, WineTypePreference,
};
use cantina_core::domain::message::{Message, MessageId};
use cantina_core::domain::product::ProductId;
use cantina_core::domain::proposal::WineProposal;
use cantina_core::domain::session::{Session, SessionStatus, SessionToken};
use cantina_core::errors::{ApplicationError, DomainError, InterfaceError};
use cantina_core::flows::{
    FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState, SessionFlow, TransitionOutcome,
};
use cantina_db::repositories::{
    HistoryVisibility, MessageRepository, ProductRepository, ProposalRepository, RepositoryError,
    SessionRepository, SqlMessageRepository, SqlProductRepository, SqlProposalRepository,
    SqlSessionRepository,
};
use cantina_db::DbPool;

const WELCOME_MESSAGE: &str = "Welcome! Tell me about your table, tonight's dishes, and what \
     you like to drink, and I'll suggest the right wines.";
const NEED_CONTEXT_MESSAGE: &str = "Before I can recommend anything I need a little about your \
     table: how many guests, which dishes, and what kind of wine you prefer.";
const CLOSING_MESSAGE: &str = "Thank you for dining with us. Enjoy your evening!";

#[derive(Clone)]
pub struct ApiState {
    db_pool: DbPool,
    generation: Arc<dyn GenerationClient>,
    session: SessionConfig,
}

impl ApiState {
    pub fn new(
        db_pool: DbPool,
        generation: Arc<dyn GenerationClient>,
        session: SessionConfig,
    ) -> Self {
        Self { db_pool, generation, session }
    }

    fn sessions(&self) -> SqlSessionRepository {
        SqlSessionRepository::new(self.db_pool.clone())
    }

    fn messages(&self) -> SqlMessageRepository {
        SqlMessageRepository::new(self.db_pool.clone())
    }

    fn proposals(&self) -> SqlProposalRepository {
        SqlProposalRepository::new(self.db_pool.clone())
    }

    fn products(&self) -> SqlProductRepository {
        SqlProductRepository::new(self.db_pool.clone())
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/{token}/messages", post(post_message))
        .route("/api/v1/messages/{message_id}/rankings", get(message_rankings))
        .route("/api/v1/sessions/{token}/confirm", post(confirm_selection))
        .route("/api/v1/sessions/{token}/feedback", post(submit_feedback))
        .route("/api/v1/sessions/{token}/end", post(end_session))
        .route("/api/v1/sessions/{token}/history", get(session_history))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub session_token: String,
    pub welcome_message: String,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub context: Option<ContextPayload>,
}

#[derive(Debug, Deserialize)]
pub struct ContextPayload {
    pub dishes: Vec<DishPayload>,
    pub guest_count: u32,
    pub wine_type: WineTypePreference,
    pub journey_preference: JourneyPreference,
    #[serde(default)]
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub bottles_target: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DishPayload {
    pub name: String,
    pub category: Option<String>,
    pub main_ingredient: Option<String>,
    pub cooking_method: Option<String>,
}

/// One ledger row as shown to the guest. Margin stays server-side.
#[derive(Debug, Serialize)]
pub struct ProposalView {
    pub proposal_id: String,
    pub product_id: String,
    pub product_name: String,
    pub rank: u32,
    pub reason: Option<String>,
    pub is_best: bool,
    pub price: Decimal,
    pub journey_id: Option<String>,
    pub journey_position: Option<u32>,
    pub is_selected: bool,
}

impl From<&WineProposal> for ProposalView {
    fn from(proposal: &WineProposal) -> Self {
        Self {
            proposal_id: proposal.id.0.clone(),
            product_id: proposal.product_id.0.clone(),
            product_name: proposal.product_name.clone(),
            rank: proposal.rank,
            reason: proposal.reason.clone(),
            is_best: proposal.is_best,
            price: proposal.price,
            journey_id: proposal.journey_id.clone(),
            journey_position: proposal.journey_position,
            is_selected: proposal.is_selected,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JourneySlotView {
    pub position: u32,
    pub product_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JourneyView {
    pub journey_id: String,
    pub label: Option<String>,
    pub slots: Vec<JourneySlotView>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub content: String,
    pub proposals: Vec<ProposalView>,
    pub journeys: Vec<JourneyView>,
}

#[derive(Debug, Serialize)]
pub struct RankingsResponse {
    pub message_id: String,
    pub rankings: Vec<ProposalView>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub wine_ids: Vec<String>,
    #[serde(default)]
    pub journey_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub confirmed: Vec<String>,
    pub already_selected: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClosedResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub role: &'static str,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryEntry>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn create_session(State(state): State<ApiState>) -> ApiResult<CreateSessionResponse> {
    let correlation_id = new_correlation_id();
    let mut session = Session::new_b2c();
    let welcome = Message::assistant(session.id.clone(), WELCOME_MESSAGE);
    session.increment_message_count();

    state
        .sessions()
        .save(session.clone())
        .await
        .map_err(|error| persistence_reply(error, &correlation_id))?;
    state
        .messages()
        .append(welcome)
        .await
        .map_err(|error| persistence_reply(error, &correlation_id))?;

    info!(
        event_name = "session.created",
        correlation_id = %correlation_id,
        session_id = %session.id.0,
        "guest session opened"
    );

    Ok(Json(CreateSessionResponse {
        session_id: session.id.0,
        session_token: session.token.0,
        welcome_message: WELCOME_MESSAGE.to_owned(),
    }))
}

pub async fn post_message(
    Path(token): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<PostMessageRequest>,
) -> ApiResult<MessageResponse> {
    let correlation_id = new_correlation_id();
    let sessions = state.sessions();
    let messages = state.messages();
    let engine = FlowEngine::default();

    let mut session = load_session(&sessions, &token, &correlation_id).await?;
    expire_if_idle(&state, &sessions, &mut session, &engine, &correlation_id).await?;
    if !session.is_active() {
        return Err(domain_reply(
            DomainError::SessionEnded { session_id: session.id.0.clone() },
            &correlation_id,
        ));
    }

    let PostMessageRequest { message, context } = body;
    let text = message.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty());
    if text.is_none() && context.is_none() {
        return Err(interface_reply(InterfaceError::BadRequest {
            message: "either `message` or `context` must be provided".to_owned(),
            correlation_id,
        }));
    }

    if let Some(payload) = context {
        let declared = build_context(payload).map_err(|error| domain_reply(error, &correlation_id))?;
        let outcome = engine
            .apply(&flow_state(session.status), &FlowEvent::ContextDeclared, &flow_context(&session))
            .map_err(|error| domain_reply(error.into(), &correlation_id))?;
        session.declare_context(declared);
        if outcome.actions.contains(&FlowAction::AppendInitialContextTurn) {
            let briefing = session
                .context
                .as_ref()
                .map(RecommendationContext::briefing_message)
                .unwrap_or_default();
            messages
                .append(Message::initial_context(session.id.clone(), briefing))
                .await
                .map_err(|error| persistence_reply(error, &correlation_id))?;
            session.increment_message_count();
        }
        advance(&mut session, &outcome, &correlation_id)?;
    }

    if let Some(text) = text {
        let outcome = engine
            .apply(&flow_state(session.status), &FlowEvent::CustomerMessage, &flow_context(&session))
            .map_err(|error| domain_reply(error.into(), &correlation_id))?;
        messages
            .append(Message::user(session.id.clone(), text))
            .await
            .map_err(|error| persistence_reply(error, &correlation_id))?;
        session.increment_message_count();
        advance(&mut session, &outcome, &correlation_id)?;
    }

    session.touch();

    // Until the table is declared there is nothing to rank against, so the
    // assistant asks for the declaration instead of calling the collaborator.
    let Some(declared) = session.context.clone() else {
        let reply = Message::assistant(session.id.clone(), NEED_CONTEXT_MESSAGE);
        messages
            .append(reply.clone())
            .await
            .map_err(|error| persistence_reply(error, &correlation_id))?;
        session.increment_message_count();
        sessions
            .save(session)
            .await
            .map_err(|error| persistence_reply(error, &correlation_id))?;
        return Ok(Json(MessageResponse {
            message_id: reply.id.0,
            content: reply.content,
            proposals: Vec::new(),
            journeys: Vec::new(),
        }));
    };

    let history = messages
        .list_for_session(
            &session.id,
            HistoryVisibility::IncludeHidden,
            Some(state.session.max_history_messages),
        )
        .await
        .map_err(|error| persistence_reply(error, &correlation_id))?;
    let catalog = state
        .products()
        .list_available(None)
        .await
        .map_err(|error| persistence_reply(error, &correlation_id))?;
    let candidates = select_candidates(&catalog, &declared);

    let orchestrator = Orchestrator::new(Arc::clone(&state.generation));
    match orchestrator.propose(&session, &declared, history, candidates).await {
        Ok(turn) => {
            let journeys = journey_views(&turn.batch);
            let proposals: Vec<ProposalView> =
                turn.batch.proposals().iter().map(ProposalView::from).collect();
            let message_id = turn.message.id.0.clone();
            let content = turn.message.content.clone();

            state
                .proposals()
                .record_assistant_turn(turn.message, turn.batch.into_proposals())
                .await
                .map_err(|error| persistence_reply(error, &correlation_id))?;
            session.increment_message_count();
            let session_id = session.id.0.clone();
            sessions
                .save(session)
                .await
                .map_err(|error| persistence_reply(error, &correlation_id))?;

            info!(
                event_name = "session.turn_recorded",
                correlation_id = %correlation_id,
                session_id = %session_id,
                message_id = %message_id,
                proposal_count = proposals.len(),
                "assistant turn and proposal group recorded"
            );

            Ok(Json(MessageResponse { message_id, content, proposals, journeys }))
        }
        Err(error) => {
            // The guest turn already happened; keep its bookkeeping even
            // though no proposals were produced.
            sessions
                .save(session)
                .await
                .map_err(|error| persistence_reply(error, &correlation_id))?;
            Err(application_reply(error, &correlation_id))
        }
    }
}

pub async fn message_rankings(
    Path(message_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<RankingsResponse> {
    let correlation_id = new_correlation_id();
    let id = MessageId(message_id.clone());

    let known = state
        .messages()
        .find_by_id(&id)
        .await
        .map_err(|error| persistence_reply(error, &correlation_id))?;
    if known.is_none() {
        return Err(interface_reply(InterfaceError::NotFound {
            message: format!("no message with id `{message_id}`"),
            correlation_id,
        }));
    }

    let rankings = state
        .proposals()
        .rankings_for_message(&id)
        .await
        .map_err(|error| persistence_reply(error, &correlation_id))?;

    Ok(Json(RankingsResponse {
        message_id,
        rankings: rankings.iter().map(ProposalView::from).collect(),
    }))
}

pub async fn confirm_selection(
    Path(token): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<ConfirmRequest>,
) -> ApiResult<ConfirmResponse> {
    let correlation_id = new_correlation_id();
    let sessions = state.sessions();
    let mut session = load_session(&sessions, &token, &correlation_id).await?;
    if !session.is_active() {
        return Err(domain_reply(
            DomainError::SessionEnded { session_id: session.id.0.clone() },
            &correlation_id,
        ));
    }

    let outcome = if let Some(journey_id) = body.journey_id {
        state
            .proposals()
            .confirm_journey(&session.id, &journey_id)
            .await
            .map_err(|error| persistence_reply(error, &correlation_id))?
            .ok_or_else(|| {
                interface_reply(InterfaceError::NotFound {
                    message: format!("journey `{journey_id}` was never proposed in this session"),
                    correlation_id: correlation_id.clone(),
                })
            })?
    } else {
        if body.wine_ids.is_empty() {
            return Err(interface_reply(InterfaceError::BadRequest {
                message: "either `wine_ids` or `journey_id` must be provided".to_owned(),
                correlation_id,
            }));
        }
        let ids: Vec<ProductId> = body.wine_ids.into_iter().map(ProductId).collect();
        state
            .proposals()
            .confirm(&session.id, &ids)
            .await
            .map_err(|error| persistence_reply(error, &correlation_id))?
    };

    if let Some(unknown) = outcome.unknown.first() {
        return Err(domain_reply(
            DomainError::UnknownProposal {
                session_id: session.id.0.clone(),
                product_id: unknown.0.clone(),
            },
            &correlation_id,
        ));
    }

    session.touch();
    let session_id = session.id.0.clone();
    sessions.save(session).await.map_err(|error| persistence_reply(error, &correlation_id))?;

    info!(
        event_name = "session.selection_confirmed",
        correlation_id = %correlation_id,
        session_id = %session_id,
        confirmed = outcome.confirmed.len(),
        already_selected = outcome.already_selected.len(),
        "wine selection confirmed"
    );

    Ok(Json(ConfirmResponse {
        confirmed: outcome.confirmed.into_iter().map(|id| id.0).collect(),
        already_selected: outcome.already_selected.into_iter().map(|id| id.0).collect(),
    }))
}

pub async fn submit_feedback(
    Path(token): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<FeedbackRequest>,
) -> ApiResult<ClosedResponse> {
    let correlation_id = new_correlation_id();
    let sessions = state.sessions();
    let engine = FlowEngine::default();
    let mut session = load_session(&sessions, &token, &correlation_id).await?;

    engine
        .apply(&flow_state(session.status), &FlowEvent::FeedbackSubmitted, &flow_context(&session))
        .map_err(|error| domain_reply(error.into(), &correlation_id))?;
    session
        .record_feedback(body.rating, body.feedback)
        .map_err(|error| domain_reply(error, &correlation_id))?;

    let session_id = session.id.0.clone();
    sessions.save(session).await.map_err(|error| persistence_reply(error, &correlation_id))?;

    info!(
        event_name = "session.feedback_recorded",
        correlation_id = %correlation_id,
        session_id = %session_id,
        rating = body.rating,
        "feedback recorded, session ended"
    );

    Ok(Json(ClosedResponse { success: true, message: CLOSING_MESSAGE.to_owned() }))
}

pub async fn end_session(
    Path(token): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<ClosedResponse> {
    let correlation_id = new_correlation_id();
    let sessions = state.sessions();
    let engine = FlowEngine::default();
    let mut session = load_session(&sessions, &token, &correlation_id).await?;

    // Closing twice is safe
    if session.status != SessionStatus::Ended {
        let outcome = engine
            .apply(&flow_state(session.status), &FlowEvent::CloseRequested, &flow_context(&session))
            .map_err(|error| domain_reply(error.into(), &correlation_id))?;
        advance(&mut session, &outcome, &correlation_id)?;
        let session_id = session.id.0.clone();
        sessions.save(session).await.map_err(|error| persistence_reply(error, &correlation_id))?;

        info!(
            event_name = "session.closed",
            correlation_id = %correlation_id,
            session_id = %session_id,
            "session closed by request"
        );
    }

    Ok(Json(ClosedResponse { success: true, message: CLOSING_MESSAGE.to_owned() }))
}

pub async fn session_history(
    Path(token): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<HistoryResponse> {
    let correlation_id = new_correlation_id();
    let session = load_session(&state.sessions(), &token, &correlation_id).await?;

    let messages = state
        .messages()
        .list_for_session(&session.id, HistoryVisibility::VisibleOnly, None)
        .await
        .map_err(|error| persistence_reply(error, &correlation_id))?;

    Ok(Json(HistoryResponse {
        session_id: session.id.0,
        messages: messages
            .into_iter()
            .map(|message| HistoryEntry {
                id: message.id.0,
                role: message.role.as_str(),
                content: message.content,
                created_at: message.created_at.to_rfc3339(),
            })
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn flow_state(status: SessionStatus) -> FlowState {
    match status {
        SessionStatus::Created => FlowState::Created,
        SessionStatus::Active => FlowState::Active,
        SessionStatus::Ended => FlowState::Ended,
    }
}

fn session_status(state: FlowState) -> SessionStatus {
    match state {
        FlowState::Created => SessionStatus::Created,
        FlowState::Active => SessionStatus::Active,
        FlowState::Ended => SessionStatus::Ended,
    }
}

fn flow_context(session: &Session) -> FlowContext {
    FlowContext { feedback_recorded: session.rating.is_some() }
}

fn advance(
    session: &mut Session,
    outcome: &TransitionOutcome,
    correlation_id: &str,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    let next = session_status(outcome.to);
    if session.status != next {
        session.transition_to(next).map_err(|error| domain_reply(error, correlation_id))?;
    }
    Ok(())
}

async fn load_session(
    sessions: &SqlSessionRepository,
    token: &str,
    correlation_id: &str,
) -> Result<Session, (StatusCode, Json<ApiError>)> {
    match sessions.find_by_token(&SessionToken(token.to_owned())).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(interface_reply(InterfaceError::NotFound {
            message: format!("no session for token `{token}`"),
            correlation_id: correlation_id.to_owned(),
        })),
        Err(error) => Err(persistence_reply(error, correlation_id)),
    }
}

/// Sessions idle past the configured window behave exactly like ended ones.
async fn expire_if_idle(
    state: &ApiState,
    sessions: &SqlSessionRepository,
    session: &mut Session,
    engine: &FlowEngine<SessionFlow>,
    correlation_id: &str,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    if !session.is_active() {
        return Ok(());
    }
    let idle = Utc::now() - session.last_activity;
    if idle < Duration::seconds(state.session.inactivity_timeout_secs as i64) {
        return Ok(());
    }

    let outcome = engine
        .apply(&flow_state(session.status), &FlowEvent::InactivityExpired, &flow_context(session))
        .map_err(|error| domain_reply(error.into(), correlation_id))?;
    advance(session, &outcome, correlation_id)?;
    sessions
        .save(session.clone())
        .await
        .map_err(|error| persistence_reply(error, correlation_id))?;

    info!(
        event_name = "session.expired",
        correlation_id = %correlation_id,
        session_id = %session.id.0,
        idle_secs = idle.num_seconds(),
        "session expired after inactivity"
    );
    Ok(())
}

fn build_context(payload: ContextPayload) -> Result<RecommendationContext, DomainError> {
    let mut builder = ContextBuilder::new()
        .guest_count(payload.guest_count)
        .wine_type(payload.wine_type)
        .journey_preference(payload.journey_preference)
        .budget(payload.budget)
        .bottles_target(payload.bottles_target);
    for dish in payload.dishes {
        builder = builder.dish(Dish {
            name: dish.name,
            category: dish.category,
            main_ingredient: dish.main_ingredient,
            cooking_method: dish.cooking_method,
        });
    }
    builder.build()
}

fn journey_views(batch: &ProposalBatch) -> Vec<JourneyView> {
    match batch {
        ProposalBatch::Single { .. } => Vec::new(),
        ProposalBatch::Journey { journeys, .. } => journeys
            .iter()
            .map(|plan| JourneyView {
                journey_id: plan.id.clone(),
                label: plan.label.clone(),
                slots: plan
                    .slots
                    .iter()
                    .map(|slot| JourneySlotView {
                        position: slot.position,
                        product_id: slot.product_id.0.clone(),
                        reason: slot.reason.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn interface_reply(interface: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let (status, error) = match &interface {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    let correlation_id = match &interface {
        InterfaceError::BadRequest { correlation_id, .. }
        | InterfaceError::NotFound { correlation_id, .. }
        | InterfaceError::ServiceUnavailable { correlation_id, .. }
        | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
    };

    (
        status,
        Json(ApiError { error, message: interface.user_message().to_owned(), correlation_id }),
    )
}

fn application_reply(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    interface_reply(error.into_interface(correlation_id))
}

fn domain_reply(error: DomainError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    application_reply(ApplicationError::from(error), correlation_id)
}

fn persistence_reply(error: RepositoryError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    application_reply(ApplicationError::Persistence(error.to_string()), correlation_id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;

    use cantina_agent::{
        GenerationClient, GenerationError, GenerationOutput, GenerationRequest, ProposedWine,
    };
    use cantina_core::config::SessionConfig;
    use cantina_core::context::{JourneyPreference, WineTypePreference};
    use cantina_db::{connect_with_settings, migrations, seed_demo_cellar};

    use super::*;

    struct ScriptedClient(Result<GenerationOutput, GenerationError>);

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationOutput, GenerationError> {
            self.0.clone()
        }
    }

    fn ranked_reds() -> GenerationOutput {
        GenerationOutput {
            prose: "The Barolo will carry the tagliata; the Chianti is a lighter path.".to_owned(),
            wines: vec![
                ProposedWine {
                    product_ref: "barolo-docg-2019".to_owned(),
                    rank: 1,
                    reason: Some("structured tannins for grilled beef".to_owned()),
                    best: true,
                },
                ProposedWine {
                    product_ref: "chianti-classico-2021".to_owned(),
                    rank: 2,
                    reason: None,
                    best: false,
                },
            ],
            journeys: Vec::new(),
        }
    }

    async fn setup(result: Result<GenerationOutput, GenerationError>) -> ApiState {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_demo_cellar(&pool).await.expect("seed");
        ApiState::new(
            pool,
            Arc::new(ScriptedClient(result)),
            SessionConfig { inactivity_timeout_secs: 1800, max_history_messages: 20 },
        )
    }

    fn red_single_context() -> ContextPayload {
        ContextPayload {
            dishes: vec![DishPayload {
                name: "Tagliata di manzo".to_owned(),
                category: None,
                main_ingredient: Some("beef".to_owned()),
                cooking_method: Some("grilled".to_owned()),
            }],
            guest_count: 4,
            wine_type: WineTypePreference::Red,
            journey_preference: JourneyPreference::Single,
            budget: None,
            bottles_target: None,
        }
    }

    fn first_turn() -> PostMessageRequest {
        PostMessageRequest {
            message: Some("What goes with the tagliata?".to_owned()),
            context: Some(red_single_context()),
        }
    }

    async fn open_session(state: &ApiState) -> String {
        let Json(created) = create_session(State(state.clone())).await.expect("create session");
        created.session_token
    }

    #[tokio::test]
    async fn create_session_returns_token_and_persists_welcome_turn() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;

        let Json(history) = session_history(Path(token), State(state)).await.expect("history");
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].role, "assistant");
        assert_eq!(history.messages[0].content, WELCOME_MESSAGE);
    }

    #[tokio::test]
    async fn first_turn_with_context_records_ranked_proposals() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;

        let Json(reply) =
            post_message(Path(token.clone()), State(state.clone()), Json(first_turn()))
                .await
                .expect("turn succeeds");

        assert_eq!(reply.proposals.len(), 2);
        assert_eq!(reply.proposals[0].product_id, "barolo-docg-2019");
        assert_eq!(reply.proposals[0].rank, 1);
        assert!(reply.proposals[0].is_best);
        assert!(reply.journeys.is_empty());

        // The ledger read reconstructs the same rows from a cold repository
        let Json(rankings) =
            message_rankings(Path(reply.message_id.clone()), State(state.clone()))
                .await
                .expect("rankings");
        assert_eq!(rankings.rankings.len(), 2);
        assert_eq!(rankings.rankings[1].product_id, "chianti-classico-2021");

        // The hidden briefing turn never shows up in guest history
        let Json(history) = session_history(Path(token), State(state)).await.expect("history");
        assert_eq!(history.messages.len(), 3, "welcome, guest turn, assistant turn");
        assert!(history.messages.iter().all(|entry| !entry.content.starts_with("We are a table")));
    }

    #[tokio::test]
    async fn generation_outage_maps_to_apologetic_service_unavailable() {
        let state =
            setup(Err(GenerationError::Unavailable("timeout after 30s".to_owned()))).await;
        let token = open_session(&state).await;

        let (status, Json(error)) =
            post_message(Path(token), State(state), Json(first_turn()))
                .await
                .expect_err("outage surfaces as error");

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(error.message.contains("I'm sorry"));
        assert!(!error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn message_without_context_or_text_is_rejected() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;

        let (status, _) = post_message(
            Path(token),
            State(state),
            Json(PostMessageRequest { message: Some("   ".to_owned()), context: None }),
        )
        .await
        .expect_err("empty turn");

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn idle_session_expires_and_rejects_the_next_turn() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;

        // Backdate the last activity to just past the configured window
        let sessions = state.sessions();
        let mut session = sessions
            .find_by_token(&SessionToken(token.clone()))
            .await
            .expect("lookup")
            .expect("session exists");
        session.last_activity = Utc::now() - Duration::seconds(1_801);
        sessions.save(session).await.expect("backdate");

        let (status, _) = post_message(Path(token.clone()), State(state.clone()), Json(first_turn()))
            .await
            .expect_err("idle session rejects the turn");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let session = sessions
            .find_by_token(&SessionToken(token))
            .await
            .expect("lookup")
            .expect("session exists");
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn confirm_is_idempotent_across_repeat_requests() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;
        post_message(Path(token.clone()), State(state.clone()), Json(first_turn()))
            .await
            .expect("proposals recorded");

        let request = || ConfirmRequest {
            wine_ids: vec!["barolo-docg-2019".to_owned()],
            journey_id: None,
        };

        let Json(first) =
            confirm_selection(Path(token.clone()), State(state.clone()), Json(request()))
                .await
                .expect("first confirm");
        assert_eq!(first.confirmed, vec!["barolo-docg-2019".to_owned()]);
        assert!(first.already_selected.is_empty());

        let Json(second) = confirm_selection(Path(token), State(state), Json(request()))
            .await
            .expect("repeat confirm");
        assert!(second.confirmed.is_empty());
        assert_eq!(second.already_selected, vec!["barolo-docg-2019".to_owned()]);
    }

    #[tokio::test]
    async fn confirming_an_unproposed_wine_is_not_found() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;
        post_message(Path(token.clone()), State(state.clone()), Json(first_turn()))
            .await
            .expect("proposals recorded");

        let (status, Json(error)) = confirm_selection(
            Path(token),
            State(state),
            Json(ConfirmRequest {
                wine_ids: vec!["prosecco-valdobbiadene".to_owned()],
                journey_id: None,
            }),
        )
        .await
        .expect_err("never proposed");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error.error, "not_found");
    }

    #[tokio::test]
    async fn feedback_ends_the_session_and_rejects_a_second_submission() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;
        post_message(Path(token.clone()), State(state.clone()), Json(first_turn()))
            .await
            .expect("turn");

        let Json(closed) = submit_feedback(
            Path(token.clone()),
            State(state.clone()),
            Json(FeedbackRequest { rating: 5, feedback: Some("Perfetto".to_owned()) }),
        )
        .await
        .expect("first feedback");
        assert!(closed.success);

        let (status, _) = submit_feedback(
            Path(token.clone()),
            State(state.clone()),
            Json(FeedbackRequest { rating: 1, feedback: None }),
        )
        .await
        .expect_err("second feedback");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // New messages are rejected once the session has ended
        let (status, _) = post_message(Path(token), State(state), Json(first_turn()))
            .await
            .expect_err("session ended");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn explicit_close_is_idempotent() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;

        let Json(first) =
            end_session(Path(token.clone()), State(state.clone())).await.expect("close");
        assert!(first.success);

        let Json(second) = end_session(Path(token), State(state)).await.expect("repeat close");
        assert!(second.success);
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let state = setup(Ok(ranked_reds())).await;

        let (status, _) =
            session_history(Path("no-such-token".to_owned()), State(state))
                .await
                .expect_err("unknown token");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ledger_stays_readable_after_the_session_ends() {
        let state = setup(Ok(ranked_reds())).await;
        let token = open_session(&state).await;
        let Json(reply) =
            post_message(Path(token.clone()), State(state.clone()), Json(first_turn()))
                .await
                .expect("turn");
        end_session(Path(token), State(state.clone())).await.expect("close");

        let Json(rankings) =
            message_rankings(Path(reply.message_id), State(state)).await.expect("rankings");
        assert_eq!(rankings.rankings.len(), 2);
    }
}
