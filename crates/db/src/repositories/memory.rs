use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use cantina_core::domain::message::{Message, MessageId, MessageKind};
use cantina_core::domain::product::{Product, ProductId, WineType};
use cantina_core::domain::proposal::WineProposal;
use cantina_core::domain::session::{Session, SessionId, SessionToken};

use super::{
    ConfirmOutcome, HistoryVisibility, MessageRepository, ProductRepository, ProposalRepository,
    RepositoryError, SessionRepository,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn find_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().find(|session| session.token == *token).cloned())
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Ok(())
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|message| message.id == *id).cloned())
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
        visibility: HistoryVisibility,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut selected: Vec<Message> = messages
            .iter()
            .filter(|message| message.session_id == *session_id)
            .filter(|message| match visibility {
                HistoryVisibility::VisibleOnly => message.kind == MessageKind::Standard,
                HistoryVisibility::IncludeHidden => true,
            })
            .cloned()
            .collect();

        if let Some(limit) = limit {
            let keep = limit as usize;
            if selected.len() > keep {
                selected.drain(..selected.len() - keep);
            }
        }

        Ok(selected)
    }
}

#[derive(Default)]
pub struct InMemoryProposalRepository {
    messages: InMemoryMessageRepository,
    proposals: RwLock<Vec<WineProposal>>,
}

impl InMemoryProposalRepository {
    pub fn messages(&self) -> &InMemoryMessageRepository {
        &self.messages
    }
}

#[async_trait::async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn record_assistant_turn(
        &self,
        message: Message,
        proposals: Vec<WineProposal>,
    ) -> Result<(), RepositoryError> {
        self.messages.append(message).await?;
        let mut stored = self.proposals.write().await;
        stored.extend(proposals);
        Ok(())
    }

    async fn rankings_for_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Vec<WineProposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        let mut rankings: Vec<WineProposal> = proposals
            .iter()
            .filter(|proposal| proposal.message_id == *message_id)
            .cloned()
            .collect();
        rankings.sort_by_key(|proposal| proposal.rank);
        Ok(rankings)
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<WineProposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals
            .iter()
            .filter(|proposal| proposal.session_id == *session_id)
            .cloned()
            .collect())
    }

    async fn confirm(
        &self,
        session_id: &SessionId,
        product_ids: &[ProductId],
    ) -> Result<ConfirmOutcome, RepositoryError> {
        let mut proposals = self.proposals.write().await;
        let mut outcome = ConfirmOutcome::default();
        let now = Utc::now();

        for product_id in product_ids {
            let mut indices: Vec<usize> = proposals
                .iter()
                .enumerate()
                .filter(|(_, proposal)| {
                    proposal.session_id == *session_id && proposal.product_id == *product_id
                })
                .map(|(index, _)| index)
                .collect();

            if indices.is_empty() {
                outcome.unknown.push(product_id.clone());
                continue;
            }
            if indices.iter().any(|&index| proposals[index].is_selected) {
                outcome.already_selected.push(product_id.clone());
                continue;
            }

            let latest = indices.pop().unwrap_or_default();
            proposals[latest].is_selected = true;
            proposals[latest].selected_at = Some(now);
            outcome.confirmed.push(product_id.clone());
        }

        Ok(outcome)
    }

    async fn confirm_journey(
        &self,
        session_id: &SessionId,
        journey_id: &str,
    ) -> Result<Option<ConfirmOutcome>, RepositoryError> {
        let product_ids: Vec<ProductId> = {
            let proposals = self.proposals.read().await;
            let mut slots: Vec<&WineProposal> = proposals
                .iter()
                .filter(|proposal| {
                    proposal.session_id == *session_id
                        && proposal.journey_id.as_deref() == Some(journey_id)
                })
                .collect();
            slots.sort_by_key(|proposal| proposal.journey_position);
            slots.iter().map(|proposal| proposal.product_id.clone()).collect()
        };

        if product_ids.is_empty() {
            return Ok(None);
        }

        self.confirm(session_id, &product_ids).await.map(Some)
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<String, Product>>,
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).cloned())
    }

    async fn list_available(
        &self,
        wine_type: Option<WineType>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        let mut available: Vec<Product> = products
            .values()
            .filter(|product| product.is_available)
            .filter(|product| wine_type.map_or(true, |wanted| product.wine_type == wanted))
            .cloned()
            .collect();
        available.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(available)
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert(product.id.0.clone(), product);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use cantina_core::domain::message::Message;
    use cantina_core::domain::product::{Product, ProductId, WineType};
    use cantina_core::domain::proposal::{ProposalGroupId, WineProposal};
    use cantina_core::domain::session::Session;

    use crate::repositories::{
        HistoryVisibility, InMemoryMessageRepository, InMemoryProposalRepository,
        InMemorySessionRepository, MessageRepository, ProposalRepository, SessionRepository,
    };

    #[tokio::test]
    async fn in_memory_session_repo_round_trip() {
        let repo = InMemorySessionRepository::default();
        let session = Session::new_b2c();

        repo.save(session.clone()).await.expect("save session");
        let by_token = repo.find_by_token(&session.token).await.expect("find by token");

        assert_eq!(by_token, Some(session));
    }

    #[tokio::test]
    async fn in_memory_history_hides_context_turns() {
        let repo = InMemoryMessageRepository::default();
        let session = Session::new_b2c();

        let hidden = Message::initial_context(session.id.clone(), "briefing");
        let visible = Message::user(session.id.clone(), "hello");
        repo.append(hidden).await.expect("append hidden");
        repo.append(visible.clone()).await.expect("append visible");

        let history = repo
            .list_for_session(&session.id, HistoryVisibility::VisibleOnly, None)
            .await
            .expect("history");
        assert_eq!(history, vec![visible]);
    }

    #[tokio::test]
    async fn in_memory_confirm_matches_sql_semantics() {
        let repo = InMemoryProposalRepository::default();
        let session = Session::new_b2c();
        let message = Message::assistant(session.id.clone(), "one wine");
        let product = Product {
            id: ProductId("p-1".to_owned()),
            name: "Barbera".to_owned(),
            wine_type: WineType::Red,
            price: Decimal::new(1_800, 2),
            margin: None,
            is_available: true,
        };
        let proposal = WineProposal::single(
            session.id.clone(),
            message.id.clone(),
            ProposalGroupId::mint(),
            &product,
            1,
            None,
            true,
        );

        repo.record_assistant_turn(message, vec![proposal]).await.expect("record");

        let first = repo.confirm(&session.id, &[product.id.clone()]).await.expect("confirm");
        assert_eq!(first.confirmed, vec![product.id.clone()]);

        let second = repo.confirm(&session.id, &[product.id.clone()]).await.expect("reconfirm");
        assert_eq!(second.already_selected, vec![product.id]);
    }
}
