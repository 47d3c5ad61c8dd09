use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use colloquy_types::models::SubscriptionRecord;

use crate::error::StoreError;
use crate::store::SubscriptionStore;

/// Per-user set of direct-message conversations the user follows.
#[derive(Clone)]
pub struct PrivateConversationIndex {
    store: Arc<dyn SubscriptionStore>,
}

impl PrivateConversationIndex {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// The user's record; empty when the user has none yet.
    pub async fn get(&self, user_id: Uuid) -> Result<SubscriptionRecord, StoreError> {
        Ok(self
            .store
            .get(user_id)
            .await?
            .unwrap_or_else(|| SubscriptionRecord::empty(user_id)))
    }

    /// Merges `conversation_ids` into the user's set. Ids already present are
    /// left alone and order of first insertion is kept.
    pub async fn store(
        &self,
        user_id: Uuid,
        conversation_ids: &[Uuid],
    ) -> Result<SubscriptionRecord, StoreError> {
        for &id in conversation_ids {
            self.store.add(user_id, id).await?;
        }
        self.get(user_id).await
    }

    /// Adds a single conversation. Returns whether a write happened.
    pub async fn ensure_subscribed(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<bool, StoreError> {
        let added = self.store.add(user_id, conversation_id).await?;
        if added {
            debug!("Subscribed {} to private conversation {}", user_id, conversation_id);
        }
        Ok(added)
    }
}
