//! In-process relay client.
//!
//! Binds a [`MemoryDropStore`] and one caller's bearer token behind the
//! [`RelayClient`] capability trait. Hex encoding happens here: the store
//! speaks hex strings, the core speaks bytes.

use async_trait::async_trait;
use bytes::Bytes;
use covermix_core::{DropId, FetchedDrop, RelayClient, RelayError};
use covermix_proto::{Direction, PublishedKeys, wire};

use crate::store::{MemoryDropStore, StoreError};

/// A role's handle to the shared in-memory relay.
#[derive(Debug, Clone)]
pub struct InProcessRelay {
    store: MemoryDropStore,
    token: String,
}

impl InProcessRelay {
    /// Bind a store with the token the caller will present.
    pub fn new(store: MemoryDropStore, token: impl Into<String>) -> Self {
        Self { store, token: token.into() }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownToken | StoreError::Forbidden { .. } => Self::Unauthorized,
            StoreError::InvalidEnvelope(e) => Self::InvalidPayload(e.to_string()),
        }
    }
}

#[async_trait]
impl RelayClient for InProcessRelay {
    async fn enqueue(&self, direction: Direction, envelope: Bytes) -> Result<DropId, RelayError> {
        let id = self.store.enqueue(&self.token, direction, &wire::encode_hex(&envelope))?;
        Ok(id)
    }

    async fn fetch_oldest(
        &self,
        direction: Direction,
        count: usize,
    ) -> Result<Vec<FetchedDrop>, RelayError> {
        let queued = self.store.fetch_oldest(&self.token, direction, count)?;
        queued
            .into_iter()
            .map(|entry| {
                let envelope = entry
                    .envelope_bytes()
                    .map_err(|e| RelayError::InvalidPayload(e.to_string()))?;
                Ok(FetchedDrop { id: entry.id, envelope })
            })
            .collect()
    }

    async fn delete(&self, direction: Direction, id: DropId) -> Result<(), RelayError> {
        self.store.delete(&self.token, direction, id)?;
        Ok(())
    }

    async fn post_batch(&self, direction: Direction, batch: Vec<Bytes>) -> Result<(), RelayError> {
        let hex: Vec<String> = batch.iter().map(|bytes| wire::encode_hex(bytes)).collect();
        self.store.post_batch(&self.token, direction, &hex)?;
        Ok(())
    }

    async fn fetch_deaddrop(&self, direction: Direction) -> Result<Vec<Bytes>, RelayError> {
        let drops = self.store.fetch_deaddrop(&self.token, direction)?;
        drops
            .iter()
            .map(|message| {
                wire::decode_hex(message)
                    .map(Bytes::from)
                    .map_err(|e| RelayError::InvalidPayload(e.to_string()))
            })
            .collect()
    }

    async fn published_keys(&self) -> Result<PublishedKeys, RelayError> {
        let keys = self.store.published_keys(&self.token)?;
        Ok(keys)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use covermix_proto::SOURCE_ENVELOPE_LEN;

    use super::*;
    use crate::auth::AccessTokens;
    use crate::store::StoreConfig;

    fn published() -> PublishedKeys {
        PublishedKeys {
            mixer_key: "00".repeat(32),
            mixer_sign_key: "11".repeat(32),
            contact_keys: std::collections::BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn client_roundtrips_bytes_through_hex() {
        let store = MemoryDropStore::new(AccessTokens::default(), published(), StoreConfig::default());
        let source = InProcessRelay::new(store.clone(), "source_app_token");
        let mixer = InProcessRelay::new(store, "mixer_token");

        let envelope = Bytes::from(vec![0xa5u8; SOURCE_ENVELOPE_LEN]);
        let id = source.enqueue(Direction::SourceToContact, envelope.clone()).await.unwrap();

        let fetched = mixer.fetch_oldest(Direction::SourceToContact, 10).await.unwrap();
        assert_eq!(fetched, vec![FetchedDrop { id, envelope }]);
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let store = MemoryDropStore::new(AccessTokens::default(), published(), StoreConfig::default());
        let stranger = InProcessRelay::new(store, "wrong");

        let result = stranger.fetch_deaddrop(Direction::SourceToContact).await;
        assert!(matches!(result, Err(RelayError::Unauthorized)));
    }
}
