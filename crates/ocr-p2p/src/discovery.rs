//! Peer discovery backed by the state store's announcement family (spec
//! §4.E: "The announcement database used by discovery is the state
//! store's announcement family").

use ocr_store::models::PeerAnnouncement;
use ocr_store::{Deadline, Store};
use ocr_types::OcrError;
use std::sync::Arc;
use std::time::Duration;

pub struct AnnouncementDiscovery {
    store: Arc<dyn Store>,
    job_id: String,
}

impl AnnouncementDiscovery {
    pub fn new(store: Arc<dyn Store>, job_id: String) -> Self {
        Self { store, job_id }
    }

    pub async fn announce(&self, peer_id: String, announce: Vec<u8>, now: i64) -> Result<(), OcrError> {
        self.store
            .upsert_announcement(
                PeerAnnouncement {
                    job_id: self.job_id.clone(),
                    peer_id,
                    announce,
                    created_at: now,
                },
                Deadline::after(Duration::from_secs(5)),
            )
            .await
    }

    pub async fn resolve(&self, peer_ids: &[String]) -> Result<Vec<PeerAnnouncement>, OcrError> {
        self.store
            .list_announcements(&self.job_id, peer_ids, Deadline::after(Duration::from_secs(5)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_store::MemoryStore;

    #[tokio::test]
    async fn resolve_only_returns_known_peers() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let discovery = AnnouncementDiscovery::new(store, "job-1".to_string());
        discovery
            .announce("peer-a".to_string(), vec![1, 2, 3], 0)
            .await
            .unwrap();
        let resolved = discovery
            .resolve(&["peer-a".to_string(), "peer-b".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].peer_id, "peer-a");
    }
}
