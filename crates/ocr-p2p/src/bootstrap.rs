//! `BootstrapperFactory` (spec §4.E): a bootstrap-only participant — joins
//! the network to help other peers discover each other but does no
//! consensus work and registers no message route.

use crate::peer::Peer;
use async_trait::async_trait;
use ocr_types::OcrError;

#[async_trait]
pub trait BootstrapperFactory: Send + Sync {
    async fn new_bootstrapper(&self, locators: Vec<libp2p::Multiaddr>) -> Result<Box<dyn Bootstrapper>, OcrError>;
}

#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn close(&self) -> Result<(), OcrError>;
}

struct LivePeerBootstrapperFactory {
    peer: Peer,
}

pub fn factory(peer: Peer) -> Box<dyn BootstrapperFactory> {
    Box::new(LivePeerBootstrapperFactory { peer })
}

#[async_trait]
impl BootstrapperFactory for LivePeerBootstrapperFactory {
    async fn new_bootstrapper(&self, locators: Vec<libp2p::Multiaddr>) -> Result<Box<dyn Bootstrapper>, OcrError> {
        for locator in &locators {
            self.peer.dial(locator.clone()).await?;
        }
        self.peer.acquire();
        Ok(Box::new(LiveBootstrapper {
            peer: self.peer.clone(),
        }))
    }
}

struct LiveBootstrapper {
    peer: Peer,
}

#[async_trait]
impl Bootstrapper for LiveBootstrapper {
    async fn close(&self) -> Result<(), OcrError> {
        self.peer.release().await
    }
}
