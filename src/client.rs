//! Participant facade tying the board services to one configuration.

use crate::board::{BoardService, Channel, ContentStore};
use crate::config::Config;
use crate::http::ServiceClient;
use crate::realtime::RealtimeChannel;
use crate::Result;

/// Entry point for one participant.
///
/// Services handed out share the same HTTP client; each call to
/// [`BoardClient::realtime`] creates an independent connection.
#[derive(Debug, Clone)]
pub struct BoardClient {
    config: Config,
    service: ServiceClient,
}

impl BoardClient {
    /// Validate the configuration and build the HTTP client.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let service = ServiceClient::new(&config.service)?;
        Ok(Self { config, service })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }

    /// Channel lifecycle and listing.
    pub fn board(&self) -> BoardService {
        BoardService::new(self.service.clone(), self.config.channels.clone())
    }

    /// Channel content.
    pub fn content(&self) -> ContentStore {
        ContentStore::new(self.service.clone(), self.config.content.clone())
    }

    /// A new, disconnected realtime channel.
    pub fn realtime(&self) -> RealtimeChannel {
        RealtimeChannel::new(self.service.clone(), self.config.realtime.clone())
    }

    /// Realtime route of a channel under the configured prefix.
    pub fn binding_for(&self, channel: &Channel) -> String {
        crate::binding::realtime_binding(&self.config.realtime.binding_prefix, &channel.channel_id)
    }
}
