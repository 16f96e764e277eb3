//! Public server listing.
//!
//! The network layer keeps the listing informed about the server's name,
//! map and head count, and forwards registration acknowledgements that
//! arrive on the discovery token.

use log::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingInfo {
    pub name: String,
    pub map: String,
    pub players: u32,
    pub bots: u32,
    pub max_players: u8,
}

pub trait ServerListing: Send {
    fn update(&mut self, info: &ListingInfo);

    /// Payload of a `GSS+` discovery datagram.
    fn on_register_packet(&mut self, payload: &[u8]);

    fn deregister(&mut self);

    fn is_registered(&self) -> bool;
}

/// Listing that only reports to the log.
#[derive(Debug, Default)]
pub struct LogListing {
    enabled: bool,
    registered: bool,
    last: Option<ListingInfo>,
}

impl LogListing {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn last_info(&self) -> Option<&ListingInfo> {
        self.last.as_ref()
    }
}

impl ServerListing for LogListing {
    fn update(&mut self, info: &ListingInfo) {
        if !self.enabled {
            return;
        }
        if !self.registered {
            info!("Registering server {} on the listing", info.name);
            self.registered = true;
        }
        debug!(
            "Listing: {} on {} with {}/{} players and {} bots",
            info.name, info.map, info.players, info.max_players, info.bots
        );
        self.last = Some(info.clone());
    }

    fn on_register_packet(&mut self, payload: &[u8]) {
        debug!(
            "Listing acknowledgement: {}",
            String::from_utf8_lossy(payload)
        );
    }

    fn deregister(&mut self) {
        if self.registered {
            info!("Unregistering server from the listing");
            self.registered = false;
        }
    }

    fn is_registered(&self) -> bool {
        self.registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(players: u32) -> ListingInfo {
        ListingInfo {
            name: "Arena".into(),
            map: "alpha".into(),
            players,
            bots: 2,
            max_players: 16,
        }
    }

    #[test]
    fn test_disabled_listing_never_registers() {
        let mut listing = LogListing::new(false);
        listing.update(&info(1));
        assert!(!listing.is_registered());
        assert!(listing.last_info().is_none());
    }

    #[test]
    fn test_register_and_deregister() {
        let mut listing = LogListing::new(true);
        listing.update(&info(3));
        assert!(listing.is_registered());
        assert_eq!(listing.last_info().map(|i| i.players), Some(3));

        listing.deregister();
        assert!(!listing.is_registered());
    }
}
