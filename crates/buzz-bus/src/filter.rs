//! Delivery filter applied by every connector.

use buzz_types::{ConnectorId, Envelope};

/// Decides whether an envelope is addressed to one connector.
///
/// An envelope passes when:
/// - its `link` equals the connector's link,
/// - it was not sent by the connector itself,
/// - its `receiver` is absent or names the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeFilter {
    pub link: String,
    pub identity: ConnectorId,
}

impl EnvelopeFilter {
    pub fn new(link: impl Into<String>, identity: ConnectorId) -> Self {
        Self {
            link: link.into(),
            identity,
        }
    }

    /// Check if an envelope matches this filter.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        let link_match = envelope.link == self.link;
        let not_own = envelope.sender != self.identity;
        let receiver_match = envelope
            .receiver
            .as_ref()
            .map_or(true, |receiver| *receiver == self.identity);

        link_match && not_own && receiver_match
    }
}
