// Error classifier: decides whether a transport failure means the session died

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::events::TransportEvent;
use crate::error::TradeError;

/// Failure-text markers indicating the remote session is gone.
const SESSION_MARKERS: [&str; 2] = ["Malformed response", "Not Logged In"];

/// Returns true when the failure text indicates a dead session rather than a
/// transient or offer-specific problem.
pub fn is_session_failure(message: &str) -> bool {
    SESSION_MARKERS.iter().any(|m| message.contains(m))
}

/// Inspects failures and fires the re-authentication path when they indicate
/// session loss. Classification never blocks or transforms the failure;
/// callers keep propagating the original error.
#[derive(Clone)]
pub struct ErrorClassifier {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ErrorClassifier {
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { events }
    }

    pub fn classify(&self, err: &TradeError) {
        let message = err.to_string();

        if is_session_failure(&message) {
            warn!("session failure detected: {}", message);

            if self.events.send(TransportEvent::SessionExpired).is_err() {
                warn!("event router is gone, dropping session-expired signal");
            }
        } else {
            debug!("non-session failure ({}): {}", err.category(), message);
        }
    }
}
