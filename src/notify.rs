//! Presence/notification collaborator seam.
//!
//! Push delivery (WebSocket fan-out, connection registries) lives outside the
//! engine; mutation paths hand a payload to a [`Notifier`] and move on.
//! Delivery failures are the collaborator's problem, never the mutation's.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fire-and-forget delivery of an event payload to one user.
    async fn notify(&self, user_id: i32, payload: serde_json::Value);
}

/// Discards every notification. Default wiring for tests and for
/// deployments without a push tier.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _user_id: i32, _payload: serde_json::Value) {}
}

/// Logs notifications at debug level; useful while a real push collaborator
/// is not wired in.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: i32, payload: serde_json::Value) {
        log::debug!("notify user {}: {}", user_id, payload);
    }
}
