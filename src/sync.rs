//! CRM lead sync support.
//!
//! When configured via `LEAD_SYNC_WEBHOOK_URL`, leadpay notifies the CRM
//! after a lead changes (payment, tags, shipping). The sync is strictly
//! best-effort: a dead CRM must never fail a payment webhook.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

/// Retry delays in milliseconds for the sync webhook.
/// Quick retries (100ms, 200ms) to avoid blocking the request flow.
const SYNC_RETRY_DELAYS: &[u64] = &[100, 200];

/// Sync event payload (owned version for async spawning).
#[derive(Debug, Clone, Serialize)]
pub struct LeadSyncEvent {
    /// Lead to re-sync. The CRM pulls the full record itself.
    pub lead_id: String,
    /// What triggered the sync: "paid", "tags", "shipping".
    pub reason: String,
    /// Unix timestamp
    pub timestamp: i64,
}

/// Spawn a fire-and-forget lead sync event.
///
/// If sync is not configured, this is a no-op.
/// The event is sent in a background task and failures don't affect the caller.
/// Panics in the spawned task are logged rather than silently swallowed.
pub fn spawn_lead_sync(client: Client, sync_url: Option<String>, event: LeadSyncEvent) {
    if let Some(url) = sync_url {
        let lead_id = event.lead_id.clone();
        tokio::spawn(
            AssertUnwindSafe(async move {
                send_sync_event(&client, &url, &event).await;
            })
            .catch_unwind()
            .map(move |result| {
                if let Err(panic) = result {
                    let panic_msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!("Lead sync task panicked for lead '{}': {}", lead_id, panic_msg);
                }
            }),
        );
    }
}

/// Send a sync event to the configured webhook URL.
///
/// Uses quick retries (100ms, 200ms delays). Fire-and-forget: failures are
/// logged but don't affect the main operation.
async fn send_sync_event(client: &Client, url: &str, event: &LeadSyncEvent) {
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(SYNC_RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client
            .post(url)
            .json(event)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                if attempt > 0 {
                    tracing::debug!("Lead sync webhook succeeded after {} retries", attempt);
                }
                return;
            }
            Ok(resp) => {
                tracing::debug!("Lead sync webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::debug!("Lead sync webhook failed: {}", e);
            }
        }
    }

    tracing::warn!(
        "Lead sync webhook failed after {} attempts for lead {}",
        SYNC_RETRY_DELAYS.len() + 1,
        event.lead_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_are_quick() {
        // Total max wait time should stay well under the provider's
        // webhook timeout so retries never cause a redelivery storm.
        let total_delay: u64 = SYNC_RETRY_DELAYS.iter().sum();
        assert!(total_delay < 500, "Retry delays should be quick");
    }

    #[test]
    fn test_sync_event_serialization() {
        let event = LeadSyncEvent {
            lead_id: "8b7d2c6e-1d8a-4a2b-9f3e-2c1d5e6f7a8b".to_string(),
            reason: "paid".to_string(),
            timestamp: 1234567890,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"lead_id\":\"8b7d2c6e-1d8a-4a2b-9f3e-2c1d5e6f7a8b\""));
        assert!(json.contains("\"reason\":\"paid\""));
    }
}
