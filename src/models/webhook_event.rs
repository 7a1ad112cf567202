use serde::{Deserialize, Serialize};

/// Processing outcome recorded on a webhook event ledger row.
///
/// Rows are inserted as `Received` and must leave that state on every exit
/// path of the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Received,
    Processed,
    Ignored,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processed => "processed",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "processed" => Ok(Self::Processed),
            "ignored" => Ok(Self::Ignored),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown event status: {}", s)),
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only ledger row for a webhook delivery.
///
/// `UNIQUE(provider, event_id)` is the idempotency boundary: a redelivery
/// is detected by the insert being a no-op, never by business-logic checks.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    pub provider: String,
    pub event_id: String,
    pub event_type: Option<String>,
    pub order_id: Option<String>,
    pub lead_id: Option<String>,
    /// Raw delivery payload, kept verbatim for replay and debugging.
    pub payload: String,
    /// Selected request headers as JSON.
    pub headers: Option<String>,
    pub status: EventStatus,
    pub processing_error: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}

#[derive(Debug)]
pub struct RecordWebhookEvent<'a> {
    pub provider: &'a str,
    pub event_id: &'a str,
    pub event_type: Option<&'a str>,
    pub payload: &'a str,
    pub headers: Option<&'a str>,
}
