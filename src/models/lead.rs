use serde::{Deserialize, Serialize};

/// Hard cap on the number of tags a lead can carry.
/// The CRM truncates anything beyond this, so we enforce it at the source.
pub const MAX_TAGS: usize = 30;

/// Authoritative shipping state for a lead.
///
/// Tags like `shippo_label_created` and `needs_shipping` are still written
/// for CRM compatibility, but this enum is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    None,
    LabelCreated,
    NotAllowed,
    NeedsAttention,
}

impl ShippingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LabelCreated => "label_created",
            Self::NotAllowed => "not_allowed",
            Self::NeedsAttention => "needs_attention",
        }
    }
}

impl std::str::FromStr for ShippingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "label_created" => Ok(Self::LabelCreated),
            "not_allowed" => Ok(Self::NotAllowed),
            "needs_attention" => Ok(Self::NeedsAttention),
            _ => Err(format!("Unknown shipping status: {}", s)),
        }
    }
}

impl std::fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective or paying customer captured from the funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    /// Normalized label set, capped at `MAX_TAGS`. Non-authoritative.
    pub tags: Vec<String>,
    pub funnel_step: Option<String>,
    /// Product key of the plan the lead bought or intends to buy.
    pub intent_plan: Option<String>,
    pub payment_provider: Option<String>,
    /// Provider order id of the payment that marked this lead paid.
    pub payment_id: Option<String>,
    pub paid_at: Option<i64>,
    /// Destination address snapshot as sent to the shipping provider.
    pub shipping_to: Option<serde_json::Value>,
    pub shipping_label_url: Option<String>,
    pub shipping_tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
    pub shipping_servicelevel: Option<String>,
    pub shipping_status: ShippingStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Lead {
    /// Whether this lead was already fulfilled for the given provider order.
    ///
    /// This check is independent of the webhook event ledger: the approval
    /// and capture deliveries for one order arrive under different event ids,
    /// so the ledger alone cannot prevent double fulfillment.
    pub fn already_marked_paid(&self, provider: &str, order_id: &str) -> bool {
        self.paid_at.is_some()
            && self.payment_provider.as_deref() == Some(provider)
            && self.payment_id.as_deref() == Some(order_id)
    }

    /// Whether a shipping label already exists for this lead.
    ///
    /// Checks the persisted label fields and the legacy label tags so that
    /// leads migrated from the CRM are not shipped twice.
    pub fn has_shipping_label(&self) -> bool {
        self.shipping_label_url.is_some()
            || self.shipping_tracking_number.is_some()
            || self
                .tags
                .iter()
                .any(|t| t == "shippo_label_created" || t == "shippo_label")
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLead {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
}

/// Shipping label details persisted after a successful purchase.
#[derive(Debug, Clone)]
pub struct ShippingLabel {
    pub label_url: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub servicelevel: Option<String>,
    pub to_address: serde_json::Value,
}

/// Normalize a tag: lowercase, anything outside `[a-z0-9_-]` becomes `_`.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Merge new tags into an existing set: normalize, dedupe, preserve order,
/// cap at `MAX_TAGS`.
pub fn merge_tags<S: AsRef<str>>(existing: &[String], new: &[S]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    for tag in new {
        let normalized = normalize_tag(tag.as_ref());
        if normalized.is_empty() {
            continue;
        }
        if !merged.iter().any(|t| t == &normalized) {
            merged.push(normalized);
        }
    }
    merged.truncate(MAX_TAGS);
    merged
}
