use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of browsing interaction, ordered by purchase intent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    View,
    Click,
    AddToCart,
    /// Any event type the catalog does not know about
    #[serde(other)]
    Unknown,
}

impl EventType {
    /// Parses an event type as written in the interaction table
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "view" => EventType::View,
            "click" => EventType::Click,
            "add_to_cart" => EventType::AddToCart,
            _ => EventType::Unknown,
        }
    }
}

/// A single clickstream event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionEvent {
    pub customer_id: String,
    pub session_id: Option<String>,
    pub event_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub page_category: Option<String>,
    pub device_type: Option<String>,
    /// Events without a product (search pages, category listings) carry no intent signal
    pub product_id: Option<String>,
}

impl InteractionEvent {
    pub fn new(
        customer_id: impl Into<String>,
        product_id: Option<&str>,
        timestamp: DateTime<Utc>,
        event_type: EventType,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            session_id: None,
            event_id: None,
            timestamp,
            event_type,
            page_category: None,
            device_type: None,
            product_id: product_id.map(str::to_string),
        }
    }
}
