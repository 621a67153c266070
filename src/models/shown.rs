use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product that was recommended to a customer at a given time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShownEntry {
    pub product_id: String,
    pub shown_at: DateTime<Utc>,
}

impl ShownEntry {
    pub fn new(product_id: impl Into<String>, shown_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product_id.into(),
            shown_at,
        }
    }

    /// Whether the entry still falls inside a window starting at `since`
    pub fn is_active(&self, since: DateTime<Utc>) -> bool {
        self.shown_at >= since
    }
}
