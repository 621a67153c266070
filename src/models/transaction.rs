use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A historical purchase line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub customer_id: String,
    pub product_id: String,
    pub date: DateTime<Utc>,
    pub quantity: u32,
    /// Category recorded at purchase time; the catalog category is used when absent
    pub category: Option<String>,
    pub total_amount: Option<f64>,
    pub store_id: Option<String>,
}

impl Transaction {
    pub fn new(
        customer_id: impl Into<String>,
        product_id: impl Into<String>,
        date: DateTime<Utc>,
        quantity: u32,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            product_id: product_id.into(),
            date,
            quantity,
            category: None,
            total_amount: None,
            store_id: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}
