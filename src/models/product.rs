use serde::{Deserialize, Serialize};

/// A catalog product that can be recommended
///
/// Only the id is guaranteed. The remaining fields are `None` when the column
/// is missing from the catalog or the cell could not be parsed, which disables
/// the score or rule that needs them for this product only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Unique product identifier (e.g., "P001")
    pub id: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub is_discounted: Option<bool>,
    pub in_stock: Option<bool>,
    pub price: Option<f64>,
}

impl Product {
    /// Creates a non-discounted, in-stock product
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            category: Some(category.into()),
            is_discounted: Some(false),
            in_stock: Some(true),
            price: None,
        }
    }

    pub fn with_discounted(mut self, discounted: bool) -> Self {
        self.is_discounted = Some(discounted);
        self
    }

    pub fn with_in_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = Some(in_stock);
        self
    }

    /// Name shown in recommendation records
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    /// Category shown in recommendation records
    pub fn display_category(&self) -> &str {
        self.category.as_deref().unwrap_or("Unknown")
    }
}
