use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{AppError, AppResult};
use crate::models::{EventType, InteractionEvent, Product, Transaction};

/// Locations of the three input tables
#[derive(Debug, Clone, PartialEq)]
pub struct TablePaths {
    pub products: PathBuf,
    pub transactions: PathBuf,
    pub interactions: PathBuf,
}

/// Typed, per-customer indexed view over the catalog, transactions and interactions
///
/// Read-only once built. Global sales statistics are computed on first use and
/// shared by every customer scored against the same dataset.
#[derive(Debug)]
pub struct Dataset {
    products: Vec<Product>,
    transactions: Vec<Transaction>,
    events: Vec<InteractionEvent>,
    product_index: HashMap<String, usize>,
    transactions_by_customer: HashMap<String, Vec<usize>>,
    events_by_customer: HashMap<String, Vec<usize>>,
    customer_order: Vec<String>,
    sales: OnceLock<SalesStats>,
}

/// Catalog-wide purchase counts used by the popularity signal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesStats {
    pub unique_customers: HashMap<String, usize>,
    pub total_quantity: HashMap<String, u64>,
    /// Largest unique-customer count over catalog products
    pub max_unique_customers: usize,
    /// Largest total quantity over catalog products
    pub max_total_quantity: u64,
}

impl Dataset {
    pub fn new(
        products: Vec<Product>,
        transactions: Vec<Transaction>,
        events: Vec<InteractionEvent>,
    ) -> Self {
        let mut unique_products = Vec::with_capacity(products.len());
        let mut product_index = HashMap::with_capacity(products.len());
        for product in products {
            if product_index.contains_key(&product.id) {
                tracing::warn!(product_id = %product.id, "Duplicate product id in catalog, keeping first");
                continue;
            }
            product_index.insert(product.id.clone(), unique_products.len());
            unique_products.push(product);
        }

        let mut transactions_by_customer: HashMap<String, Vec<usize>> = HashMap::new();
        let mut customer_order = Vec::new();
        for (idx, txn) in transactions.iter().enumerate() {
            let entry = transactions_by_customer
                .entry(txn.customer_id.clone())
                .or_insert_with(|| {
                    customer_order.push(txn.customer_id.clone());
                    Vec::new()
                });
            entry.push(idx);
        }
        // Stable sort keeps file order for purchases on the same day
        for indices in transactions_by_customer.values_mut() {
            indices.sort_by_key(|&idx| transactions[idx].date);
        }

        let mut events_by_customer: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, event) in events.iter().enumerate() {
            events_by_customer
                .entry(event.customer_id.clone())
                .or_default()
                .push(idx);
        }
        for indices in events_by_customer.values_mut() {
            indices.sort_by_key(|&idx| events[idx].timestamp);
        }

        Self {
            products: unique_products,
            transactions,
            events,
            product_index,
            transactions_by_customer,
            events_by_customer,
            customer_order,
            sales: OnceLock::new(),
        }
    }

    /// Loads all three tables from CSV files
    pub fn load(paths: &TablePaths) -> AppResult<Self> {
        let products = load_products(&paths.products)?;
        tracing::info!(count = products.len(), path = %paths.products.display(), "Loaded products");

        let transactions = load_transactions(&paths.transactions)?;
        tracing::info!(
            count = transactions.len(),
            path = %paths.transactions.display(),
            "Loaded transactions"
        );

        let events = load_interactions(&paths.interactions)?;
        tracing::info!(
            count = events.len(),
            path = %paths.interactions.display(),
            "Loaded interaction events"
        );

        Ok(Self::new(products, transactions, events))
    }

    /// Catalog in file order, duplicates removed
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, product_id: &str) -> Option<&Product> {
        self.product_index.get(product_id).map(|&idx| &self.products[idx])
    }

    /// The customer's purchases, oldest first
    pub fn customer_transactions<'a>(
        &'a self,
        customer_id: &str,
    ) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.transactions_by_customer
            .get(customer_id)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.transactions[idx])
    }

    /// The customer's interaction events, oldest first
    pub fn customer_events<'a>(
        &'a self,
        customer_id: &str,
    ) -> impl Iterator<Item = &'a InteractionEvent> + 'a {
        self.events_by_customer
            .get(customer_id)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.events[idx])
    }

    /// Customers with at least one transaction, in order of first appearance
    pub fn customer_ids(&self) -> &[String] {
        &self.customer_order
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Category of a purchase, falling back to the catalog when the row has none
    pub fn transaction_category<'a>(&'a self, txn: &'a Transaction) -> Option<&'a str> {
        txn.category
            .as_deref()
            .or_else(|| self.product(&txn.product_id).and_then(|p| p.category.as_deref()))
    }

    pub fn sales_stats(&self) -> &SalesStats {
        self.sales.get_or_init(|| {
            let stats = SalesStats::compute(&self.products, &self.transactions);
            tracing::debug!(
                max_unique_customers = stats.max_unique_customers,
                max_total_quantity = stats.max_total_quantity,
                "Computed sales statistics"
            );
            stats
        })
    }
}

impl SalesStats {
    fn compute(products: &[Product], transactions: &[Transaction]) -> Self {
        let mut buyers: HashMap<&str, HashSet<&str>> = HashMap::new();
        let mut total_quantity: HashMap<String, u64> = HashMap::new();

        for txn in transactions {
            buyers
                .entry(txn.product_id.as_str())
                .or_default()
                .insert(txn.customer_id.as_str());
            *total_quantity.entry(txn.product_id.clone()).or_default() += u64::from(txn.quantity);
        }

        let unique_customers: HashMap<String, usize> = buyers
            .into_iter()
            .map(|(product_id, customers)| (product_id.to_string(), customers.len()))
            .collect();

        let max_unique_customers = products
            .iter()
            .filter_map(|p| unique_customers.get(&p.id))
            .copied()
            .max()
            .unwrap_or(0);
        let max_total_quantity = products
            .iter()
            .filter_map(|p| total_quantity.get(&p.id))
            .copied()
            .max()
            .unwrap_or(0);

        Self {
            unique_customers,
            total_quantity,
            max_unique_customers,
            max_total_quantity,
        }
    }
}

// ============================================================================
// CSV parsing
// ============================================================================

/// Header lookup for one table; surplus columns are simply never asked for
struct Columns {
    table: &'static str,
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(table: &'static str, headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_ascii_lowercase(), idx))
            .collect();
        Self { table, index }
    }

    fn required(&self, name: &str) -> AppResult<usize> {
        self.index.get(name).copied().ok_or_else(|| {
            AppError::Data(format!("{} table is missing required column '{}'", self.table, name))
        })
    }

    /// A column the table is useless without
    ///
    /// Returns `None` after a warning; the caller then drops the whole table
    /// and the signals built on it score zero.
    fn key(&self, name: &str) -> Option<usize> {
        let idx = self.index.get(name).copied();
        if idx.is_none() {
            tracing::warn!(table = self.table, column = name, "Key column missing, ignoring the table");
        }
        idx
    }

    fn optional(&self, name: &str) -> Option<usize> {
        let idx = self.index.get(name).copied();
        if idx.is_none() {
            tracing::warn!(table = self.table, column = name, "Column missing, treating values as absent");
        }
        idx
    }

    /// Like `optional`, but for columns the format lists as optional
    fn extra(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader)
}

/// Parses a date or timestamp; naive values are taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_quantity(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|q| q.is_finite() && *q >= 0.0)
            .map(|q| q.round() as u32)
    })
}

pub fn load_products(path: &Path) -> AppResult<Vec<Product>> {
    read_products(std::fs::File::open(path)?)
}

pub fn load_transactions(path: &Path) -> AppResult<Vec<Transaction>> {
    read_transactions(std::fs::File::open(path)?)
}

pub fn load_interactions(path: &Path) -> AppResult<Vec<InteractionEvent>> {
    read_interactions(std::fs::File::open(path)?)
}

pub fn read_products<R: Read>(reader: R) -> AppResult<Vec<Product>> {
    let mut reader = csv_reader(reader);
    let columns = Columns::new("products", reader.headers()?);

    let id_col = columns.required("product_id")?;
    let name_col = columns.optional("product_name");
    let category_col = columns.optional("product_category");
    let discounted_col = columns.optional("is_discounted");
    let stock_col = columns.optional("in_stock");
    let price_col = columns.extra("price");

    let mut products = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(table = "products", line = line + 2, error = %e, "Skipping unreadable row");
                continue;
            }
        };

        let Some(id) = cell(&record, Some(id_col)) else {
            tracing::warn!(table = "products", line = line + 2, "Skipping row without product_id");
            continue;
        };

        let flag = |idx: Option<usize>, column: &str| {
            let raw = cell(&record, idx)?;
            let parsed = parse_bool(raw);
            if parsed.is_none() {
                tracing::warn!(product_id = %id, column, value = raw, "Unparseable flag, treating as absent");
            }
            parsed
        };

        products.push(Product {
            id: id.to_string(),
            name: cell(&record, name_col).map(str::to_string),
            category: cell(&record, category_col).map(str::to_string),
            is_discounted: flag(discounted_col, "is_discounted"),
            in_stock: flag(stock_col, "in_stock"),
            price: cell(&record, price_col).and_then(|raw| raw.parse().ok()),
        });
    }

    Ok(products)
}

pub fn read_transactions<R: Read>(reader: R) -> AppResult<Vec<Transaction>> {
    let mut reader = csv_reader(reader);
    let columns = Columns::new("transactions", reader.headers()?);

    let (Some(customer_col), Some(product_col), Some(date_col)) = (
        columns.key("customer_id"),
        columns.key("product_id"),
        columns.key("date_of_transaction"),
    ) else {
        return Ok(Vec::new());
    };
    let quantity_col = columns.optional("quantity");
    let category_col = columns.optional("product_category");
    let amount_col = columns.extra("total_amount");
    let store_col = columns.extra("store_id");

    let mut transactions = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let line = line + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(table = "transactions", line, error = %e, "Skipping unreadable row");
                continue;
            }
        };

        let (Some(customer_id), Some(product_id)) =
            (cell(&record, Some(customer_col)), cell(&record, Some(product_col)))
        else {
            tracing::warn!(table = "transactions", line, "Skipping row without customer or product id");
            continue;
        };

        let Some(date) = cell(&record, Some(date_col)).and_then(parse_timestamp) else {
            tracing::warn!(table = "transactions", line, "Skipping row with unparseable date");
            continue;
        };

        // Without a quantity column every line counts as a single unit
        let quantity = match cell(&record, quantity_col) {
            Some(raw) => match parse_quantity(raw) {
                Some(quantity) => quantity,
                None => {
                    tracing::warn!(table = "transactions", line, value = raw, "Skipping row with unparseable quantity");
                    continue;
                }
            },
            None => 1,
        };

        transactions.push(Transaction {
            customer_id: customer_id.to_string(),
            product_id: product_id.to_string(),
            date,
            quantity,
            category: cell(&record, category_col).map(str::to_string),
            total_amount: cell(&record, amount_col).and_then(|raw| raw.parse().ok()),
            store_id: cell(&record, store_col).map(str::to_string),
        });
    }

    Ok(transactions)
}

pub fn read_interactions<R: Read>(reader: R) -> AppResult<Vec<InteractionEvent>> {
    let mut reader = csv_reader(reader);
    let columns = Columns::new("interactions", reader.headers()?);

    let (Some(customer_col), Some(timestamp_col), Some(type_col)) = (
        columns.key("customer_id"),
        columns.key("event_timestamp"),
        columns.key("event_type"),
    ) else {
        return Ok(Vec::new());
    };
    let session_col = columns.optional("session_id");
    let event_col = columns.optional("event_id");
    let page_col = columns.extra("page_category");
    let device_col = columns.extra("device_type");
    let product_col = columns.extra("product_id");

    let mut events = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let line = line + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(table = "interactions", line, error = %e, "Skipping unreadable row");
                continue;
            }
        };

        let Some(customer_id) = cell(&record, Some(customer_col)) else {
            tracing::warn!(table = "interactions", line, "Skipping row without customer_id");
            continue;
        };

        let Some(timestamp) = cell(&record, Some(timestamp_col)).and_then(parse_timestamp) else {
            tracing::warn!(table = "interactions", line, "Skipping row with unparseable timestamp");
            continue;
        };

        let Some(raw_type) = cell(&record, Some(type_col)) else {
            tracing::warn!(table = "interactions", line, "Skipping row without event_type");
            continue;
        };
        let event_type = EventType::parse(raw_type);
        if event_type == EventType::Unknown {
            tracing::debug!(table = "interactions", line, event_type = raw_type, "Unknown event type");
        }

        events.push(InteractionEvent {
            customer_id: customer_id.to_string(),
            session_id: cell(&record, session_col).map(str::to_string),
            event_id: cell(&record, event_col).map(str::to_string),
            timestamp,
            event_type,
            page_category: cell(&record, page_col).map(str::to_string),
            device_type: cell(&record, device_col).map(str::to_string),
            product_id: cell(&record, product_col).map(str::to_string),
        });
    }

    Ok(events)
}
