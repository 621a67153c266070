//! Per-customer product recommendations for a grocery catalog.
//!
//! Every catalog product is scored on five weighted signals (category
//! affinity, repurchase timing, recent browsing intent, global popularity and
//! random exploration), filtered by business rules, and one product is drawn
//! from the best remaining candidates. Products recently shown to a customer
//! are held back so successive calls vary.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

pub use error::{AppError, AppResult};
