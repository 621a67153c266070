mod interaction;
mod product;
mod recommendation;
mod shown;
mod transaction;

pub use interaction::{EventType, InteractionEvent};
pub use product::Product;
pub use recommendation::{BatchRecommendation, Component, Recommendation, ScoreBreakdown};
pub use shown::ShownEntry;
pub use transaction::Transaction;
