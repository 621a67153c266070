pub mod redis;
pub mod shown;
pub mod tables;

pub use self::redis::create_redis_client;
pub use self::redis::RedisShownStore;
pub use shown::{InMemoryShownStore, JsonFileShownStore, ShownStore};
pub use tables::{Dataset, SalesStats, TablePaths};
