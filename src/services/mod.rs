pub mod qr;
pub mod reconciler;
pub mod redis_store;
pub mod sessions;
pub mod store;

pub use qr::make_qrcode;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use redis_store::RedisTransactionStore;
pub use sessions::SessionStore;
pub use store::{InMemoryTransactionStore, TransactionStore};
