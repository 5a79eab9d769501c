//! Transactional persistence for the order orchestration system.
//!
//! One [`Store`] port covers orders, inventory, suppliers, the reservation
//! ledger and the order-event outbox, so a single transaction can span all of
//! them. Two backends are provided: [`InMemoryStore`] and [`PostgresStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{InventoryRecord, OutboxRecord, Page, ReservationLine, StoreSeed, Supplier};
pub use store::{Store, StoreExt, StoreTransaction};
