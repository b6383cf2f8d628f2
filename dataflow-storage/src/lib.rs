//! # Dataflow Storage
//!
//! Warehouse side of the ETL orchestrator: the [`Warehouse`] backend seam,
//! its ClickHouse and in-memory implementations, the [`WarehouseLoader`]
//! that creates tables and applies write modes, and the [`QueryRunner`]
//! for saved statements.

pub mod clickhouse;
pub mod in_memory;
pub mod loader;
pub mod query_runner;
pub mod warehouse;

pub use self::clickhouse::{create_client, health_check, ClickHouseConfig, ClickHouseWarehouse};
pub use in_memory::InMemoryWarehouse;
pub use loader::WarehouseLoader;
pub use query_runner::QueryRunner;
pub use warehouse::{LoadBatch, Warehouse};
