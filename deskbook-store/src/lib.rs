pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod events;
pub mod memory_repo;
pub mod redis_repo;
pub mod reservation_repo;

pub use catalog_repo::PgCatalogRepository;
pub use database::DbClient;
pub use events::EventRelay;
pub use memory_repo::MemoryStore;
pub use redis_repo::RedisClient;
pub use reservation_repo::PgReservationRepository;
