// Application layer - Services that own state and drive the adapters
pub mod clock;
pub mod ingestion_service;
pub mod price_scheduler;
pub mod price_service;
pub mod price_source;
pub mod telemetry_feed;
pub mod telemetry_state;
