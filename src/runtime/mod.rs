//! Runtime adapter and service surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{Health, ScrapeService, TaskStatusResponse, TaskSubmitted};
pub use tokio_spawner::TokioSpawner;
