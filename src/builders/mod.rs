//! Assembly of services from configuration.

pub mod service_builder;

pub use service_builder::{
    build_queue, build_service, build_service_with, build_store, DefaultService, TASK_UNIQUE_KEY,
};
