pub mod engine;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod merger;
pub mod model;
pub mod planner;
pub mod store;
