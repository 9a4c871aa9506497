//! External collaborators consumed by the hub

pub mod catalog;

pub use catalog::{CatalogData, CatalogProvider, StaticCatalog};
