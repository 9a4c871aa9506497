//! Catalog delegate
//!
//! `query` events are answered by a [`CatalogProvider`]: the read side of the
//! surrounding persistence layer (products, categories, store settings). The
//! hub only forwards the request and the reply; it never caches catalog data.
//!
//! [`StaticCatalog`] serves a `catalog.json` file from the work dir:
//!
//! ```json
//! {
//!   "products":   [{ "id": 1, "name": "Latte", "price": 4.5, "categoryId": 2 }],
//!   "categories": [{ "id": 2, "name": "Coffee" }],
//!   "settings":   { "storeOpen": true }
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::utils::{AppError, AppResult, ErrorCode};

/// Read API for catalog and settings resources
#[async_trait]
pub trait CatalogProvider: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, resource: &str, params: Option<&Value>) -> AppResult<Value>;
}

fn default_settings() -> Value {
    json!({ "storeOpen": true })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub products: Vec<Value>,
    #[serde(default)]
    pub categories: Vec<Value>,
    #[serde(default = "default_settings")]
    pub settings: Value,
}

impl Default for CatalogData {
    fn default() -> Self {
        Self {
            products: Vec::new(),
            categories: Vec::new(),
            settings: default_settings(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    data: CatalogData,
}

impl StaticCatalog {
    pub fn new(data: CatalogData) -> Self {
        Self { data }
    }

    /// Load from a JSON file; a missing file yields an empty catalog
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No catalog file, serving empty catalog");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::with_message(
                    ErrorCode::ConfigError,
                    format!("Read catalog {} failed: {e}", path.display()),
                ));
            }
        };

        let data: CatalogData = serde_json::from_str(&content).map_err(|e| {
            AppError::with_message(
                ErrorCode::ConfigError,
                format!("Invalid catalog {}: {e}", path.display()),
            )
        })?;
        tracing::info!(
            products = data.products.len(),
            categories = data.categories.len(),
            "Catalog loaded"
        );
        Ok(Self { data })
    }
}

/// `categoryId` from query params, as number or numeric string
fn category_filter(params: Option<&Value>) -> Option<Value> {
    params?.get("categoryId").filter(|v| !v.is_null()).cloned()
}

fn same_id(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), other) | (other, Value::String(s)) if !other.is_string() => {
            other.to_string() == *s
        }
        _ => a == b,
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn fetch(&self, resource: &str, params: Option<&Value>) -> AppResult<Value> {
        match resource {
            "products" => {
                let products: Vec<&Value> = match category_filter(params) {
                    Some(category) => self
                        .data
                        .products
                        .iter()
                        .filter(|p| p.get("categoryId").is_some_and(|c| same_id(c, &category)))
                        .collect(),
                    None => self.data.products.iter().collect(),
                };
                Ok(json!(products))
            }
            "categories" => Ok(json!(self.data.categories)),
            "settings" => Ok(self.data.settings.clone()),
            other => Err(AppError::not_found(format!("Catalog resource '{other}'"))),
        }
    }
}
