//! Species record store.
//!
//! The store is an external collaborator: the pipeline only needs a lookup
//! by class label and a cheap connectivity probe for warm-up. Both are async
//! since production stores sit behind a network call.

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CatalogError;

/// One species as stored in the catalog
///
/// `id` matches the classifier's class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub id: String,
    pub scientific_name: String,
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl SpeciesRecord {
    pub fn new(
        id: impl Into<String>,
        scientific_name: impl Into<String>,
        common_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            scientific_name: scientific_name.into(),
            common_name: common_name.into(),
            family: None,
            description: None,
            images: Vec::new(),
        }
    }
}

/// Lookup interface onto the species record store.
pub trait SpeciesCatalog: Send + Sync {
    /// Fetch the record for a class label; `Ok(None)` when it is not catalogued
    fn get_by_id<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SpeciesRecord>, CatalogError>>;

    /// Lightweight request used only to establish connectivity
    fn probe(&self) -> BoxFuture<'_, Result<(), CatalogError>>;
}

/// Catalog held entirely in memory, loadable from a JSON array of records
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    records: HashMap<String, SpeciesRecord>,
}

impl InMemoryCatalog {
    pub fn new(records: impl IntoIterator<Item = SpeciesRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let records: Vec<SpeciesRecord> =
            serde_json::from_str(json).map_err(|e| CatalogError::MalformedRecord {
                reason: e.to_string(),
            })?;
        Ok(Self::new(records))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(&path).map_err(|e| CatalogError::Unavailable {
            reason: format!("failed to read {:?}: {}", path.as_ref(), e),
        })?;
        let catalog = Self::from_json_str(&contents)?;
        log::info!(
            "[Catalog] Loaded {} species from {:?}",
            catalog.len(),
            path.as_ref()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SpeciesRecord> {
        self.records.get(id)
    }
}

impl SpeciesCatalog for InMemoryCatalog {
    fn get_by_id<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SpeciesRecord>, CatalogError>> {
        future::ready(Ok(self.records.get(id).cloned())).boxed()
    }

    fn probe(&self) -> BoxFuture<'_, Result<(), CatalogError>> {
        future::ready(Ok(())).boxed()
    }
}
