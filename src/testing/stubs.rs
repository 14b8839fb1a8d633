//! Stub collaborators with call counters.
//!
//! The backends stand in for a trained artifact; `CountingCatalog` wraps an
//! [`InMemoryCatalog`] so tests can observe how often the pipeline reaches
//! the record store and can simulate a slow or unreachable one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::analysis::{AudioFeatures, InferenceBackend};
use crate::catalog::{InMemoryCatalog, SpeciesCatalog, SpeciesRecord};
use crate::error::{CatalogError, InferenceError};

/// Backend returning the same probability vector for every input
pub struct FixedBackend {
    labels: Vec<String>,
    output: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedBackend {
    pub fn new(labels: Vec<String>, output: Vec<f32>) -> Self {
        Self {
            labels,
            output,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `run` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceBackend for FixedBackend {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn run(&self, _features: &AudioFeatures) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Backend whose output is never finite
pub struct NonFiniteBackend {
    labels: Vec<String>,
}

impl NonFiniteBackend {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

impl InferenceBackend for NonFiniteBackend {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn run(&self, _features: &AudioFeatures) -> Result<Vec<f32>, InferenceError> {
        Ok(vec![f32::NAN; self.labels.len()])
    }
}

/// Backend that blocks its thread for `delay` before delegating
pub struct SlowBackend<B> {
    inner: B,
    delay: Duration,
}

impl<B: InferenceBackend> SlowBackend<B> {
    pub fn new(inner: B, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<B: InferenceBackend> InferenceBackend for SlowBackend<B> {
    fn labels(&self) -> &[String] {
        self.inner.labels()
    }

    fn run(&self, features: &AudioFeatures) -> Result<Vec<f32>, InferenceError> {
        std::thread::sleep(self.delay);
        self.inner.run(features)
    }
}

/// Catalog wrapper counting probes and lookups
pub struct CountingCatalog {
    inner: InMemoryCatalog,
    probes: AtomicUsize,
    lookups: AtomicUsize,
    latency: Option<Duration>,
    unavailable: bool,
}

impl CountingCatalog {
    pub fn new(inner: InMemoryCatalog) -> Self {
        Self {
            inner,
            probes: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            latency: None,
            unavailable: false,
        }
    }

    /// Delay every request by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every request with [`CatalogError::Unavailable`]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<(), CatalogError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable {
            return Err(CatalogError::Unavailable {
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl SpeciesCatalog for CountingCatalog {
    fn get_by_id<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SpeciesRecord>, CatalogError>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        async move {
            self.respond().await?;
            Ok(self.inner.get(id).cloned())
        }
        .boxed()
    }

    fn probe(&self) -> BoxFuture<'_, Result<(), CatalogError>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.respond().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counting_catalog_counts_and_fails() {
        let catalog = CountingCatalog::new(InMemoryCatalog::new(vec![SpeciesRecord::new(
            "parus_major",
            "Parus major",
            "Great tit",
        )]));
        assert!(catalog.probe().await.is_ok());
        let record = catalog.get_by_id("parus_major").await.unwrap();
        assert_eq!(record.unwrap().common_name, "Great tit");
        assert_eq!(catalog.probes(), 1);
        assert_eq!(catalog.lookups(), 1);

        let offline = CountingCatalog::new(InMemoryCatalog::default()).unavailable();
        assert!(matches!(
            offline.get_by_id("parus_major").await,
            Err(CatalogError::Unavailable { .. })
        ));
    }
}
