//! Field discovery.
//!
//! An index exposes hundreds of property fields. The catalog handed to the
//! model keeps only the allow-listed categories, grouped as
//! `category → display name → query key`.

use std::collections::BTreeMap;
use std::sync::Arc;

use modelprops_aps::{FieldDescriptor, SharedIndexService};
use modelprops_session::SessionCache;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::cache::DesignStore;
use super::error::{PropsError, PropsResult};
use super::poll::cancellable;

/// Categories advertised to the model unless configured otherwise.
pub const DEFAULT_CATEGORIES: [&str; 4] = [
    "__name__",
    "__category__",
    "Dimensions",
    "Materials and Finishes",
];

/// Allow-listed fields of one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldCatalog(BTreeMap<String, BTreeMap<String, String>>);

impl FieldCatalog {
    /// Group `fields` by category, keeping only categories in `allow`.
    ///
    /// Records missing a category, name or key are skipped. When two fields
    /// share a category and name, the later one wins.
    pub fn from_fields<S: AsRef<str>>(fields: &[FieldDescriptor], allow: &[S]) -> Self {
        let mut catalog: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for field in fields {
            let (Some(category), Some(name), Some(key)) = (&field.category, &field.name, &field.key)
            else {
                continue;
            };
            if !allow.iter().any(|c| c.as_ref() == category) {
                continue;
            }
            catalog
                .entry(category.clone())
                .or_default()
                .insert(name.clone(), key.clone());
        }
        Self(catalog)
    }

    /// Fields of one category.
    pub fn category(&self, category: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(category)
    }

    /// Category names present.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Query key for a category and display name.
    pub fn key_for(&self, category: &str, name: &str) -> Option<&str> {
        self.0.get(category)?.get(name).map(String::as_str)
    }

    /// Total number of fields.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The catalog as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

/// Builds and caches field catalogs for one design.
pub struct FieldCatalogBuilder {
    service: SharedIndexService,
    project_id: String,
    categories: Vec<String>,
    memory: SessionCache<Arc<FieldCatalog>>,
    store: DesignStore,
    design_key: String,
}

impl FieldCatalogBuilder {
    /// Create a builder.
    ///
    /// `memory` is keyed by index id and may be shared between designs;
    /// `store` and `design_key` locate the on-disk copy.
    pub fn new(
        service: SharedIndexService,
        project_id: impl Into<String>,
        memory: SessionCache<Arc<FieldCatalog>>,
        store: DesignStore,
        design_key: impl Into<String>,
    ) -> Self {
        Self {
            service,
            project_id: project_id.into(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            memory,
            store,
            design_key: design_key.into(),
        }
    }

    /// Replace the category allow-list.
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// The allow-list in use.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// The allow-listed catalog of `index_id`.
    pub async fn list_fields(
        &self,
        index_id: &str,
        cancel: &CancellationToken,
    ) -> PropsResult<Arc<FieldCatalog>> {
        if let Some(catalog) = self.memory.get(index_id).await {
            return Ok(catalog);
        }

        if let Some(catalog) = self.store.load_fields(&self.design_key, index_id).await {
            tracing::debug!(index_id, "Field catalog restored from disk");
            let catalog = Arc::new(catalog);
            self.memory.insert(index_id, Arc::clone(&catalog)).await;
            return Ok(catalog);
        }

        let raw = cancellable(cancel, async {
            self.service
                .list_fields(&self.project_id, index_id)
                .await
                .map_err(PropsError::from)
        })
        .await?;

        let catalog = FieldCatalog::from_fields(&raw, &self.categories);
        tracing::info!(
            index_id,
            raw_fields = raw.len(),
            kept_fields = catalog.len(),
            "Built field catalog"
        );

        self.store
            .save_fields(&self.design_key, index_id, &catalog)
            .await;
        let catalog = Arc::new(catalog);
        self.memory.insert(index_id, Arc::clone(&catalog)).await;
        Ok(catalog)
    }
}

impl std::fmt::Debug for FieldCatalogBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCatalogBuilder")
            .field("project_id", &self.project_id)
            .field("categories", &self.categories)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelprops_aps::MockIndexService;
    use modelprops_session::CacheConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn raw_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("__name__", "Name", "k1"),
            FieldDescriptor::new("Internal", "X", "k2"),
            FieldDescriptor::new("Dimensions", "Width", "p1"),
            FieldDescriptor::new("Dimensions", "Height", "p2"),
            FieldDescriptor {
                key: Some("k3".into()),
                ..Default::default()
            },
        ]
    }

    fn builder(service: Arc<MockIndexService>, store: DesignStore) -> FieldCatalogBuilder {
        FieldCatalogBuilder::new(
            service,
            "b.project",
            SessionCache::new(CacheConfig::new().without_ttl()),
            store,
            "design",
        )
    }

    #[test]
    fn test_catalog_filters_categories() {
        let catalog = FieldCatalog::from_fields(&raw_fields(), &DEFAULT_CATEGORIES);

        assert_eq!(
            catalog.to_json(),
            json!({
                "Dimensions": {"Height": "p2", "Width": "p1"},
                "__name__": {"Name": "k1"}
            })
        );
        assert_eq!(catalog.len(), 3);
        assert!(catalog.category("Internal").is_none());
        assert_eq!(catalog.key_for("Dimensions", "Width"), Some("p1"));
    }

    #[test]
    fn test_catalog_duplicate_name_last_wins() {
        let fields = vec![
            FieldDescriptor::new("__name__", "Name", "old"),
            FieldDescriptor::new("__name__", "Name", "new"),
        ];
        let catalog = FieldCatalog::from_fields(&fields, &["__name__"]);
        assert_eq!(catalog.key_for("__name__", "Name"), Some("new"));
    }

    #[test]
    fn test_catalog_empty_allow_list() {
        let catalog = FieldCatalog::from_fields(&raw_fields(), &[] as &[&str]);
        assert!(catalog.is_empty());
        assert_eq!(catalog.to_json(), json!({}));
    }

    #[tokio::test]
    async fn test_list_fields_fetches_once() {
        let service = Arc::new(MockIndexService::new().with_fields(raw_fields()));
        let builder = builder(Arc::clone(&service), DesignStore::disabled());
        let cancel = CancellationToken::new();

        let first = builder.list_fields("IDX-TEST", &cancel).await.unwrap();
        let second = builder.list_fields("IDX-TEST", &cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.calls().list_fields, 1);
    }

    #[tokio::test]
    async fn test_list_fields_uses_disk_copy() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(MockIndexService::new().with_fields(raw_fields()));
        let cancel = CancellationToken::new();

        builder(Arc::clone(&service), DesignStore::new(dir.path()))
            .list_fields("IDX-TEST", &cancel)
            .await
            .unwrap();
        let restored = builder(Arc::clone(&service), DesignStore::new(dir.path()))
            .list_fields("IDX-TEST", &cancel)
            .await
            .unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(service.calls().list_fields, 1);
    }

    #[tokio::test]
    async fn test_custom_categories() {
        let service = Arc::new(MockIndexService::new().with_fields(raw_fields()));
        let builder = builder(service, DesignStore::disabled())
            .with_categories(vec!["Internal".to_string()]);

        let catalog = builder
            .list_fields("IDX-TEST", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(catalog.to_json(), json!({"Internal": {"X": "k2"}}));
    }

    #[tokio::test]
    async fn test_service_failure_is_hard_error() {
        let service = Arc::new(MockIndexService::new().with_transport_failure("down"));
        let builder = builder(service, DesignStore::disabled());

        let err = builder
            .list_fields("IDX-TEST", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
    }
}
