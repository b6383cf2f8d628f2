use dataflow_core::{EtlError, Result, SourceAdapter, SourceKind, SourceSpec, TabularResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Dispatches a [`SourceSpec`] to the adapter registered for its kind.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.adapters.keys().collect();
        kinds.sort();
        f.debug_struct("AdapterRegistry").field("kinds", &kinds).finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the kind it reports, replacing any earlier
    /// adapter for that kind.
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: SourceKind) -> Result<Arc<dyn SourceAdapter>> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| EtlError::Configuration(format!("No adapter configured for {} sources", kind)))
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    pub async fn fetch(&self, source: &SourceSpec) -> Result<TabularResult> {
        let adapter = self.get(source.kind())?;
        debug!("Fetching {}", source.describe());
        adapter.fetch(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn kind(&self) -> SourceKind {
            SourceKind::File
        }

        async fn fetch(&self, _source: &SourceSpec) -> Result<TabularResult> {
            Ok(TabularResult::empty_with_columns(vec!["a".to_string()]))
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let registry = AdapterRegistry::new().with_adapter(Arc::new(Fixed));

        let result = registry
            .fetch(&SourceSpec::File {
                file_path: "x.csv".to_string(),
            })
            .await
            .unwrap();
        assert!(result.is_placeholder());

        let err = registry
            .fetch(&SourceSpec::Spreadsheet {
                worksheet_name: "w".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
    }
}
