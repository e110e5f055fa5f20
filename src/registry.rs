//! ソースIDからドライバーを引く登録表

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::capterra::CapterraSource;
use crate::config::EngineSettings;
use crate::error::ScraperError;
use crate::g2::G2Source;
use crate::model::SourceId;
use crate::traits::ReviewSource;
use crate::transport::Transport;
use crate::trustradius::TrustRadiusSource;

#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceId, Arc<dyn ReviewSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みの3ソースを同じTransportで登録
    pub fn with_default_sources(transport: Arc<dyn Transport>) -> Self {
        Self::from_settings(transport, &EngineSettings::default())
    }

    /// 組み込みの3ソースを登録（検索間隔は設定に従う）
    pub fn from_settings(transport: Arc<dyn Transport>, settings: &EngineSettings) -> Self {
        let delay = settings.search_delay;
        let mut registry = Self::new();
        registry.register(Arc::new(
            G2Source::new(transport.clone()).with_search_delay(delay),
        ));
        registry.register(Arc::new(
            CapterraSource::new(transport.clone()).with_search_delay(delay),
        ));
        registry.register(Arc::new(
            TrustRadiusSource::new(transport).with_search_delay(delay),
        ));
        registry
    }

    /// 登録（同じIDがあれば置き換えて古い方を返す）
    pub fn register(&mut self, source: Arc<dyn ReviewSource>) -> Option<Arc<dyn ReviewSource>> {
        self.sources.insert(source.id(), source)
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn ReviewSource>> {
        self.sources.get(&id).cloned()
    }

    /// 名前で検索（大文字小文字は区別しない）
    pub fn get_by_name(&self, name: &str) -> Result<Arc<dyn ReviewSource>, ScraperError> {
        let id: SourceId = name.parse()?;
        self.get(id).ok_or_else(|| {
            ScraperError::Configuration(format!("ソースが登録されていません: {}", id))
        })
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.sources.keys().copied().collect()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn test_default_sources() {
        let registry = SourceRegistry::with_default_sources(Arc::new(MockTransport::new()));
        assert_eq!(registry.ids(), SourceId::ALL.to_vec());

        for id in SourceId::ALL {
            assert_eq!(registry.get(id).map(|s| s.id()), Some(id));
        }
        assert_eq!(
            registry.get_by_name("TrustRadius").map(|s| s.id()).ok(),
            Some(SourceId::TrustRadius)
        );
    }

    #[test]
    fn test_lookup_failures() {
        let mut registry = SourceRegistry::new();
        assert!(matches!(
            registry.get_by_name("yelp"),
            Err(ScraperError::Configuration(_))
        ));
        assert!(matches!(
            registry.get_by_name("g2"),
            Err(ScraperError::Configuration(_))
        ));

        let transport = Arc::new(MockTransport::new());
        assert!(registry.register(Arc::new(G2Source::new(transport.clone()))).is_none());
        let replaced = registry.register(Arc::new(
            G2Source::new(transport).with_base_url("https://mirror.test"),
        ));
        assert!(replaced.is_some());
        assert_eq!(registry.ids(), vec![SourceId::G2]);
    }
}
