//! Wiring of the pipeline components from configuration

use crate::chat::ChatService;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::db::ProfileStore;
use crate::error::{ArgoError, Result};
use crate::executor::QueryExecutor;
use crate::filter::{Filter, FilterNormalizer};
use crate::ingestion::{IngestionNormalizer, Ingestor};
use crate::llm::TextGenerator;
use crate::observability::QueryLog;
use crate::profile::ProfileRecord;
use crate::summarizer::ResultSummarizer;
use crate::translator::FilterTranslator;
use std::sync::Arc;
use std::time::Duration;

/// Everything a request handler needs
pub struct App {
    pub config: AppConfig,
    pub store: Arc<dyn ProfileStore>,
    pub ingestor: Ingestor,
    pub chat: ChatService,
}

impl App {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ProfileStore>,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ingestor = Ingestor::new(
            IngestionNormalizer::new(config.ingest_time_unit, clock),
            Arc::clone(&store),
            config.store_timeout,
        );
        let chat = ChatService::new(
            FilterTranslator::new(Arc::clone(&generator), config.llm_timeout),
            FilterNormalizer::new(config.proximity_tolerance),
            QueryExecutor::new(Arc::clone(&store), config.result_limit, config.store_timeout),
            ResultSummarizer::new(generator, config.llm_timeout),
            Arc::new(QueryLog::new(config.history_size)),
        );
        Self {
            config,
            store,
            ingestor,
            chat,
        }
    }

    /// Every stored profile, uncapped.
    pub async fn all_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let timeout: Duration = self.config.store_timeout;
        tokio::time::timeout(timeout, self.store.find(&Filter::new(), None))
            .await
            .map_err(|_| ArgoError::Store(format!("listing profiles timed out after {}s", timeout.as_secs())))?
    }
}
