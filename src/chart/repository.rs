//! Fetch-and-save of chart readings.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::{ChartKind, ChartProvider, ChartReading, ChartRequest, LocalStore};
use crate::error::AstroLiveError;
use crate::live::ChartContext;
use crate::Result;

/// Ties a chart provider to the local store.
#[derive(Clone)]
pub struct ChartRepository {
    provider: Arc<dyn ChartProvider>,
    store: Arc<LocalStore>,
}

impl ChartRepository {
    pub fn new(provider: Arc<dyn ChartProvider>, store: Arc<LocalStore>) -> Self {
        Self { provider, store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Fetch all three charts and store them as one reading.
    ///
    /// Nothing is stored unless every chart is available.
    pub async fn fetch_and_save(
        &self,
        username: &str,
        request: &ChartRequest,
    ) -> Result<ChartReading> {
        let d1 = self.fetch(ChartKind::Planets, request).await?;
        let d9 = self.fetch(ChartKind::Navamsa, request).await?;
        let dasha = self.fetch(ChartKind::Dasha, request).await?;

        let reading = ChartReading {
            username: username.to_string(),
            d1_data: d1,
            d9_data: d9,
            dasha_data: dasha,
            timestamp: Utc::now(),
        };
        self.store.upsert_reading(reading.clone())?;
        info!(username, "chart reading saved");
        Ok(reading)
    }

    /// Live session context for a stored reading.
    pub fn load_context(&self, username: &str) -> Result<ChartContext> {
        self.store
            .reading(username)?
            .map(|r| r.to_context())
            .ok_or_else(|| AstroLiveError::UserNotFound(username.to_string()))
    }

    async fn fetch(&self, kind: ChartKind, request: &ChartRequest) -> Result<String> {
        self.provider
            .fetch(kind, request)
            .await
            .ok_or(AstroLiveError::ChartUnavailable(kind))
    }
}
