use std::sync::Arc;

use tracing::{debug, error, info};

use crate::db::DatabaseBackend;
use crate::error::Result;

use super::synthesizer::JourneySynthesizer;

/// Periodically regenerates cached syntheses that went stale.
#[derive(Clone)]
pub struct SynthesisRefreshManager {
    db: Arc<dyn DatabaseBackend>,
    synthesizer: JourneySynthesizer,
    interval_secs: u64,
}

impl SynthesisRefreshManager {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        synthesizer: JourneySynthesizer,
        interval_secs: u64,
    ) -> Self {
        Self {
            db,
            synthesizer,
            interval_secs,
        }
    }

    /// Run a single refresh pass.
    ///
    /// Failures on one cached entry are logged and the pass continues.
    /// Returns the number of syntheses regenerated.
    pub async fn run_once(&self) -> Result<u64> {
        let keys = self.db.list_cached_synthesis_keys().await?;
        if keys.is_empty() {
            debug!("No cached syntheses to refresh");
            return Ok(0);
        }

        let mut refreshed = 0u64;
        let mut errors = 0u64;

        for (client_id, range) in &keys {
            let cached = match self.db.get_cached_synthesis(client_id, range).await {
                Ok(Some(cached)) => cached,
                Ok(None) => continue,
                Err(e) => {
                    error!(client_id = %client_id, error = %e, "Failed to load cached synthesis");
                    errors += 1;
                    continue;
                }
            };

            match self.synthesizer.is_stale(&cached).await {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    error!(client_id = %client_id, error = %e, "Failed to check synthesis staleness");
                    errors += 1;
                    continue;
                }
            }

            match self
                .synthesizer
                .synthesize(client_id, range.start, range.end, true)
                .await
            {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    error!(client_id = %client_id, error = %e, "Failed to regenerate synthesis");
                    errors += 1;
                }
            }
        }

        info!(
            refreshed,
            errors,
            cached = keys.len(),
            "Synthesis refresh complete"
        );

        Ok(refreshed)
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }
}
