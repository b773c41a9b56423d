//! Background tasks for the Voxa server.
//!
//! Includes:
//! - Evicting idle conversation sessions.
//! - Provisioning the fallback audio clip at startup.

use std::sync::Arc;
use tokio::time::{sleep, Duration};
use voxa_conversation::ConversationStore;
use voxa_pipeline::FallbackProvider;
use voxa_voice::Synthesizer;

/// Starts the idle session eviction task.
///
/// Runs indefinitely, dropping sessions untouched for `idle_ttl_secs` every
/// `sweep_interval_secs`. Sessions with an in-flight request are kept.
pub async fn start_eviction_task(
    store: Arc<dyn ConversationStore>,
    idle_ttl_secs: u64,
    sweep_interval_secs: u64,
) {
    if idle_ttl_secs == 0 {
        tracing::warn!("session eviction disabled (idle_ttl_secs=0)");
        return;
    }

    let ttl = Duration::from_secs(idle_ttl_secs);
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tracing::info!(
        idle_ttl_secs,
        sweep_interval_secs = interval.as_secs(),
        "starting session eviction task"
    );

    loop {
        sleep(interval).await;

        let evicted = store.evict_idle(ttl);
        if evicted > 0 {
            tracing::info!(
                count = evicted,
                remaining = store.session_count(),
                "evicted idle sessions"
            );
        }
    }
}

/// Generates the fallback clip once, bounded by `timeout`.
///
/// Failure is logged and leaves degraded responses without audio.
pub async fn provision_fallback(
    fallback: Arc<FallbackProvider>,
    synthesizer: Arc<dyn Synthesizer>,
    voice_id: String,
    timeout: Duration,
) {
    let http = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "failed to build http client for fallback audio");
            return;
        }
    };

    match tokio::time::timeout(
        timeout,
        fallback.provision(synthesizer.as_ref(), &voice_id, &http),
    )
    .await
    {
        Ok(Ok(url)) => tracing::info!(url = %url, "fallback audio ready"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "fallback audio unavailable, degraded replies carry no audio")
        }
        Err(_) => tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "fallback audio provisioning timed out"
        ),
    }
}
