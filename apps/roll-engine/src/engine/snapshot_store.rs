//! Current-snapshot holder with atomic replacement.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::PositionSnapshot;
use crate::ports::{BrokerError, PositionSource};

/// Holds the most recent position snapshot.
///
/// `refresh` replaces the snapshot wholesale on success and leaves the
/// prior one untouched on failure, so readers never observe a partial
/// or torn update.
#[derive(Debug)]
pub struct SnapshotStore<P> {
    source: Arc<P>,
    fetch_timeout: Duration,
    current: Option<PositionSnapshot>,
}

impl<P: PositionSource> SnapshotStore<P> {
    /// Create an empty store over the given position source.
    pub const fn new(source: Arc<P>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            fetch_timeout,
            current: None,
        }
    }

    /// The current snapshot, if one has been captured.
    #[must_use]
    pub const fn current(&self) -> Option<&PositionSnapshot> {
        self.current.as_ref()
    }

    /// Fetch a fresh snapshot from the broker.
    ///
    /// # Errors
    ///
    /// Returns the broker error on fetch failure or timeout; the
    /// previously held snapshot is retained either way.
    pub async fn refresh(&mut self) -> Result<&PositionSnapshot, BrokerError> {
        let fetched = match timeout(self.fetch_timeout, self.source.fetch_positions()).await {
            Ok(Ok(positions)) => positions,
            Ok(Err(err)) => {
                warn!(error = %err, "position fetch failed, keeping previous snapshot");
                return Err(err);
            }
            Err(_) => {
                warn!("position fetch timed out, keeping previous snapshot");
                return Err(BrokerError::Timeout);
            }
        };

        debug!(positions = fetched.len(), "position snapshot refreshed");
        Ok(self.current.insert(PositionSnapshot::new(fetched)))
    }
}
