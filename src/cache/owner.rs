//! Maintainer lookups backed by a single bulk fetch of the owner directory.

use crate::traits::{OwnerDirectory, OwnerMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// How many times the directory fetch is attempted before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(500),
        }
    }
}

/// Resolves package names to maintainers.
///
/// The directory is fetched on the first lookup and memoised for the life of
/// the resolver. Transient failures are retried per the [`RetryPolicy`];
/// exhausting the retries, or a permanent failure, leaves the resolver with
/// an empty directory so every lookup returns `""`.
pub struct OwnerResolver {
    directory: Arc<dyn OwnerDirectory>,
    policy: RetryPolicy,
    owners: OnceCell<OwnerMap>,
}

impl OwnerResolver {
    pub fn new(directory: Arc<dyn OwnerDirectory>) -> Self {
        Self {
            directory,
            policy: RetryPolicy::default(),
            owners: OnceCell::new(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn resolve_owner(&self, package_name: &str) -> String {
        let owners = self.owners.get_or_init(|| self.load()).await;
        match owners.get(package_name) {
            Some(owner) => {
                debug!(package = package_name, owner = %owner, "Owner resolved");
                owner.clone()
            }
            None => {
                debug!(package = package_name, "No owner on record");
                String::new()
            }
        }
    }

    async fn load(&self) -> OwnerMap {
        info!("Caching the owners list from the owner directory");
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.directory.fetch_owners().await {
                Ok(owners) => {
                    info!(owners = owners.len(), attempt, "Owner directory cached");
                    return owners;
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Owner directory fetch failed, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Owner directory unavailable, continuing without maintainers");
                    break;
                }
            }
        }

        OwnerMap::new()
    }
}
