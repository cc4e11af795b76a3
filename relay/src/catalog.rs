//! Shared catalog of installed translation directions.
//!
//! Readers take an `Arc` snapshot; a refresh builds a complete replacement
//! and swaps it in, so a session never sees a half-updated table.

use crate::error::Result;
use crate::registry::{AvailablePackage, InstalledPackage, PackageRegistry};
use arc_swap::ArcSwap;
use shared_protocol::{Language, LanguagePairs};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct LanguagePairCatalog {
    registry: Arc<dyn PackageRegistry>,
    current: ArcSwap<LanguagePairs>,
    refresh_lock: Mutex<()>, // one refresh at a time
}

impl LanguagePairCatalog {
    pub fn new(registry: Arc<dyn PackageRegistry>) -> Self {
        Self {
            registry,
            current: ArcSwap::from_pointee(LanguagePairs::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<LanguagePairs> {
        self.current.load_full()
    }

    fn publish(&self, pairs: LanguagePairs) -> Arc<LanguagePairs> {
        let pairs = Arc::new(pairs);
        self.current.store(pairs.clone());
        pairs
    }

    /// Installs every missing pair the registry offers, then republishes.
    ///
    /// Never uninstalls anything, so repeated runs converge. If the installed
    /// list cannot be read the previous snapshot stays in place and the
    /// error is returned.
    pub async fn refresh(&self) -> Result<Arc<LanguagePairs>> {
        let _guard = self.refresh_lock.lock().await;

        let installed = self.registry.list_installed().await?;
        let missing = missing_pairs(&installed);

        let mut installed_any = false;
        if !missing.is_empty() {
            debug!("{} language pairs not installed", missing.len());
            match self.registry.list_available().await {
                Ok(available) => {
                    for (from, to) in missing {
                        match find_package(&available, from, to) {
                            Some(package) => {
                                info!("Installing language package: {} to {}", from, to);
                                match self.registry.install(package).await {
                                    Ok(()) => installed_any = true,
                                    Err(e) => warn!("{}", e),
                                }
                            }
                            None => warn!("Language package not available: {} to {}", from, to),
                        }
                    }
                }
                Err(e) => warn!("cannot install missing language packages: {}", e),
            }
        }

        let installed = if installed_any {
            match self.registry.list_installed().await {
                Ok(now) => now,
                Err(e) => {
                    warn!("cannot re-read installed packages: {}", e);
                    installed
                }
            }
        } else {
            installed
        };

        let pairs = self.publish(to_pairs(&installed));
        info!("Language pair catalog holds {} pairs", pairs.pair_count());
        Ok(pairs)
    }

    /// Refreshes every `every`, starting one period from now, until shutdown.
    pub fn spawn_periodic(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh().await {
                            warn!("catalog refresh failed, keeping previous: {}", e);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}

fn installed_set(installed: &[InstalledPackage]) -> BTreeSet<(Language, Language)> {
    installed
        .iter()
        .filter_map(|p| {
            Some((
                Language::from_code(&p.from_code)?,
                Language::from_code(&p.to_code)?,
            ))
        })
        .collect()
}

fn to_pairs(installed: &[InstalledPackage]) -> LanguagePairs {
    LanguagePairs::from_pairs(installed_set(installed))
}

fn missing_pairs(installed: &[InstalledPackage]) -> Vec<(Language, Language)> {
    let have = installed_set(installed);
    Language::ALL
        .iter()
        .flat_map(|&from| Language::ALL.iter().map(move |&to| (from, to)))
        .filter(|&(from, to)| from != to && !have.contains(&(from, to)))
        .collect()
}

fn find_package(
    available: &[AvailablePackage],
    from: Language,
    to: Language,
) -> Option<&AvailablePackage> {
    available
        .iter()
        .find(|p| p.from_code == from.code() && p.to_code == to.code())
}
