//! Levée des bannissements expirés
//!
//! La règle distante est supprimée avant la ligne locale. Si la règle n'existe
//! plus sur la passerelle, la ligne locale est supprimée seule.

use super::scheduler::PeriodicTask;
use crate::config::Config;
use crate::error::Result;
use crate::models::BannedIp;
use crate::pangolin::{ApiSettings, PolicyClient};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Bilan d'un cycle de nettoyage
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleanupReport {
    pub expired: usize,
    /// Règle distante supprimée puis ligne locale supprimée
    pub removed: usize,
    /// Règle distante introuvable, ligne locale supprimée seule
    pub drifted: usize,
    /// Conservés localement, à réessayer au prochain cycle
    pub failed: usize,
}

pub struct BanCleanup {
    store: Store,
    client: Arc<dyn PolicyClient>,
}

impl BanCleanup {
    pub fn new(store: Store, client: Arc<dyn PolicyClient>) -> Self {
        Self { store, client }
    }

    pub async fn cleanup_once(&self, config: &Config) -> Result<CleanupReport> {
        self.cleanup_at(config, Utc::now()).await
    }

    /// Lève les bannissements expirés à l'instant `now`
    pub async fn cleanup_at(&self, config: &Config, now: DateTime<Utc>) -> Result<CleanupReport> {
        let api = ApiSettings::from(config);
        let expired = self.store.expired_bans(now)?;
        let mut report = CleanupReport {
            expired: expired.len(),
            ..Default::default()
        };

        if expired.is_empty() {
            debug!("Aucun bannissement expiré");
            return Ok(report);
        }
        info!("{} bannissement(s) expiré(s) à lever", expired.len());

        let mut by_resource: BTreeMap<i64, Vec<BannedIp>> = BTreeMap::new();
        for ban in expired {
            by_resource.entry(ban.resource_id).or_default().push(ban);
        }

        let mut released = Vec::new();
        for (resource_id, bans) in by_resource {
            let Some(resource) = self.store.resource(resource_id)? else {
                warn!("Ressource locale {} introuvable, {} bannissement(s) supprimé(s) localement", resource_id, bans.len());
                report.drifted += bans.len();
                released.extend(bans.iter().map(|ban| ban.id));
                continue;
            };

            // Une seule lecture des règles distantes par ressource
            let remote_rules = match self.client.list_rules(&api, resource.remote_id).await {
                Ok(rules) => rules,
                Err(e) => {
                    warn!(
                        "Impossible de lister les règles de {} : {}. {} bannissement(s) conservé(s) pour le prochain cycle",
                        resource.name,
                        e,
                        bans.len()
                    );
                    report.failed += bans.len();
                    continue;
                }
            };

            let mut deleted_rules = HashSet::new();
            for ban in bans {
                let remote = remote_rules
                    .iter()
                    .find(|rule| !deleted_rules.contains(&rule.rule_id) && rule.targets_ip(&ban.ip));

                let Some(remote) = remote else {
                    warn!(
                        "Aucune règle distante pour l'IP {} sur {}, suppression locale uniquement",
                        ban.ip, resource.name
                    );
                    report.drifted += 1;
                    released.push(ban.id);
                    continue;
                };

                match self
                    .client
                    .delete_rule(&api, resource.remote_id, remote.rule_id)
                    .await
                {
                    Ok(()) => {
                        warn!("DÉBANNIE : IP {} sur {} ({})", ban.ip, resource.name, resource.full_domain);
                        deleted_rules.insert(remote.rule_id);
                        report.removed += 1;
                        released.push(ban.id);
                    }
                    Err(e) => {
                        warn!(
                            "Échec de la suppression de la règle {} (IP {}) sur {} : {}. Bannissement conservé",
                            remote.rule_id, ban.ip, resource.name, e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        self.store.delete_bans(&released)?;
        info!(
            "Nettoyage terminé: {} levé(s), {} absent(s) de la passerelle, {} en échec",
            report.removed, report.drifted, report.failed
        );
        Ok(report)
    }
}

#[async_trait]
impl PeriodicTask for BanCleanup {
    fn name(&self) -> &'static str {
        "nettoyage des bannissements"
    }

    fn interval(&self, config: &Config) -> Duration {
        config.cleanup_interval()
    }

    async fn run_cycle(&mut self, config: &Config) -> anyhow::Result<()> {
        self.cleanup_once(config).await?;
        Ok(())
    }
}
