//! Lecture des journaux de la passerelle et déclenchement des bannissements
//!
//! Chaque cycle lit une fenêtre de temps (24 h au premier cycle réussi du
//! processus, puis l'intervalle courant avec un chevauchement), ne garde que
//! les entrées postérieures au curseur et les traite par identifiant
//! croissant. Le curseur n'avance qu'en fin de cycle réussi.

use super::scheduler::PeriodicTask;
use crate::config::Config;
use crate::engine::{BanEnforcer, BanOutcome, RuleEvaluator};
use crate::error::Result;
use crate::models::{LogEntry, Resource};
use crate::pangolin::{ApiSettings, PolicyClient};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Bilan d'un cycle de lecture
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PollReport {
    /// Entrées renvoyées par la passerelle
    pub fetched: usize,
    /// Entrées postérieures au curseur
    pub new_entries: usize,
    pub bans: usize,
    pub already_banned: usize,
    pub whitelisted: usize,
    pub unknown_resources: usize,
    /// Règles désactivées pendant le cycle (plafond de priorité)
    pub disabled_rules: Vec<i64>,
    /// Curseur après le cycle
    pub cursor: i64,
}

pub struct LogWatcher {
    store: Store,
    client: Arc<dyn PolicyClient>,
    enforcer: BanEnforcer,
    evaluator: RuleEvaluator,
    caught_up: bool,
}

impl LogWatcher {
    pub fn new(store: Store, client: Arc<dyn PolicyClient>) -> Self {
        let enforcer = BanEnforcer::new(store.clone(), client.clone());
        Self {
            store,
            client,
            enforcer,
            evaluator: RuleEvaluator::new(),
            caught_up: false,
        }
    }

    /// Fenêtre de lecture pour un cycle se terminant à `end`
    fn window(&self, config: &Config, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let span = if self.caught_up {
            // Jamais plus court que deux intervalles, sinon des entrées échapperaient
            let interval = config.poll_interval().as_secs() as i64;
            ChronoDuration::seconds(config.poll_overlap_secs.max(2 * interval))
        } else {
            ChronoDuration::hours(config.initial_lookback_hours)
        };
        (end - span, end)
    }

    /// Exécute un cycle complet de lecture
    pub async fn poll_once(&mut self, config: &Config) -> Result<PollReport> {
        let api = ApiSettings::from(config);
        let (start, end) = self.window(config, Utc::now());

        let entries = self.client.fetch_logs(&api, start, end).await?;
        let cursor = self.store.cursor()?;
        let mut report = PollReport {
            fetched: entries.len(),
            cursor,
            ..Default::default()
        };

        let fresh = fresh_entries(entries, cursor);
        report.new_entries = fresh.len();
        if fresh.is_empty() {
            debug!("Aucune nouvelle entrée de journal (curseur {})", cursor);
            self.caught_up = true;
            return Ok(report);
        }
        info!("{} nouvelle(s) entrée(s) de journal à analyser", fresh.len());

        let mut rules = self.store.active_rules()?;
        self.evaluator.prepare(&rules);

        let resources: HashMap<i64, Resource> = self
            .store
            .resources()?
            .into_iter()
            .map(|resource| (resource.remote_id, resource))
            .collect();

        let whitelist: HashSet<String> = if config.honor_whitelist {
            self.store
                .whitelisted_ips()?
                .into_iter()
                .map(|entry| entry.ip)
                .collect()
        } else {
            HashSet::new()
        };

        let mut last_id = cursor;
        for entry in &fresh {
            last_id = last_id.max(entry.id);

            if whitelist.contains(entry.ip.trim()) {
                debug!("IP {} en liste blanche, entrée {} ignorée", entry.ip, entry.id);
                report.whitelisted += 1;
                continue;
            }

            let resource = resources.get(&entry.resource_id);
            let Some(rule) = self
                .evaluator
                .first_match(&rules, entry, resource.map(|r| r.id))
            else {
                continue;
            };

            let Some(resource) = resource else {
                warn!(
                    "Ressource distante {} ({}) inconnue localement, entrée {} ignorée. Lancez une synchronisation des ressources.",
                    entry.resource_id, entry.resource_name, entry.id
                );
                report.unknown_resources += 1;
                continue;
            };

            let reason = format!("Règle : {} (chemin : {})", rule.name, entry.path);
            match self
                .enforcer
                .enforce(&api, config, &entry.ip, resource, rule, &reason)
                .await
            {
                Ok(BanOutcome::Banned(_)) => report.bans += 1,
                Ok(BanOutcome::AlreadyBanned) => report.already_banned += 1,
                Err(e) => {
                    if let Some(rule_id) = e.disabled_rule() {
                        // Règle désactivée en base: plus aucune correspondance ce cycle
                        if let Some(disabled) = rules.iter_mut().find(|r| r.id == rule_id) {
                            disabled.is_active = false;
                        }
                        report.disabled_rules.push(rule_id);
                        continue;
                    }
                    error!(
                        "Échec du bannissement de l'IP {} sur {} (entrée {}): {}",
                        entry.ip, resource.name, entry.id, e
                    );
                    return Err(e);
                }
            }
        }

        self.store.set_cursor(last_id)?;
        self.caught_up = true;
        report.cursor = last_id;

        info!(
            "Cycle terminé: {} entrée(s), {} bannissement(s), {} déjà bannie(s), curseur {}",
            report.new_entries, report.bans, report.already_banned, last_id
        );
        Ok(report)
    }
}

/// Entrées postérieures au curseur, triées et sans doublon
fn fresh_entries(entries: Vec<LogEntry>, cursor: i64) -> Vec<LogEntry> {
    let mut fresh: Vec<LogEntry> = entries.into_iter().filter(|e| e.id > cursor).collect();
    fresh.sort_by_key(|e| e.id);
    fresh.dedup_by_key(|e| e.id);
    fresh
}

#[async_trait]
impl PeriodicTask for LogWatcher {
    fn name(&self) -> &'static str {
        "lecture des journaux"
    }

    fn interval(&self, config: &Config) -> Duration {
        config.poll_interval()
    }

    async fn run_cycle(&mut self, config: &Config) -> anyhow::Result<()> {
        self.poll_once(config).await?;
        Ok(())
    }
}
