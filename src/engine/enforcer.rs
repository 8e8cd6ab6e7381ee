//! Application d'un bannissement
//!
//! La règle distante est créée avant l'enregistrement local: un échec de la
//! passerelle ne laisse aucune trace locale et l'entrée sera rejouée.

use super::priority::allocate_priority;
use crate::config::Config;
use crate::error::{Result, WatchdogError};
use crate::models::{BannedIp, Resource, Rule};
use crate::pangolin::{ApiSettings, CreateRuleRequest, PolicyClient};
use crate::store::Store;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, error, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Résultat d'une demande de bannissement
#[derive(Debug, Clone, PartialEq)]
pub enum BanOutcome {
    /// Un bannissement actif existe déjà pour ce couple (IP, ressource)
    AlreadyBanned,
    Banned(BannedIp),
}

pub struct BanEnforcer {
    store: Store,
    client: Arc<dyn PolicyClient>,
    // Un seul calcul de priorité + création à la fois par ressource distante
    resource_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl BanEnforcer {
    pub fn new(store: Store, client: Arc<dyn PolicyClient>) -> Self {
        Self {
            store,
            client,
            resource_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, remote_resource_id: i64) -> Arc<Mutex<()>> {
        self.resource_locks
            .entry(remote_resource_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Bannit `ip` sur la ressource au nom de la règle
    ///
    /// Renvoie `MaxPriorityReached` après avoir désactivé la règle et consigné
    /// un problème si la priorité calculée atteint le plafond de la règle.
    /// Une durée de bannissement inutilisable désactive la règle de la même
    /// façon (`BanDurationOutOfRange`), avant tout appel à la passerelle.
    pub async fn enforce(
        &self,
        api: &ApiSettings,
        config: &Config,
        ip: &str,
        resource: &Resource,
        rule: &Rule,
        reason: &str,
    ) -> Result<BanOutcome> {
        let lock = self.lock_for(resource.remote_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        if self.store.has_active_ban(ip, resource.id, now)? {
            debug!("IP {} déjà bannie sur la ressource {}, ignorée", ip, resource.name);
            return Ok(BanOutcome::AlreadyBanned);
        }

        let expires_at = config
            .ban_duration(rule.ban_duration_mins)
            .and_then(|duration| now.checked_add_signed(duration));
        let Some(expires_at) = expires_at else {
            let minutes = rule.ban_duration_mins.unwrap_or(config.default_ban_duration_mins);
            let description = format!(
                "Durée de bannissement invalide pour la règle « {} » : {} minute(s). La règle a été désactivée.",
                rule.name, minutes
            );
            self.store.disable_rule_with_problem(rule.id, &description)?;
            error!("{}", description);

            return Err(WatchdogError::BanDurationOutOfRange {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                minutes,
            });
        };

        let priority =
            allocate_priority(self.client.as_ref(), api, resource.remote_id, rule.max_priority)
                .await?;

        if let Some(ceiling) = rule.max_priority.filter(|ceiling| priority >= *ceiling) {
            let description = format!(
                "Priorité maximale atteinte pour la règle « {} » sur la ressource {} : priorité {} >= plafond {}. La règle a été désactivée.",
                rule.name, resource.name, priority, ceiling
            );
            self.store.disable_rule_with_problem(rule.id, &description)?;
            error!("{}", description);

            return Err(WatchdogError::MaxPriorityReached {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                priority,
                ceiling,
            });
        }

        self.client
            .create_rule(api, resource.remote_id, &CreateRuleRequest::drop_ip(ip, priority))
            .await?;

        let ban = self.store.insert_ban(ip, resource.id, reason, now, expires_at)?;

        warn!(
            "BANNIE : IP {} sur {} ({}) jusqu'au {} - {}",
            ip,
            resource.name,
            resource.full_domain,
            ban.expires_at.format("%Y-%m-%d %H:%M:%S"),
            reason
        );
        Ok(BanOutcome::Banned(ban))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogEntry, NewRule, RemoteOrg, RemoteResource, RemoteRule, RuleScope};
    use crate::pangolin::fake::FakeGateway;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::time::Duration;

    /// Passerelle qui rend la main entre la lecture des règles et la création
    struct SlowGateway {
        inner: FakeGateway,
    }

    #[async_trait]
    impl PolicyClient for SlowGateway {
        async fn fetch_logs(
            &self,
            api: &ApiSettings,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<LogEntry>> {
            self.inner.fetch_logs(api, start, end).await
        }

        async fn list_rules(&self, api: &ApiSettings, resource_id: i64) -> Result<Vec<RemoteRule>> {
            let rules = self.inner.list_rules(api, resource_id).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            rules
        }

        async fn create_rule(
            &self,
            api: &ApiSettings,
            resource_id: i64,
            rule: &CreateRuleRequest,
        ) -> Result<()> {
            self.inner.create_rule(api, resource_id, rule).await
        }

        async fn delete_rule(&self, api: &ApiSettings, resource_id: i64, rule_id: i64) -> Result<()> {
            self.inner.delete_rule(api, resource_id, rule_id).await
        }

        async fn list_resources(&self, api: &ApiSettings) -> Result<Vec<RemoteResource>> {
            self.inner.list_resources(api).await
        }

        async fn list_orgs(&self, api: &ApiSettings) -> Result<Vec<RemoteOrg>> {
            self.inner.list_orgs(api).await
        }
    }

    struct Fixture {
        store: Store,
        gateway: Arc<FakeGateway>,
        enforcer: BanEnforcer,
        resource: Resource,
        api: ApiSettings,
        config: Config,
    }

    fn fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let gateway = Arc::new(FakeGateway::new());
        let enforcer = BanEnforcer::new(store.clone(), gateway.clone());
        let resource = store.upsert_resource(42, "blog", "blog.example.org").unwrap();
        let config = Config::default();
        let api = ApiSettings::from(&config);
        Fixture {
            store,
            gateway,
            enforcer,
            resource,
            api,
            config,
        }
    }

    #[tokio::test]
    async fn test_ban_creates_remote_rule_then_local_row() {
        let f = fixture();
        let rule = f
            .store
            .insert_rule(&NewRule::new("wp", "/wp-login.php", RuleScope::global()).with_duration(30))
            .unwrap();

        let outcome = f
            .enforcer
            .enforce(&f.api, &f.config, "198.51.100.4", &f.resource, &rule, "test")
            .await
            .unwrap();

        let BanOutcome::Banned(ban) = outcome else {
            panic!("bannissement attendu");
        };
        assert_eq!(ban.resource_id, f.resource.id);
        assert_eq!((ban.expires_at - ban.banned_at).num_minutes(), 30);

        let remote = f.gateway.rules_for(42);
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].priority, 10);
        assert!(remote[0].targets_ip("198.51.100.4"));
    }

    #[tokio::test]
    async fn test_second_ban_is_ignored() {
        let f = fixture();
        let rule = f
            .store
            .insert_rule(&NewRule::new("wp", "/wp-login.php", RuleScope::global()))
            .unwrap();

        for _ in 0..2 {
            f.enforcer
                .enforce(&f.api, &f.config, "198.51.100.4", &f.resource, &rule, "test")
                .await
                .unwrap();
        }

        assert_eq!(f.gateway.state.lock().unwrap().created.len(), 1);
        assert_eq!(f.store.active_bans(Utc::now()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_no_local_ban() {
        let f = fixture();
        let rule = f
            .store
            .insert_rule(&NewRule::new("wp", "/wp-login.php", RuleScope::global()))
            .unwrap();
        f.gateway.state.lock().unwrap().fail_create = true;

        let result = f
            .enforcer
            .enforce(&f.api, &f.config, "198.51.100.4", &f.resource, &rule, "test")
            .await;

        assert!(result.unwrap_err().is_transient());
        assert!(f.store.active_bans(Utc::now()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ceiling_disables_rule_and_records_problem() {
        let f = fixture();
        for priority in [10, 15, 20] {
            f.gateway.add_rule(42, priority, "192.0.2.1");
        }
        let rule = f
            .store
            .insert_rule(&NewRule::new("env", "/.env", RuleScope::global()).with_max_priority(11))
            .unwrap();

        let err = f
            .enforcer
            .enforce(&f.api, &f.config, "198.51.100.4", &f.resource, &rule, "test")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WatchdogError::MaxPriorityReached { priority: 11, ceiling: 11, .. }
        ));
        assert!(f.store.active_rules().unwrap().is_empty());
        assert_eq!(f.store.problems().unwrap().len(), 1);
        assert!(f.gateway.state.lock().unwrap().created.is_empty());
        assert!(f.store.active_bans(Utc::now()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ceiling_uses_lower_priorities_only() {
        let f = fixture();
        for priority in [10, 15, 20] {
            f.gateway.add_rule(42, priority, "192.0.2.1");
        }
        let rule = f
            .store
            .insert_rule(&NewRule::new("env", "/.env", RuleScope::global()).with_max_priority(18))
            .unwrap();

        f.enforcer
            .enforce(&f.api, &f.config, "198.51.100.4", &f.resource, &rule, "test")
            .await
            .unwrap();

        let state = f.gateway.state.lock().unwrap();
        assert_eq!(state.created[0].1.priority, 16);
    }

    #[tokio::test]
    async fn test_concurrent_bans_get_distinct_priorities() {
        let f = fixture();
        let gateway = Arc::new(SlowGateway {
            inner: FakeGateway::new(),
        });
        let enforcer = BanEnforcer::new(f.store.clone(), gateway.clone());
        let rule = f
            .store
            .insert_rule(&NewRule::new("wp", "/wp-login.php", RuleScope::global()))
            .unwrap();

        let (first, second) = tokio::join!(
            enforcer.enforce(&f.api, &f.config, "198.51.100.4", &f.resource, &rule, "test"),
            enforcer.enforce(&f.api, &f.config, "198.51.100.5", &f.resource, &rule, "test"),
        );
        assert!(matches!(first.unwrap(), BanOutcome::Banned(_)));
        assert!(matches!(second.unwrap(), BanOutcome::Banned(_)));

        let mut priorities: Vec<i64> = gateway
            .inner
            .rules_for(42)
            .iter()
            .map(|remote| remote.priority)
            .collect();
        priorities.sort_unstable();
        assert_eq!(priorities, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_unusable_duration_disables_rule_before_remote_call() {
        let mut f = fixture();
        let rule = f
            .store
            .insert_rule(&NewRule::new("wp", "/wp-login.php", RuleScope::global()))
            .unwrap();
        // Valeur hors limites chargée hors de `Config::load_from`
        f.config.default_ban_duration_mins = 200_000_000_000;

        let err = f
            .enforcer
            .enforce(&f.api, &f.config, "198.51.100.4", &f.resource, &rule, "test")
            .await
            .unwrap_err();

        assert!(matches!(err, WatchdogError::BanDurationOutOfRange { minutes: 200_000_000_000, .. }));
        assert_eq!(err.disabled_rule(), Some(rule.id));
        assert!(f.gateway.state.lock().unwrap().created.is_empty());
        assert!(f.gateway.rules_for(42).is_empty());
        assert!(f.store.active_rules().unwrap().is_empty());
        assert_eq!(f.store.problems().unwrap().len(), 1);
    }
}
