#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zwatchdog::config::Config;
use zwatchdog::models::{LogEntry, RemoteOrg, RemoteResource, RemoteRule};
use zwatchdog::pangolin::{ApiSettings, CreateRuleRequest, PolicyClient};
use zwatchdog::{Result, Store, WatchdogError};

/// Passerelle en mémoire
#[derive(Default)]
pub struct MemoryGateway {
    pub logs: Mutex<Vec<LogEntry>>,
    pub rules: Mutex<HashMap<i64, Vec<RemoteRule>>>,
    pub next_rule_id: Mutex<i64>,
    pub create_calls: Mutex<usize>,
    pub delete_calls: Mutex<Vec<(i64, i64)>>,
    /// Les créations au-delà de ce nombre d'appels échouent
    pub fail_create_after: Mutex<Option<usize>>,
}

impl MemoryGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log(&self, id: i64, ip: &str, path: &str, resource_id: i64) {
        self.logs.lock().unwrap().push(LogEntry {
            id,
            timestamp: Utc::now().timestamp(),
            ip: ip.to_string(),
            host: "example.org".to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            resource_id,
            resource_name: format!("ressource-{}", resource_id),
        });
    }

    pub fn seed_rule(&self, resource_id: i64, priority: i64, ip: &str) -> i64 {
        let mut next = self.next_rule_id.lock().unwrap();
        *next += 1;
        self.rules.lock().unwrap().entry(resource_id).or_default().push(RemoteRule {
            rule_id: *next,
            priority,
            action: "DROP".to_string(),
            match_kind: "IP".to_string(),
            value: ip.to_string(),
        });
        *next
    }

    pub fn rules_for(&self, resource_id: i64) -> Vec<RemoteRule> {
        self.rules.lock().unwrap().get(&resource_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PolicyClient for MemoryGateway {
    async fn fetch_logs(
        &self,
        _api: &ApiSettings,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>> {
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn list_rules(&self, _api: &ApiSettings, resource_id: i64) -> Result<Vec<RemoteRule>> {
        Ok(self.rules_for(resource_id))
    }

    async fn create_rule(
        &self,
        _api: &ApiSettings,
        resource_id: i64,
        rule: &CreateRuleRequest,
    ) -> Result<()> {
        let calls = {
            let mut calls = self.create_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if matches!(*self.fail_create_after.lock().unwrap(), Some(limit) if calls > limit) {
            return Err(WatchdogError::RemoteStatus {
                operation: "create_rule",
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        let mut next = self.next_rule_id.lock().unwrap();
        *next += 1;
        self.rules.lock().unwrap().entry(resource_id).or_default().push(RemoteRule {
            rule_id: *next,
            priority: rule.priority,
            action: rule.action.clone(),
            match_kind: rule.match_kind.clone(),
            value: rule.value.clone(),
        });
        Ok(())
    }

    async fn delete_rule(&self, _api: &ApiSettings, resource_id: i64, rule_id: i64) -> Result<()> {
        self.delete_calls.lock().unwrap().push((resource_id, rule_id));
        if let Some(rules) = self.rules.lock().unwrap().get_mut(&resource_id) {
            rules.retain(|rule| rule.rule_id != rule_id);
        }
        Ok(())
    }

    async fn list_resources(&self, _api: &ApiSettings) -> Result<Vec<RemoteResource>> {
        Ok(Vec::new())
    }

    async fn list_orgs(&self, _api: &ApiSettings) -> Result<Vec<RemoteOrg>> {
        Ok(Vec::new())
    }
}

pub fn test_config() -> Config {
    Config {
        api_url: "http://127.0.0.1:9".to_string(),
        org_id: "home".to_string(),
        api_token: "jeton".to_string(),
        ..Config::default()
    }
}

pub fn memory_store() -> Store {
    Store::open_in_memory().unwrap()
}
