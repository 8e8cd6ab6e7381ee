//! Passerelle en mémoire pour les tests unitaires

use super::{ApiSettings, CreateRuleRequest, PolicyClient};
use crate::error::{Result, WatchdogError};
use crate::models::{LogEntry, RemoteOrg, RemoteResource, RemoteRule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeState {
    pub logs: Vec<LogEntry>,
    pub rules: HashMap<i64, Vec<RemoteRule>>,
    pub resources: Vec<RemoteResource>,
    pub next_rule_id: i64,
    pub created: Vec<(i64, CreateRuleRequest)>,
    pub deleted: Vec<(i64, i64)>,
    pub windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub fail_logs: bool,
    pub fail_create: bool,
    pub fail_delete: bool,
    pub fail_list_rules: bool,
}

#[derive(Default)]
pub struct FakeGateway {
    pub state: Mutex<FakeState>,
}

fn refused(operation: &'static str) -> WatchdogError {
    WatchdogError::RemoteStatus {
        operation,
        status: 500,
        body: "indisponible".to_string(),
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_log(&self, id: i64, ip: &str, path: &str, resource_id: i64) {
        self.state.lock().unwrap().logs.push(LogEntry {
            id,
            ip: ip.to_string(),
            path: path.to_string(),
            resource_id,
            ..Default::default()
        });
    }

    pub fn add_rule(&self, resource_id: i64, priority: i64, ip: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_rule_id += 1;
        let rule_id = state.next_rule_id;
        state.rules.entry(resource_id).or_default().push(RemoteRule {
            rule_id,
            priority,
            action: "DROP".to_string(),
            match_kind: "IP".to_string(),
            value: ip.to_string(),
        });
        rule_id
    }

    pub fn rules_for(&self, resource_id: i64) -> Vec<RemoteRule> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(&resource_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PolicyClient for FakeGateway {
    async fn fetch_logs(
        &self,
        _api: &ApiSettings,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_logs {
            return Err(refused("fetch_logs"));
        }
        state.windows.push((start, end));
        Ok(state.logs.clone())
    }

    async fn list_rules(&self, _api: &ApiSettings, resource_id: i64) -> Result<Vec<RemoteRule>> {
        let state = self.state.lock().unwrap();
        if state.fail_list_rules {
            return Err(refused("list_rules"));
        }
        Ok(state.rules.get(&resource_id).cloned().unwrap_or_default())
    }

    async fn create_rule(
        &self,
        _api: &ApiSettings,
        resource_id: i64,
        rule: &CreateRuleRequest,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(refused("create_rule"));
        }
        state.next_rule_id += 1;
        let rule_id = state.next_rule_id;
        state.rules.entry(resource_id).or_default().push(RemoteRule {
            rule_id,
            priority: rule.priority,
            action: rule.action.clone(),
            match_kind: rule.match_kind.clone(),
            value: rule.value.clone(),
        });
        state.created.push((resource_id, rule.clone()));
        Ok(())
    }

    async fn delete_rule(&self, _api: &ApiSettings, resource_id: i64, rule_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(refused("delete_rule"));
        }
        if let Some(rules) = state.rules.get_mut(&resource_id) {
            rules.retain(|rule| rule.rule_id != rule_id);
        }
        state.deleted.push((resource_id, rule_id));
        Ok(())
    }

    async fn list_resources(&self, _api: &ApiSettings) -> Result<Vec<RemoteResource>> {
        Ok(self.state.lock().unwrap().resources.clone())
    }

    async fn list_orgs(&self, _api: &ApiSettings) -> Result<Vec<RemoteOrg>> {
        Ok(vec![RemoteOrg {
            org_id: "home".to_string(),
            name: "Maison".to_string(),
            subnet: None,
        }])
    }
}
