use super::dto::{CreateRuleRequest, Envelope, LogPage, OrgsPage, ResourcesPage, RulesPage};
use super::pagination::{collect_pages, PAGE_LIMIT};
use super::{ApiSettings, PolicyClient};
use crate::error::{Result, WatchdogError};
use crate::models::{LogEntry, RemoteOrg, RemoteResource, RemoteRule};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Client HTTP de la passerelle
#[derive(Clone)]
pub struct HttpPolicyClient {
    http: Client,
}

impl HttpPolicyClient {
    pub fn new(timeout: Duration) -> Self {
        // Créer un client HTTP avec un timeout raisonnable
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zwatchdog/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { http }
    }

    /// Envoie la requête et vérifie le statut de la réponse
    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|source| WatchdogError::RemoteTransport { operation, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| WatchdogError::RemoteTransport { operation, source })?;

        if !status.is_success() {
            return Err(WatchdogError::RemoteStatus {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        api: &ApiSettings,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let request = self.http.get(url).bearer_auth(&api.token).query(query);
        let body = self.send(operation, request).await?;

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| WatchdogError::Decode {
                operation,
                message: e.to_string(),
            })?;

        // Une page vide ne doit jamais masquer un échec
        match envelope {
            Envelope {
                success: true,
                data: Some(data),
            } => Ok(data),
            Envelope { success: false, .. } => Err(WatchdogError::Decode {
                operation,
                message: format!("échec signalé par la passerelle: {}", body),
            }),
            Envelope { data: None, .. } => Err(WatchdogError::Decode {
                operation,
                message: "champ data absent".to_string(),
            }),
        }
    }
}

fn page_query(limit: usize, offset: usize) -> Vec<(&'static str, String)> {
    vec![("limit", limit.to_string()), ("offset", offset.to_string())]
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn fetch_logs(
        &self,
        api: &ApiSettings,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>> {
        let url = format!("{}/org/{}/logs/request", api.base_url, api.org_id);
        let (time_start, time_end) = (format_time(start), format_time(end));

        let logs = collect_pages(PAGE_LIMIT, |limit, offset| {
            let mut query = vec![("timeStart", time_start.clone()), ("timeEnd", time_end.clone())];
            query.extend(page_query(limit, offset));
            let url = url.as_str();
            async move {
                let page: LogPage = self.get_page("fetch_logs", api, url, &query).await?;
                Ok(page.logs)
            }
        })
        .await?;

        debug!("{} entrée(s) de journal reçues ({} -> {})", logs.len(), time_start, time_end);
        Ok(logs)
    }

    async fn list_rules(&self, api: &ApiSettings, resource_id: i64) -> Result<Vec<RemoteRule>> {
        let url = format!("{}/resource/{}/rules", api.base_url, resource_id);

        collect_pages(PAGE_LIMIT, |limit, offset| {
            let query = page_query(limit, offset);
            let url = url.as_str();
            async move {
                let page: RulesPage = self.get_page("list_rules", api, url, &query).await?;
                Ok(page.rules)
            }
        })
        .await
    }

    async fn create_rule(
        &self,
        api: &ApiSettings,
        resource_id: i64,
        rule: &CreateRuleRequest,
    ) -> Result<()> {
        let url = format!("{}/resource/{}/rule", api.base_url, resource_id);
        let request = self.http.put(&url).bearer_auth(&api.token).json(rule);
        self.send("create_rule", request).await?;

        info!(
            "Règle {} {}={} créée sur la ressource {} avec la priorité {}",
            rule.action, rule.match_kind, rule.value, resource_id, rule.priority
        );
        Ok(())
    }

    async fn delete_rule(&self, api: &ApiSettings, resource_id: i64, rule_id: i64) -> Result<()> {
        let url = format!("{}/resource/{}/rule/{}", api.base_url, resource_id, rule_id);
        let request = self.http.delete(&url).bearer_auth(&api.token);
        self.send("delete_rule", request).await?;

        info!("Règle {} supprimée de la ressource {}", rule_id, resource_id);
        Ok(())
    }

    async fn list_resources(&self, api: &ApiSettings) -> Result<Vec<RemoteResource>> {
        let url = format!("{}/org/{}/resources", api.base_url, api.org_id);

        collect_pages(PAGE_LIMIT, |limit, offset| {
            let query = page_query(limit, offset);
            let url = url.as_str();
            async move {
                let page: ResourcesPage = self.get_page("list_resources", api, url, &query).await?;
                Ok(page.resources)
            }
        })
        .await
    }

    async fn list_orgs(&self, api: &ApiSettings) -> Result<Vec<RemoteOrg>> {
        let url = format!("{}/orgs", api.base_url);

        collect_pages(PAGE_LIMIT, |limit, offset| {
            let query = page_query(limit, offset);
            let url = url.as_str();
            async move {
                let page: OrgsPage = self.get_page("list_orgs", api, url, &query).await?;
                Ok(page.orgs)
            }
        })
        .await
    }
}
