//! Client de l'API de la passerelle Pangolin
//!
//! Toutes les listes sont paginées par pages de 1000 éléments et l'accès
//! est authentifié par jeton Bearer.

pub mod dto;
#[cfg(test)]
pub(crate) mod fake;
mod http;
mod pagination;

pub use dto::CreateRuleRequest;
pub use http::HttpPolicyClient;
pub use pagination::{collect_pages, PAGE_LIMIT};

use crate::config::Config;
use crate::error::Result;
use crate::models::{LogEntry, RemoteOrg, RemoteResource, RemoteRule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Paramètres d'accès à l'API, extraits d'un instantané de configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub base_url: String,
    pub org_id: String,
    pub token: String,
}

impl From<&Config> for ApiSettings {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            org_id: config.org_id.clone(),
            token: config.api_token.clone(),
        }
    }
}

/// Accès en lecture/écriture aux règles et aux journaux de la passerelle
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// Journaux de requêtes de l'organisation sur la fenêtre donnée
    async fn fetch_logs(
        &self,
        api: &ApiSettings,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>>;

    /// Règles existantes d'une ressource (id distant)
    async fn list_rules(&self, api: &ApiSettings, resource_id: i64) -> Result<Vec<RemoteRule>>;

    /// Crée une règle sur une ressource (id distant)
    async fn create_rule(
        &self,
        api: &ApiSettings,
        resource_id: i64,
        rule: &CreateRuleRequest,
    ) -> Result<()>;

    /// Supprime une règle d'une ressource (id distant)
    async fn delete_rule(&self, api: &ApiSettings, resource_id: i64, rule_id: i64) -> Result<()>;

    /// Ressources de l'organisation
    async fn list_resources(&self, api: &ApiSettings) -> Result<Vec<RemoteResource>>;

    /// Organisations visibles avec le jeton
    async fn list_orgs(&self, api: &ApiSettings) -> Result<Vec<RemoteOrg>>;
}
