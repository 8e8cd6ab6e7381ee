//! Format des échanges avec l'API Pangolin

use crate::models::{LogEntry, RemoteOrg, RemoteResource, RemoteRule};
use serde::{Deserialize, Serialize};

/// Enveloppe commune des réponses: `{"data": {...}, "success": true}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub success: bool,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            success: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogPage {
    #[serde(rename = "log")]
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RulesPage {
    pub rules: Vec<RemoteRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResourcesPage {
    pub resources: Vec<RemoteResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrgsPage {
    pub orgs: Vec<RemoteOrg>,
}

/// Corps de `PUT /resource/{id}/rule`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateRuleRequest {
    /// ACCEPT, DROP ou PASS
    pub action: String,
    /// CIDR, IP, PATH ou COUNTRY
    #[serde(rename = "match")]
    pub match_kind: String,
    pub value: String,
    /// Doit être unique au sein de la ressource
    pub priority: i64,
    pub enabled: bool,
}

impl CreateRuleRequest {
    /// Règle DROP visant une seule IP
    pub fn drop_ip(ip: &str, priority: i64) -> Self {
        Self {
            action: "DROP".to_string(),
            match_kind: "IP".to_string(),
            value: ip.to_string(),
            priority,
            enabled: true,
        }
    }
}
