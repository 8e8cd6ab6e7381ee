use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Entrée du journal de requêtes de la passerelle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: i64,
    pub ip: String,
    pub host: String,
    pub path: String,
    pub method: String,
    /// Identifiant de la ressource côté passerelle
    pub resource_id: i64,
    pub resource_name: String,
}

/// Copie locale d'une ressource protégée par la passerelle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub id: i64,
    pub remote_id: i64,
    pub name: String,
    pub full_domain: String,
}

/// Portée d'une règle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RuleScope {
    /// S'applique à toutes les ressources sauf celles exclues (ids locaux)
    Global { excluded: BTreeSet<i64> },
    /// S'applique à une seule ressource (id local)
    Targeted { resource_id: i64 },
}

impl RuleScope {
    pub fn global() -> Self {
        RuleScope::Global {
            excluded: BTreeSet::new(),
        }
    }

    /// Vérifie si la portée couvre la ressource locale donnée
    ///
    /// Une ressource inconnue (`None`) n'est couverte que par une règle globale.
    pub fn covers(&self, resource_id: Option<i64>) -> bool {
        match self {
            RuleScope::Global { excluded } => {
                resource_id.map_or(true, |id| !excluded.contains(&id))
            }
            RuleScope::Targeted { resource_id: target } => resource_id == Some(*target),
        }
    }
}

/// Règle de détection d'abus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub pattern: String,
    pub use_regex: bool,
    pub scope: RuleScope,
    /// Durée de bannissement propre à la règle (minutes)
    pub ban_duration_mins: Option<i64>,
    /// Plafond de priorité distante; atteint, la règle est désactivée
    pub max_priority: Option<i64>,
    pub is_active: bool,
}

/// Données nécessaires à la création d'une règle
#[derive(Debug, Clone)]
pub struct NewRule {
    pub name: String,
    pub pattern: String,
    pub use_regex: bool,
    pub scope: RuleScope,
    pub ban_duration_mins: Option<i64>,
    pub max_priority: Option<i64>,
}

impl NewRule {
    pub fn new(name: &str, pattern: &str, scope: RuleScope) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            use_regex: false,
            scope,
            ban_duration_mins: None,
            max_priority: None,
        }
    }

    pub fn with_regex(mut self) -> Self {
        self.use_regex = true;
        self
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.ban_duration_mins = Some(minutes);
        self
    }

    pub fn with_max_priority(mut self, ceiling: i64) -> Self {
        self.max_priority = Some(ceiling);
        self
    }
}

/// Bannissement local d'une IP sur une ressource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BannedIp {
    pub id: i64,
    pub ip: String,
    /// Id local de la ressource
    pub resource_id: i64,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Problème consigné lorsqu'une règle est désactivée automatiquement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    pub id: i64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// IP en liste blanche globale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalWhitelistedIp {
    pub id: i64,
    pub ip: String,
    pub name: Option<String>,
}

/// Règle existante sur la passerelle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteRule {
    pub rule_id: i64,
    pub priority: i64,
    pub action: String,
    #[serde(rename = "match")]
    pub match_kind: String,
    pub value: String,
}

impl RemoteRule {
    /// Vrai si la règle distante vise exactement cette IP
    pub fn targets_ip(&self, ip: &str) -> bool {
        self.match_kind.eq_ignore_ascii_case("IP") && self.value.eq_ignore_ascii_case(ip)
    }
}

/// Ressource telle que listée par la passerelle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteResource {
    pub resource_id: i64,
    pub name: String,
    pub full_domain: String,
}

/// Organisation visible avec le jeton
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteOrg {
    pub org_id: String,
    pub name: String,
    pub subnet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_scope_excludes() {
        let scope = RuleScope::Global {
            excluded: [2].into_iter().collect(),
        };
        assert!(scope.covers(Some(1)));
        assert!(!scope.covers(Some(2)));
        assert!(scope.covers(Some(3)));
        assert!(scope.covers(None));
    }

    #[test]
    fn test_targeted_scope() {
        let scope = RuleScope::Targeted { resource_id: 1 };
        assert!(scope.covers(Some(1)));
        assert!(!scope.covers(Some(2)));
        assert!(!scope.covers(None));
    }

    #[test]
    fn test_remote_rule_wire_format() {
        let json = r#"{"ruleId":7,"priority":12,"action":"DROP","match":"IP","value":"1.2.3.4"}"#;
        let rule: RemoteRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_id, 7);
        assert!(rule.targets_ip("1.2.3.4"));
        assert!(!rule.targets_ip("1.2.3.5"));
    }
}
