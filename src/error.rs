//! Taxonomie des erreurs du chien de garde
//!
//! Les erreurs distantes sont transitoires et réessayées au cycle suivant,
//! `MaxPriorityReached` et `BanDurationOutOfRange` ne concernent qu'une règle
//! et n'interrompent pas le cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchdogError {
    /// La passerelle a répondu avec un statut d'échec
    #[error("appel {operation} refusé par la passerelle (statut {status}): {body}")]
    RemoteStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Échec réseau ou de transport HTTP
    #[error("appel {operation} impossible: {source}")]
    RemoteTransport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Réponse distante illisible
    #[error("réponse {operation} invalide: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    /// Le plafond de priorité de la règle est atteint
    #[error(
        "priorité maximale atteinte pour la règle {rule_id} ({rule_name}): priorité {priority} >= plafond {ceiling}"
    )]
    MaxPriorityReached {
        rule_id: i64,
        rule_name: String,
        priority: i64,
        ceiling: i64,
    },

    /// Durée de bannissement inutilisable pour la règle
    #[error("durée de bannissement invalide pour la règle {rule_id} ({rule_name}): {minutes} minute(s)")]
    BanDurationOutOfRange {
        rule_id: i64,
        rule_name: String,
        minutes: i64,
    },

    #[error("erreur de la base locale: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("{0} introuvable")]
    NotFound(String),

    #[error("configuration invalide: {0}")]
    Config(String),
}

impl WatchdogError {
    /// Vrai pour les erreurs distantes, qui seront réessayées au prochain cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WatchdogError::RemoteStatus { .. }
                | WatchdogError::RemoteTransport { .. }
                | WatchdogError::Decode { .. }
        )
    }

    /// Règle désactivée par l'erreur, le cycle peut continuer sans elle
    pub fn disabled_rule(&self) -> Option<i64> {
        match self {
            WatchdogError::MaxPriorityReached { rule_id, .. }
            | WatchdogError::BanDurationOutOfRange { rule_id, .. } => Some(*rule_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchdogError>;
