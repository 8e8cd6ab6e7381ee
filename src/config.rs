use crate::error::WatchdogError;
use crate::log_mode::LogMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "/etc/zwatchdog/config.json";

/// Durée de bannissement maximale acceptée (100 ans, en minutes)
pub const MAX_BAN_DURATION_MINS: i64 = 100 * 365 * 24 * 60;

/// Vérifie qu'une durée de bannissement est comprise entre 1 minute et 100 ans
pub fn validate_ban_duration(minutes: i64) -> std::result::Result<i64, WatchdogError> {
    if (1..=MAX_BAN_DURATION_MINS).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(WatchdogError::Config(format!(
            "durée de bannissement {} hors limites (1 à {} minutes)",
            minutes, MAX_BAN_DURATION_MINS
        )))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// URL de base de l'API Pangolin
    pub api_url: String,

    /// Organisation dont on surveille les journaux
    pub org_id: String,

    /// Jeton d'accès (Bearer)
    pub api_token: String,

    /// Intervalle (en secondes) entre deux lectures des journaux
    pub log_poll_interval_secs: u64,

    /// Intervalle (en minutes) entre deux nettoyages des bannissements expirés
    pub ban_cleanup_interval_mins: u64,

    /// Durée de bannissement par défaut (en minutes)
    pub default_ban_duration_mins: i64,

    /// Fenêtre de rattrapage du premier cycle (en heures)
    pub initial_lookback_hours: i64,

    /// Chevauchement des fenêtres suivantes (en secondes)
    pub poll_overlap_secs: i64,

    /// Chemin de la base SQLite
    pub database_path: String,

    /// Niveau de log
    pub log_level: String,

    /// Mode de journalisation (console, fichier ou systemd-journal)
    pub log_mode: LogMode,

    /// Chemin vers le fichier de log (mode fichier)
    pub log_file: String,

    /// Ignorer les IPs de la liste blanche globale
    pub honor_whitelist: bool,

    /// Adresse d'écoute de l'API de statut (désactivée si absente)
    pub status_api: Option<String>,

    /// Délai maximal d'un appel HTTP (en secondes)
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: "https://api.pangolin.example.com/v1".to_string(),
            org_id: String::new(),
            api_token: String::new(),
            log_poll_interval_secs: 60,
            ban_cleanup_interval_mins: 60,
            default_ban_duration_mins: 7 * 24 * 60, // 7 jours
            initial_lookback_hours: 24,
            poll_overlap_secs: 120,
            database_path: "/var/lib/zwatchdog/watchdog.db".to_string(),
            log_level: "info".to_string(),
            log_mode: LogMode::Console,
            log_file: "/var/log/zwatchdog/zwatchdog.log".to_string(),
            honor_whitelist: true,
            status_api: None,
            http_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Charge la configuration depuis un fichier, en le créant s'il n'existe pas
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default_config = Config::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Configuration invalide dans {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Configuration invalide dans {}", path.display()))?;

        Ok(config)
    }

    /// Sauvegarde la configuration dans le fichier
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Créer le répertoire si nécessaire
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Impossible de créer {}", parent.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Impossible d'écrire {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), WatchdogError> {
        validate_ban_duration(self.default_ban_duration_mins)?;
        Ok(())
    }

    /// Vrai quand l'URL, l'organisation et le jeton sont renseignés
    pub fn is_api_configured(&self) -> bool {
        !self.api_url.trim().is_empty()
            && !self.org_id.trim().is_empty()
            && !self.api_token.trim().is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.log_poll_interval_secs.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.ban_cleanup_interval_mins.max(1) * 60)
    }

    /// Durée de bannissement effective pour une règle, `None` si hors limites
    pub fn ban_duration(&self, rule_override: Option<i64>) -> Option<chrono::Duration> {
        let minutes = rule_override.unwrap_or(self.default_ban_duration_mins);
        validate_ban_duration(minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
    }
}
