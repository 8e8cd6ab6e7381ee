//! Bibliothèque Zwatchdog: surveillance des journaux d'une passerelle Pangolin
//!
//! Les journaux de requêtes sont lus périodiquement et confrontés aux règles
//! locales. Une correspondance crée une règle DROP sur la ressource concernée
//! de la passerelle, levée automatiquement à l'expiration du bannissement.

// Modules principaux
pub mod config;   // Configuration du démon
pub mod error;    // Erreurs du domaine
pub mod models;   // Structures de données
pub mod store;    // Base locale SQLite
pub mod pangolin; // Client de l'API de la passerelle

// Détection et application
pub mod engine;  // Règles, priorités, bannissements
pub mod workers; // Boucles périodiques
pub mod sync;    // Inventaire des ressources

// Journalisation, API et ligne de commande
pub mod api;
pub mod cli;
pub mod log_mode;
pub mod logger;

// Re-export des structures principales
pub use config::Config;
pub use error::{Result, WatchdogError};
pub use log_mode::LogMode;
pub use pangolin::{ApiSettings, HttpPolicyClient, PolicyClient};
pub use store::Store;
