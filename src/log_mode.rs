use serde::{Deserialize, Serialize};

/// Mode de journalisation utilisé par le système
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogMode {
    /// Sortie d'erreur standard
    #[default]
    Console,
    /// Journal dans un fichier local
    File,
    /// Journal via systemd-journal
    SystemdJournal,
}
