//! Initialisation de la journalisation
//!
//! Format minimal sur une ligne: `[2024-01-01 12:00:00] [WARN] message`.

use crate::config::Config;
use crate::log_mode::LogMode;
use chrono::Local;
use env_logger::{Builder, Env, Target};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Installe le logger global selon le mode configuré
pub fn init(config: &Config) {
    match config.log_mode {
        LogMode::Console => {
            builder(&config.log_level).init();
        }
        LogMode::File => {
            // Créer le répertoire si nécessaire
            if let Some(parent) = Path::new(&config.log_file).parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("Erreur lors de la création du répertoire de logs: {}", e);
                }
            }

            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file)
            {
                Ok(file) => {
                    builder(&config.log_level)
                        .target(Target::Pipe(Box::new(file)))
                        .init();
                }
                Err(e) => {
                    eprintln!(
                        "Erreur lors de l'ouverture du fichier de log {}: {}. Utilisation de la console.",
                        config.log_file, e
                    );
                    builder(&config.log_level).init();
                }
            }
        }
        LogMode::SystemdJournal => init_journal(config),
    }
}

#[cfg(feature = "systemd")]
fn init_journal(config: &Config) {
    use systemd_journal_logger::JournalLog;

    let level = parse_level(&config.log_level);
    match JournalLog::new() {
        Ok(logger) => {
            if let Err(e) = logger
                .with_syslog_identifier("zwatchdog".to_string())
                .install()
            {
                eprintln!("Erreur lors de l'installation du logger systemd: {}", e);
                builder(&config.log_level).init();
            } else {
                log::set_max_level(level);
            }
        }
        Err(e) => {
            eprintln!("Erreur lors de l'initialisation du logger systemd: {}", e);
            builder(&config.log_level).init();
        }
    }
}

#[cfg(not(feature = "systemd"))]
fn init_journal(config: &Config) {
    eprintln!("AVERTISSEMENT: Le mode SystemdJournal n'est pas disponible (feature 'systemd' non activée). Utilisation de la console.");
    builder(&config.log_level).init();
}

fn builder(level: &str) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });
    builder
}

/// Convertit le niveau de la configuration
pub fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}
