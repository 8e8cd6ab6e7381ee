use crate::config::MAX_BAN_DURATION_MINS;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bannissement automatique des IPs abusives sur une passerelle Pangolin
#[derive(Parser, Debug)]
#[command(name = "zwatchdog", version, about)]
pub struct Cli {
    /// Fichier de configuration (défaut: /etc/zwatchdog/config.json)
    #[arg(short, long, global = true, value_name = "CHEMIN")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Démarre la lecture des journaux et le nettoyage des bannissements
    Run,
    /// Synchronise les ressources de l'organisation
    Sync,
    /// Liste les organisations accessibles avec le jeton
    Orgs,
    /// Exécute un seul cycle de lecture des journaux
    PollOnce,
    /// Exécute un seul cycle de nettoyage des bannissements expirés
    CleanupOnce,
    /// Affiche le curseur, les bannissements actifs et les problèmes
    Status,
    /// Gestion des règles
    #[command(subcommand)]
    Rule(RuleCommand),
    /// Gestion de la liste blanche globale
    #[command(subcommand)]
    Whitelist(WhitelistCommand),
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum RuleCommand {
    /// Ajoute une règle
    Add {
        name: String,
        pattern: String,
        /// Interpréter le motif comme une expression régulière
        #[arg(long)]
        regex: bool,
        /// Limite la règle à une ressource (id local)
        #[arg(long, value_name = "RESSOURCE", conflicts_with = "exclude")]
        target: Option<i64>,
        /// Ressources exclues d'une règle globale (ids locaux)
        #[arg(long, value_name = "RESSOURCE", num_args = 1..)]
        exclude: Vec<i64>,
        /// Durée de bannissement en minutes
        #[arg(
            long,
            value_name = "MINUTES",
            value_parser = clap::value_parser!(i64).range(1..=MAX_BAN_DURATION_MINS)
        )]
        duration: Option<i64>,
        /// Plafond de priorité distante
        #[arg(long, value_name = "N")]
        max_priority: Option<i64>,
    },
    /// Liste les règles
    List,
    /// Réactive une règle
    Enable { id: i64 },
    /// Désactive une règle
    Disable { id: i64 },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum WhitelistCommand {
    /// Ajoute une IP à la liste blanche
    Add {
        ip: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Liste les IPs en liste blanche
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rule_add() {
        let cli = Cli::try_parse_from([
            "zwatchdog",
            "--config",
            "/tmp/zw.json",
            "rule",
            "add",
            "env",
            r"^/\.env",
            "--regex",
            "--exclude",
            "2",
            "3",
            "--max-priority",
            "100",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/zw.json")));
        assert_eq!(
            cli.command,
            Command::Rule(RuleCommand::Add {
                name: "env".to_string(),
                pattern: r"^/\.env".to_string(),
                regex: true,
                target: None,
                exclude: vec![2, 3],
                duration: None,
                max_priority: Some(100),
            })
        );
    }

    #[test]
    fn test_target_conflicts_with_exclude() {
        let result = Cli::try_parse_from([
            "zwatchdog", "rule", "add", "wp", "/wp-login.php", "--target", "1", "--exclude", "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duration_bounds() {
        for bad in ["0", "-10", "200000000000"] {
            let result = Cli::try_parse_from([
                "zwatchdog", "rule", "add", "wp", "/wp-login.php", "--duration", bad,
            ]);
            assert!(result.is_err(), "durée {} acceptée", bad);
        }

        let cli =
            Cli::try_parse_from(["zwatchdog", "rule", "add", "wp", "/wp-login.php", "--duration", "1"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Rule(RuleCommand::Add { duration: Some(1), .. })
        ));
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["zwatchdog", "poll-once", "-c", "conf.json"]).unwrap();
        assert_eq!(cli.command, Command::PollOnce);
        assert_eq!(cli.config, Some(PathBuf::from("conf.json")));
    }
}
