use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use futures::future::join_all;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use zwatchdog::cli::{Cli, Command, RuleCommand, WhitelistCommand};
use zwatchdog::config::CONFIG_FILE;
use zwatchdog::models::{NewRule, RuleScope};
use zwatchdog::workers::{run_periodic, BanCleanup, LogWatcher, Shutdown};
use zwatchdog::{api, logger, sync};
use zwatchdog::{ApiSettings, Config, HttpPolicyClient, PolicyClient, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    // Charger la configuration pour déterminer le mode de log
    let config = Config::load_from(&config_path)?;
    logger::init(&config);

    match cli.command {
        Command::Run => run_daemon(config, config_path).await,
        Command::Sync => {
            let (store, client, api) = connect(&config)?;
            let resources = sync::sync_resources(&store, client.as_ref(), &api).await?;
            for resource in resources {
                println!("{:>4}  {:<24} {} (distant {})", resource.id, resource.name, resource.full_domain, resource.remote_id);
            }
            Ok(())
        }
        Command::Orgs => {
            let (_, client, api) = connect(&config)?;
            for org in sync::list_orgs(client.as_ref(), &api).await? {
                println!("{:<24} {} {}", org.org_id, org.name, org.subnet.unwrap_or_default());
            }
            Ok(())
        }
        Command::PollOnce => {
            let (store, client, _) = connect(&config)?;
            let report = LogWatcher::new(store, client).poll_once(&config).await?;
            println!("{:#?}", report);
            Ok(())
        }
        Command::CleanupOnce => {
            let (store, client, _) = connect(&config)?;
            let report = BanCleanup::new(store, client).cleanup_once(&config).await?;
            println!("{:#?}", report);
            Ok(())
        }
        Command::Status => show_status(&open_store(&config)?),
        Command::Rule(command) => handle_rule(&open_store(&config)?, command),
        Command::Whitelist(command) => handle_whitelist(&open_store(&config)?, command),
    }
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(Path::new(&config.database_path))
        .with_context(|| format!("Impossible d'ouvrir la base {}", config.database_path))
}

fn connect(config: &Config) -> Result<(Store, Arc<dyn PolicyClient>, ApiSettings)> {
    if !config.is_api_configured() {
        anyhow::bail!("URL, organisation ou jeton de l'API non configuré");
    }
    let client: Arc<dyn PolicyClient> =
        Arc::new(HttpPolicyClient::new(Duration::from_secs(config.http_timeout_secs)));
    Ok((open_store(config)?, client, ApiSettings::from(config)))
}

async fn run_daemon(config: Config, config_path: PathBuf) -> Result<()> {
    info!("Démarrage de zwatchdog {}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config)?;
    let client: Arc<dyn PolicyClient> =
        Arc::new(HttpPolicyClient::new(Duration::from_secs(config.http_timeout_secs)));

    if config.is_api_configured() {
        // Un échec n'empêche pas le démarrage: les ressources déjà connues suffisent
        if let Err(e) = sync::sync_resources(&store, client.as_ref(), &ApiSettings::from(&config)).await {
            warn!("Synchronisation initiale des ressources impossible: {}", e);
        }
    } else {
        warn!("API non configurée dans {}: les tâches resteront en attente", config_path.display());
    }

    let status_api = config.status_api.clone();
    let shared = Arc::new(RwLock::new(config));
    let shutdown = Shutdown::new();

    let mut tasks = vec![
        tokio::spawn(run_periodic(
            LogWatcher::new(store.clone(), client.clone()),
            shared.clone(),
            shutdown.subscribe(),
        )),
        tokio::spawn(run_periodic(
            BanCleanup::new(store.clone(), client.clone()),
            shared.clone(),
            shutdown.subscribe(),
        )),
    ];

    if let Some(addr) = status_api {
        let (store, receiver) = (store.clone(), shutdown.subscribe());
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api::serve(&addr, store, receiver).await {
                error!("API de statut: {:#}", e);
            }
        }));
    }

    wait_for_signal(&shared, &config_path).await?;

    info!("Arrêt demandé, fin des cycles en cours...");
    shutdown.trigger();
    for result in join_all(tasks).await {
        if let Err(e) = result {
            error!("Tâche interrompue anormalement: {}", e);
        }
    }

    info!("zwatchdog arrêté");
    Ok(())
}

/// Attend SIGINT ou SIGTERM; SIGHUP recharge la configuration
#[cfg(unix)]
async fn wait_for_signal(config: &Arc<RwLock<Config>>, path: &Path) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Installation du gestionnaire SIGTERM")?;
    let mut hangup = signal(SignalKind::hangup()).context("Installation du gestionnaire SIGHUP")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Installation du gestionnaire Ctrl+C")?;
                info!("SIGINT reçu");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("SIGTERM reçu");
                return Ok(());
            }
            _ = hangup.recv() => reload_config(config, path).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal(_config: &Arc<RwLock<Config>>, _path: &Path) -> Result<()> {
    tokio::signal::ctrl_c().await.context("Installation du gestionnaire Ctrl+C")?;
    info!("Ctrl+C reçu");
    Ok(())
}

#[cfg(unix)]
async fn reload_config(config: &Arc<RwLock<Config>>, path: &Path) {
    match Config::load_from(path) {
        Ok(fresh) => {
            *config.write().await = fresh;
            info!("Configuration rechargée depuis {} (effective au prochain cycle)", path.display());
        }
        Err(e) => error!("Erreur lors du rechargement de la configuration: {:#}", e),
    }
}

fn show_status(store: &Store) -> Result<()> {
    let now = Utc::now();
    let bans = store.active_bans(now)?;
    let problems = store.problems()?;

    println!("Dernière entrée traitée : {}", store.cursor()?);
    println!("Règles actives          : {}", store.active_rules()?.len());
    println!("Bannissements actifs    : {}", bans.len());
    for ban in &bans {
        println!(
            "  {:<40} ressource {:<4} jusqu'au {}  {}",
            ban.ip,
            ban.resource_id,
            ban.expires_at.format("%Y-%m-%d %H:%M"),
            ban.reason
        );
    }
    println!("Problèmes               : {}", problems.len());
    for problem in &problems {
        println!("  [{}] {}", problem.detected_at.format("%Y-%m-%d %H:%M"), problem.description);
    }
    Ok(())
}

fn handle_rule(store: &Store, command: RuleCommand) -> Result<()> {
    match command {
        RuleCommand::Add {
            name,
            pattern,
            regex,
            target,
            exclude,
            duration,
            max_priority,
        } => {
            let scope = match target {
                Some(resource_id) => RuleScope::Targeted { resource_id },
                None => RuleScope::Global {
                    excluded: exclude.into_iter().collect(),
                },
            };
            let mut rule = NewRule::new(&name, &pattern, scope);
            if regex {
                rule = rule.with_regex();
            }
            if let Some(minutes) = duration {
                rule = rule.with_duration(minutes);
            }
            if let Some(ceiling) = max_priority {
                rule = rule.with_max_priority(ceiling);
            }

            let rule = store.insert_rule(&rule)?;
            println!("Règle {} « {} » ajoutée", rule.id, rule.name);
        }
        RuleCommand::List => {
            for rule in store.rules()? {
                let scope = match &rule.scope {
                    RuleScope::Global { excluded } if excluded.is_empty() => "globale".to_string(),
                    RuleScope::Global { excluded } => format!("globale sauf {:?}", excluded),
                    RuleScope::Targeted { resource_id } => format!("ressource {}", resource_id),
                };
                println!(
                    "{:>4} {} {:<20} {:<30} {}{}",
                    rule.id,
                    if rule.is_active { "actif  " } else { "inactif" },
                    rule.name,
                    rule.pattern,
                    scope,
                    if rule.use_regex { " (regex)" } else { "" }
                );
            }
        }
        RuleCommand::Enable { id } => {
            store.set_rule_active(id, true)?;
            println!("Règle {} réactivée", id);
        }
        RuleCommand::Disable { id } => {
            store.set_rule_active(id, false)?;
            println!("Règle {} désactivée", id);
        }
    }
    Ok(())
}

fn handle_whitelist(store: &Store, command: WhitelistCommand) -> Result<()> {
    match command {
        WhitelistCommand::Add { ip, name } => {
            let entry = store.add_whitelisted_ip(&ip, name.as_deref())?;
            println!("IP {} ajoutée à la liste blanche", entry.ip);
        }
        WhitelistCommand::List => {
            for entry in store.whitelisted_ips()? {
                println!("{:<40} {}", entry.ip, entry.name.unwrap_or_default());
            }
        }
    }
    Ok(())
}
