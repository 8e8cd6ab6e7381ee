//! Boucle périodique annulable
//!
//! Chaque cycle travaille sur un instantané de la configuration. Une erreur
//! ou une panique dans un cycle est journalisée puis la boucle attend
//! l'intervalle suivant. L'arrêt est coopératif: un cycle en cours se termine
//! avant la sortie de la boucle.

use crate::config::Config;
use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Tâche exécutée à intervalle régulier
#[async_trait]
pub trait PeriodicTask: Send {
    /// Nom utilisé dans les journaux
    fn name(&self) -> &'static str;

    /// Délai entre deux cycles
    fn interval(&self, config: &Config) -> Duration;

    async fn run_cycle(&mut self, config: &Config) -> anyhow::Result<()>;
}

/// Signal d'arrêt partagé par toutes les boucles
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Demande l'arrêt de toutes les boucles abonnées
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Attend que l'arrêt soit demandé (ou que l'émetteur disparaisse)
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Exécute la tâche en boucle jusqu'à l'arrêt
pub async fn run_periodic<T: PeriodicTask>(
    mut task: T,
    config: Arc<RwLock<Config>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = task.name();
    info!("Démarrage de la tâche « {} »", name);

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Instantané: une modification pendant le cycle ne s'applique qu'au suivant
        let snapshot = config.read().await.clone();
        let interval = task.interval(&snapshot);

        if snapshot.is_api_configured() {
            match AssertUnwindSafe(task.run_cycle(&snapshot)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    "Erreur lors du cycle « {} »: {:#}. Nouvelle tentative dans {:?}",
                    name, e, interval
                ),
                Err(_) => error!(
                    "Panique lors du cycle « {} ». Nouvelle tentative dans {:?}",
                    name, interval
                ),
            }
        } else {
            debug!(
                "Tâche « {} » en attente: URL, organisation ou jeton de l'API non configuré",
                name
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    info!("Tâche « {} » arrêtée", name);
}
