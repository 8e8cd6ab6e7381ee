//! Synchronisation de l'inventaire des ressources de la passerelle

use crate::error::Result;
use crate::models::{RemoteOrg, Resource};
use crate::pangolin::{ApiSettings, PolicyClient};
use crate::store::Store;
use log::info;

/// Copie localement toutes les ressources de l'organisation
///
/// Les ressources existantes sont mises à jour (nom, domaine), leur id local
/// ne change pas. Les ressources disparues de la passerelle sont conservées.
pub async fn sync_resources(
    store: &Store,
    client: &dyn PolicyClient,
    api: &ApiSettings,
) -> Result<Vec<Resource>> {
    let remote = client.list_resources(api).await?;

    let mut synced = Vec::with_capacity(remote.len());
    for resource in &remote {
        synced.push(store.upsert_resource(resource.resource_id, &resource.name, &resource.full_domain)?);
    }

    info!("{} ressource(s) synchronisée(s) pour l'organisation {}", synced.len(), api.org_id);
    Ok(synced)
}

/// Organisations accessibles avec le jeton configuré
pub async fn list_orgs(client: &dyn PolicyClient, api: &ApiSettings) -> Result<Vec<RemoteOrg>> {
    client.list_orgs(api).await
}
