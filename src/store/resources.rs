use super::Store;
use crate::error::Result;
use crate::models::{GlobalWhitelistedIp, Resource};
use rusqlite::{params, OptionalExtension, Row};

const RESOURCE_COLUMNS: &str = "id, remote_id, name, full_domain";

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        name: row.get(2)?,
        full_domain: row.get(3)?,
    })
}

impl Store {
    /// Crée ou met à jour une ressource à partir de son identifiant distant
    ///
    /// L'identifiant local reste stable d'une synchronisation à l'autre.
    pub fn upsert_resource(&self, remote_id: i64, name: &str, full_domain: &str) -> Result<Resource> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO resources (remote_id, name, full_domain) VALUES (?1, ?2, ?3)
             ON CONFLICT(remote_id) DO UPDATE SET name = excluded.name, full_domain = excluded.full_domain",
            params![remote_id, name, full_domain],
        )?;
        let resource = conn.query_row(
            &format!("SELECT {} FROM resources WHERE remote_id = ?1", RESOURCE_COLUMNS),
            params![remote_id],
            resource_from_row,
        )?;
        Ok(resource)
    }

    pub fn resources(&self) -> Result<Vec<Resource>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM resources ORDER BY id",
            RESOURCE_COLUMNS
        ))?;
        let resources = stmt
            .query_map([], resource_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(resources)
    }

    pub fn resource(&self, id: i64) -> Result<Option<Resource>> {
        let conn = self.conn();
        let resource = conn
            .query_row(
                &format!("SELECT {} FROM resources WHERE id = ?1", RESOURCE_COLUMNS),
                params![id],
                resource_from_row,
            )
            .optional()?;
        Ok(resource)
    }

    pub fn resource_by_remote_id(&self, remote_id: i64) -> Result<Option<Resource>> {
        let conn = self.conn();
        let resource = conn
            .query_row(
                &format!("SELECT {} FROM resources WHERE remote_id = ?1", RESOURCE_COLUMNS),
                params![remote_id],
                resource_from_row,
            )
            .optional()?;
        Ok(resource)
    }

    /// Ajoute une IP à la liste blanche globale (sans doublon)
    pub fn add_whitelisted_ip(&self, ip: &str, name: Option<&str>) -> Result<GlobalWhitelistedIp> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO whitelisted_ips (ip, name) VALUES (?1, ?2)
             ON CONFLICT(ip) DO UPDATE SET name = excluded.name",
            params![ip.trim(), name],
        )?;
        let entry = conn.query_row(
            "SELECT id, ip, name FROM whitelisted_ips WHERE ip = ?1",
            params![ip.trim()],
            |row| {
                Ok(GlobalWhitelistedIp {
                    id: row.get(0)?,
                    ip: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )?;
        Ok(entry)
    }

    pub fn whitelisted_ips(&self) -> Result<Vec<GlobalWhitelistedIp>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, ip, name FROM whitelisted_ips ORDER BY id")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(GlobalWhitelistedIp {
                    id: row.get(0)?,
                    ip: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
