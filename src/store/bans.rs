//! Registre local des IPs bannies

use super::{from_timestamp, to_timestamp, Store};
use crate::error::Result;
use crate::models::BannedIp;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

const BAN_COLUMNS: &str = "id, ip, resource_id, reason, banned_at, expires_at";

fn ban_from_row(row: &Row<'_>) -> rusqlite::Result<BannedIp> {
    Ok(BannedIp {
        id: row.get(0)?,
        ip: row.get(1)?,
        resource_id: row.get(2)?,
        reason: row.get(3)?,
        banned_at: from_timestamp(row.get(4)?),
        expires_at: from_timestamp(row.get(5)?),
    })
}

impl Store {
    /// Vrai si un bannissement non expiré existe pour ce couple (IP, ressource)
    pub fn has_active_ban(&self, ip: &str, resource_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn();
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM banned_ips WHERE ip = ?1 AND resource_id = ?2 AND expires_at > ?3)",
            params![ip, resource_id, to_timestamp(now)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Enregistre un bannissement confirmé par la passerelle
    pub fn insert_ban(
        &self,
        ip: &str,
        resource_id: i64,
        reason: &str,
        banned_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<BannedIp> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO banned_ips (ip, resource_id, reason, banned_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ip, resource_id, reason, to_timestamp(banned_at), to_timestamp(expires_at)],
        )?;

        Ok(BannedIp {
            id: conn.last_insert_rowid(),
            ip: ip.to_string(),
            resource_id,
            reason: reason.to_string(),
            banned_at: from_timestamp(to_timestamp(banned_at)),
            expires_at: from_timestamp(to_timestamp(expires_at)),
        })
    }

    /// Bannissements encore en vigueur
    pub fn active_bans(&self, now: DateTime<Utc>) -> Result<Vec<BannedIp>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM banned_ips WHERE expires_at > ?1 ORDER BY expires_at, id",
            BAN_COLUMNS
        ))?;
        let bans = stmt
            .query_map(params![to_timestamp(now)], ban_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bans)
    }

    /// Bannissements arrivés à échéance (`expires_at <= now`)
    pub fn expired_bans(&self, now: DateTime<Utc>) -> Result<Vec<BannedIp>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM banned_ips WHERE expires_at <= ?1 ORDER BY resource_id, id",
            BAN_COLUMNS
        ))?;
        let bans = stmt
            .query_map(params![to_timestamp(now)], ban_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bans)
    }

    /// Supprime un lot de bannissements dans une seule transaction
    pub fn delete_bans(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM banned_ips WHERE id = ?1")?;
            for id in ids {
                removed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}
