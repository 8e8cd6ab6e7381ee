use super::{from_timestamp, to_timestamp, Store};
use crate::config::validate_ban_duration;
use crate::error::{Result, WatchdogError};
use crate::models::{NewRule, Problem, Rule, RuleScope};
use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection};
use std::collections::{BTreeSet, HashMap};

struct RuleRow {
    id: i64,
    name: String,
    pattern: String,
    use_regex: bool,
    is_global: bool,
    target_resource_id: Option<i64>,
    ban_duration_mins: Option<i64>,
    max_priority: Option<i64>,
    is_active: bool,
}

fn load_rules(conn: &Connection, only_active: bool) -> Result<Vec<Rule>> {
    let mut exclusions: HashMap<i64, BTreeSet<i64>> = HashMap::new();
    {
        let mut stmt = conn.prepare("SELECT rule_id, resource_id FROM rule_exclusions")?;
        let pairs = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for pair in pairs {
            let (rule_id, resource_id) = pair?;
            exclusions.entry(rule_id).or_default().insert(resource_id);
        }
    }

    let sql = if only_active {
        "SELECT id, name, pattern, use_regex, is_global, target_resource_id, ban_duration_mins, max_priority, is_active
         FROM rules WHERE is_active = 1 ORDER BY id"
    } else {
        "SELECT id, name, pattern, use_regex, is_global, target_resource_id, ban_duration_mins, max_priority, is_active
         FROM rules ORDER BY id"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RuleRow {
                id: row.get(0)?,
                name: row.get(1)?,
                pattern: row.get(2)?,
                use_regex: row.get(3)?,
                is_global: row.get(4)?,
                target_resource_id: row.get(5)?,
                ban_duration_mins: row.get(6)?,
                max_priority: row.get(7)?,
                is_active: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        let scope = if row.is_global {
            RuleScope::Global {
                excluded: exclusions.remove(&row.id).unwrap_or_default(),
            }
        } else {
            match row.target_resource_id {
                Some(resource_id) => RuleScope::Targeted { resource_id },
                None => {
                    // La ressource cible a été supprimée
                    warn!("Règle {} ({}) ignorée: ressource cible absente", row.id, row.name);
                    continue;
                }
            }
        };

        rules.push(Rule {
            id: row.id,
            name: row.name,
            pattern: row.pattern,
            use_regex: row.use_regex,
            scope,
            ban_duration_mins: row.ban_duration_mins,
            max_priority: row.max_priority,
            is_active: row.is_active,
        });
    }

    Ok(rules)
}

fn resource_exists(conn: &Connection, id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM resources WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

impl Store {
    /// Enregistre une nouvelle règle (active) et ses exclusions
    pub fn insert_rule(&self, rule: &NewRule) -> Result<Rule> {
        if let Some(minutes) = rule.ban_duration_mins {
            validate_ban_duration(minutes)?;
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let (is_global, target, excluded) = match &rule.scope {
            RuleScope::Global { excluded } => (true, None, excluded.clone()),
            RuleScope::Targeted { resource_id } => (false, Some(*resource_id), BTreeSet::new()),
        };

        for resource_id in target.iter().chain(excluded.iter()) {
            if !resource_exists(&tx, *resource_id)? {
                return Err(WatchdogError::NotFound(format!("ressource {}", resource_id)));
            }
        }

        tx.execute(
            "INSERT INTO rules (name, pattern, use_regex, is_global, target_resource_id, ban_duration_mins, max_priority, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                rule.name,
                rule.pattern,
                rule.use_regex,
                is_global,
                target,
                rule.ban_duration_mins,
                rule.max_priority
            ],
        )?;
        let id = tx.last_insert_rowid();

        for resource_id in &excluded {
            tx.execute(
                "INSERT INTO rule_exclusions (rule_id, resource_id) VALUES (?1, ?2)",
                params![id, resource_id],
            )?;
        }
        tx.commit()?;

        Ok(Rule {
            id,
            name: rule.name.clone(),
            pattern: rule.pattern.clone(),
            use_regex: rule.use_regex,
            scope: rule.scope.clone(),
            ban_duration_mins: rule.ban_duration_mins,
            max_priority: rule.max_priority,
            is_active: true,
        })
    }

    /// Toutes les règles, dans leur ordre d'enregistrement
    pub fn rules(&self) -> Result<Vec<Rule>> {
        load_rules(&self.conn(), false)
    }

    /// Règles actives, dans leur ordre d'enregistrement
    pub fn active_rules(&self) -> Result<Vec<Rule>> {
        load_rules(&self.conn(), true)
    }

    pub fn set_rule_active(&self, rule_id: i64, active: bool) -> Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE rules SET is_active = ?2 WHERE id = ?1",
            params![rule_id, active],
        )?;
        if updated == 0 {
            return Err(WatchdogError::NotFound(format!("règle {}", rule_id)));
        }
        Ok(())
    }

    /// Désactive une règle et consigne le problème dans la même transaction
    pub fn disable_rule_with_problem(&self, rule_id: i64, description: &str) -> Result<Problem> {
        let detected_at = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("UPDATE rules SET is_active = 0 WHERE id = ?1", params![rule_id])?;
        tx.execute(
            "INSERT INTO problems (description, detected_at) VALUES (?1, ?2)",
            params![description, to_timestamp(detected_at)],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Problem {
            id,
            description: description.to_string(),
            detected_at: from_timestamp(to_timestamp(detected_at)),
        })
    }

    /// Problèmes consignés, du plus récent au plus ancien
    pub fn problems(&self) -> Result<Vec<Problem>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, description, detected_at FROM problems ORDER BY id DESC")?;
        let problems = stmt
            .query_map([], |row| {
                Ok(Problem {
                    id: row.get(0)?,
                    description: row.get(1)?,
                    detected_at: from_timestamp(row.get(2)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(problems)
    }
}
