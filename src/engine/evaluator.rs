//! Évaluation des règles sur une entrée de journal
//!
//! Les règles sont parcourues dans leur ordre d'enregistrement et la première
//! qui correspond l'emporte. La correspondance est insensible à la casse,
//! en mode exact comme en mode regex.

use crate::models::{LogEntry, Rule};
use log::error;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};

struct CachedPattern {
    /// Motif source, pour détecter une modification de la règle
    source: String,
    /// `None` si la compilation a échoué: la règle ne correspond jamais
    regex: Option<Regex>,
}

/// Cache des expressions compilées, indexé par identifiant de règle
#[derive(Default)]
pub struct PatternCache {
    entries: HashMap<i64, CachedPattern>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vérifie si le chemin correspond au motif de la règle
    pub fn matches(&mut self, rule: &Rule, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }

        if !rule.use_regex {
            return path.to_lowercase() == rule.pattern.to_lowercase();
        }

        let stale = self
            .entries
            .get(&rule.id)
            .map_or(true, |cached| cached.source != rule.pattern);
        if stale {
            self.entries.insert(
                rule.id,
                CachedPattern {
                    source: rule.pattern.clone(),
                    regex: compile(rule),
                },
            );
        }

        self.entries
            .get(&rule.id)
            .and_then(|cached| cached.regex.as_ref())
            .map_or(false, |regex| regex.is_match(path))
    }

    /// Oublie les règles qui ne figurent plus dans la liste
    pub fn retain_rules(&mut self, rules: &[Rule]) {
        let ids: HashSet<i64> = rules.iter().map(|rule| rule.id).collect();
        self.entries.retain(|id, _| ids.contains(id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compile(rule: &Rule) -> Option<Regex> {
    match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            error!(
                "Expression invalide pour la règle {} ({}): {}. La règle est ignorée.",
                rule.id, rule.name, e
            );
            None
        }
    }
}

/// Sélectionne, pour une entrée, la règle active qui doit déclencher un bannissement
#[derive(Default)]
pub struct RuleEvaluator {
    cache: PatternCache,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prépare un nouveau cycle avec l'instantané des règles
    pub fn prepare(&mut self, rules: &[Rule]) {
        self.cache.retain_rules(rules);
    }

    /// Première règle active dont la portée et le motif correspondent
    ///
    /// `resource_id` est l'identifiant local de la ressource de l'entrée,
    /// `None` si la ressource n'est pas connue localement.
    pub fn first_match<'r>(
        &mut self,
        rules: &'r [Rule],
        entry: &LogEntry,
        resource_id: Option<i64>,
    ) -> Option<&'r Rule> {
        let cache = &mut self.cache;
        rules
            .iter()
            .filter(|rule| rule.is_active)
            .find(|rule| rule.scope.covers(resource_id) && cache.matches(rule, &entry.path))
    }

    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }
}
