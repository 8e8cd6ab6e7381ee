//! Calcul de la priorité d'une nouvelle règle distante
//!
//! Sans plafond, la nouvelle règle passe après toutes les règles existantes.
//! Avec un plafond, seules les priorités inférieures au plafond comptent, ce
//! qui permet de garder des règles plus prioritaires (pays autorisés, etc.)
//! au-dessus des bannissements.

use crate::error::Result;
use crate::pangolin::{ApiSettings, PolicyClient};

/// Priorité attribuée quand aucune règle ne la contraint
pub const FIRST_PRIORITY: i64 = 10;

/// Prochaine priorité à partir des priorités existantes
pub fn next_priority(existing: &[i64], ceiling: Option<i64>) -> i64 {
    let highest = match ceiling {
        Some(ceiling) => existing.iter().copied().filter(|p| *p < ceiling).max(),
        None => existing.iter().copied().max(),
    };

    highest.map_or(FIRST_PRIORITY, |p| p + 1)
}

/// Interroge la passerelle et calcule la priorité pour la ressource (id distant)
pub async fn allocate_priority(
    client: &dyn PolicyClient,
    api: &ApiSettings,
    remote_resource_id: i64,
    ceiling: Option<i64>,
) -> Result<i64> {
    let rules = client.list_rules(api, remote_resource_id).await?;
    let priorities: Vec<i64> = rules.iter().map(|rule| rule.priority).collect();
    Ok(next_priority(&priorities, ceiling))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_existing_rules() {
        assert_eq!(next_priority(&[], None), 10);
        assert_eq!(next_priority(&[], Some(5)), 10);
    }

    #[test]
    fn test_without_ceiling() {
        assert_eq!(next_priority(&[10, 15, 20], None), 21);
    }

    #[test]
    fn test_ceiling_filters_higher_priorities() {
        assert_eq!(next_priority(&[10, 15, 20], Some(18)), 16);
    }

    #[test]
    fn test_ceiling_reached() {
        // 11 >= 11: l'appelant doit refuser cette priorité
        assert_eq!(next_priority(&[10, 15, 20], Some(11)), 11);
    }

    #[test]
    fn test_all_above_ceiling() {
        assert_eq!(next_priority(&[30, 40], Some(25)), 10);
    }
}
