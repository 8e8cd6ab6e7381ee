use crate::error::Result;
use std::future::Future;

/// Taille de page utilisée pour toutes les listes de l'API
pub const PAGE_LIMIT: usize = 1000;

/// Parcourt toutes les pages jusqu'à en recevoir une incomplète
///
/// `fetch` reçoit `(limit, offset)`. Toute erreur interrompt le parcours:
/// une liste partielle n'est jamais renvoyée.
pub async fn collect_pages<T, F, Fut>(limit: usize, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut offset = 0;

    loop {
        let batch = fetch(limit, offset).await?;
        let received = batch.len();
        items.extend(batch);

        if received < limit {
            break;
        }
        offset += limit;
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchdogError;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let offsets = Mutex::new(Vec::new());
        let source: Vec<u32> = (0..7).collect();

        let items = collect_pages(3, |limit, offset| {
            offsets.lock().unwrap().push(offset);
            let page: Vec<u32> = source.iter().skip(offset).take(limit).copied().collect();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(items, source);
        assert_eq!(*offsets.lock().unwrap(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_empty_page() {
        let calls = Mutex::new(0);
        let items = collect_pages(2, |_limit, offset| {
            *calls.lock().unwrap() += 1;
            let page = if offset < 4 { vec![offset, offset + 1] } else { Vec::new() };
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![0, 1, 2, 3]);
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_error_discards_partial_result() {
        let result: Result<Vec<u8>> = collect_pages(1, |_limit, offset| async move {
            if offset == 0 {
                Ok(vec![1])
            } else {
                Err(WatchdogError::Decode {
                    operation: "test",
                    message: "coupure".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
    }
}
