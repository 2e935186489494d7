//! In-memory storage implementation.
//!
//! Path ids come from a process-lifetime counter. A single read/write lock
//! guards both maps, so every operation is atomic without a transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::models::UrlRecord;
use crate::storage::PathStore;

#[derive(Debug)]
struct Tables {
    paths: HashMap<String, i64>,
    urls: HashMap<i64, Vec<String>>,
    next_id: i64,
}

/// Map-backed path store.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                paths: HashMap::new(),
                urls: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of distinct paths stored so far.
    pub fn path_count(&self) -> usize {
        self.tables.read().paths.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PathStore for MemoryStore {
    async fn store(&self, path: &str, urls: &[String]) -> Result<()> {
        let mut tables = self.tables.write();
        let id = match tables.paths.get(path) {
            Some(id) => *id,
            None => {
                let id = tables.next_id;
                tables.next_id += 1;
                tables.paths.insert(path.to_string(), id);
                id
            }
        };
        tables.urls.insert(id, urls.to_vec());
        log::debug!("Stored {} URLs for path '{}' (id {})", urls.len(), path, id);
        Ok(())
    }

    async fn lookup(&self, path: &str) -> Result<Vec<UrlRecord>> {
        let tables = self.tables.read();
        let Some(&path_id) = tables.paths.get(path) else {
            return Ok(Vec::new());
        };
        let records = tables
            .urls
            .get(&path_id)
            .map(|urls| {
                urls.iter()
                    .enumerate()
                    .map(|(i, url)| UrlRecord::new(i as i64 + 1, path_id, url.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::urls_of;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let store = MemoryStore::new();
        store
            .store("news", &urls(&["https://a.example", "https://b.example"]))
            .await
            .unwrap();

        let records = store.lookup("news").await.unwrap();
        assert_eq!(
            urls_of(&records),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].id, 2);
        assert!(records.iter().all(|r| r.path_id == records[0].path_id));
    }

    #[tokio::test]
    async fn test_store_replaces_previous_set() {
        let store = MemoryStore::new();
        store
            .store("p", &urls(&["https://a.example", "https://b.example"]))
            .await
            .unwrap();
        store.store("p", &urls(&["https://c.example"])).await.unwrap();

        let records = store.lookup("p").await.unwrap();
        assert_eq!(urls_of(&records), vec!["https://c.example"]);
    }

    #[tokio::test]
    async fn test_unknown_path_is_empty() {
        let store = MemoryStore::new();
        assert!(store.lookup("never-stored").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let store = MemoryStore::new();
        let list = urls(&["https://a.example", "https://a.example"]);
        store.store("dup", &list).await.unwrap();
        assert_eq!(store.lookup("dup").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_path_ids_are_stable_and_increasing() {
        let store = MemoryStore::new();
        store.store("first", &urls(&["https://a.example"])).await.unwrap();
        store.store("second", &urls(&["https://b.example"])).await.unwrap();
        store.store("first", &urls(&["https://c.example"])).await.unwrap();

        let first = store.lookup("first").await.unwrap()[0].path_id;
        let second = store.lookup("second").await.unwrap()[0].path_id;
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(store.path_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_mix_sets() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let list: Vec<String> = (0..n + 1)
                    .map(|i| format!("https://w{n}.example/{i}"))
                    .collect();
                store.store("shared", &list).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let records = store.lookup("shared").await.unwrap();
        let writer = records[0].url.split('/').nth(2).unwrap().to_string();
        assert!(records.iter().all(|r| r.url.contains(&writer)));
        let n: usize = writer
            .trim_start_matches('w')
            .trim_end_matches(".example")
            .parse()
            .unwrap();
        assert_eq!(records.len(), n + 1);
    }
}
