use async_stream::stream;
use futures::Stream;
use std::sync::Arc;
use tracing::warn;

use super::entities::{DetailRecord, ListItem};
use super::sqlite::LocalStore;

impl LocalStore {
    /// Live view of the cached list.
    ///
    /// Yields the current contents immediately, then again after every list
    /// write that changes them. Read failures degrade to an empty list.
    pub fn observe_list(self: &Arc<Self>) -> impl Stream<Item = Vec<ListItem>> + Send + 'static {
        let store = Arc::clone(self);
        let mut changes = store.subscribe();

        stream! {
            let mut seen = *changes.borrow_and_update();
            let mut last: Option<Vec<ListItem>> = None;

            'outer: loop {
                let items = match store.list_items().await {
                    Ok(items) => items,
                    Err(e) => {
                        warn!("Failed to read cached list: {}", e);
                        Vec::new()
                    }
                };

                if last.as_ref() != Some(&items) {
                    last = Some(items.clone());
                    yield items;
                }

                loop {
                    if changes.changed().await.is_err() {
                        break 'outer;
                    }
                    let version = *changes.borrow_and_update();
                    if version.list != seen.list {
                        seen = version;
                        break;
                    }
                }
            }
        }
    }

    /// Live view of one detail record; `None` while it is not cached.
    pub fn observe_detail(
        self: &Arc<Self>,
        id: i64,
    ) -> impl Stream<Item = Option<DetailRecord>> + Send + 'static {
        let store = Arc::clone(self);
        let mut changes = store.subscribe();

        stream! {
            let mut seen = *changes.borrow_and_update();
            let mut last: Option<Option<DetailRecord>> = None;

            'outer: loop {
                let record = match store.detail(id).await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Failed to read cached detail {}: {}", id, e);
                        None
                    }
                };

                if last.as_ref() != Some(&record) {
                    last = Some(record.clone());
                    yield record;
                }

                loop {
                    if changes.changed().await.is_err() {
                        break 'outer;
                    }
                    let version = *changes.borrow_and_update();
                    if version.detail != seen.detail {
                        seen = version;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    fn item(id: i64) -> ListItem {
        ListItem {
            id,
            title: format!("Anime {}", id),
            synopsis: None,
            episodes: None,
            score: Some(id as f64),
            poster_url: None,
            last_updated: 0,
        }
    }

    #[tokio::test]
    async fn test_observe_list_emits_current_then_changes() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let stream = store.observe_list();
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(vec![]));

        store.replace_list(&[item(1)]).await.unwrap();
        let items = stream.next().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
    }

    #[tokio::test]
    async fn test_observe_list_skips_identical_rewrites() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        store.replace_list(&[item(1)]).await.unwrap();

        let stream = store.observe_list();
        tokio::pin!(stream);
        assert_eq!(stream.next().await.unwrap().len(), 1);

        store.replace_list(&[item(1)]).await.unwrap();
        let next = timeout(Duration::from_millis(100), stream.next()).await;
        assert!(next.is_err(), "identical contents should not be re-emitted");
    }

    #[tokio::test]
    async fn test_observe_list_ignores_detail_writes() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let stream = store.observe_list();
        tokio::pin!(stream);
        assert_eq!(stream.next().await, Some(vec![]));

        store.delete_detail(3).await.unwrap();
        let next = timeout(Duration::from_millis(100), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_observe_detail_absent_then_present() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let stream = store.observe_detail(42);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(None));

        let record = DetailRecord {
            id: 42,
            title: "Haikyuu!!".to_string(),
            synopsis: None,
            genres: Some("Sports".to_string()),
            cast: None,
            episodes: Some(25),
            score: Some(8.44),
            poster_url: None,
            video_id: None,
            last_updated: 0,
        };
        store.upsert_detail(&record).await.unwrap();
        assert_eq!(stream.next().await, Some(Some(record)));
    }

    #[tokio::test]
    async fn test_observe_list_read_failure_degrades_to_empty() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        store.replace_list(&[item(1)]).await.unwrap();
        store.execute_raw("DROP TABLE anime").await.unwrap();

        let stream = store.observe_list();
        tokio::pin!(stream);
        assert_eq!(stream.next().await, Some(vec![]));
    }
}
