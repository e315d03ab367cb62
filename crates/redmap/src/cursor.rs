//! Resumable iteration over a remote hash.
//!
//! A [`Cursor`] walks the map with the store's cursor scan, one batch at a time.
//! The scan gives weak guarantees: fields present for the whole iteration are
//! returned, but fields written or deleted by other handles meanwhile may be
//! seen zero, one, or several times. Without concurrent writers every field is
//! returned exactly once.

use std::collections::VecDeque;

use futures_core::Stream;
use redmap_core::{MapError, SCAN_START, ScanPage};

use crate::RemoteMap;

enum CursorState {
    /// Holds the current batch and the token returned with it.
    Positioned {
        batch: VecDeque<(String, String)>,
        cursor: String,
    },
    /// The scan has completed.
    Exhausted,
}

/// Cursor over the field/value pairs of a [`RemoteMap`].
pub struct Cursor<'a> {
    map: &'a RemoteMap,
    state: CursorState,
    /// Field returned by the last `next()`, until it is removed.
    current: Option<String>,
}

impl<'a> Cursor<'a> {
    /// Issue the initial scan (cursor `"0"`).
    pub(crate) async fn open(map: &'a RemoteMap) -> Result<Self, MapError> {
        let page = map.scan_page(SCAN_START).await?;
        Ok(Self {
            map,
            state: positioned(page),
            current: None,
        })
    }

    pub(crate) fn map(&self) -> &'a RemoteMap {
        self.map
    }

    /// Whether more items may follow.
    ///
    /// True while the current batch has unconsumed items or the store reported
    /// more batches. A pending batch can turn out empty, in which case `next()`
    /// returns `None` even though this returned true.
    pub fn has_next(&self) -> bool {
        match &self.state {
            CursorState::Positioned { batch, cursor } => {
                !batch.is_empty() || cursor.as_str() != SCAN_START
            }
            CursorState::Exhausted => false,
        }
    }

    /// Next field/value pair, fetching another batch when the current one is
    /// used up. Returns `None` once the scan is complete.
    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Result<Option<(String, String)>, MapError> {
        loop {
            let token = match &mut self.state {
                CursorState::Exhausted => return Ok(None),
                CursorState::Positioned { batch, cursor } => {
                    if let Some((field, value)) = batch.pop_front() {
                        self.current = Some(field.clone());
                        return Ok(Some((field, value)));
                    }
                    if cursor.as_str() == SCAN_START {
                        None
                    } else {
                        Some(std::mem::take(cursor))
                    }
                }
            };

            match token {
                None => {
                    self.state = CursorState::Exhausted;
                    return Ok(None);
                }
                Some(token) => {
                    // Keep the token if the scan fails so the caller can retry.
                    match self.map.scan_page(&token).await {
                        Ok(page) => self.state = positioned(page),
                        Err(e) => {
                            self.state = CursorState::Positioned {
                                batch: VecDeque::new(),
                                cursor: token,
                            };
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Delete the field returned by the last `next()` from the map.
    ///
    /// Fails with [`MapError::InvalidIteratorState`] before the first `next()`
    /// and when called twice without a `next()` in between.
    pub async fn remove(&mut self) -> Result<(), MapError> {
        let field = self.current.take().ok_or(MapError::InvalidIteratorState)?;
        if let Err(e) = self.map.delete_field(&field).await {
            self.current = Some(field);
            return Err(e);
        }
        Ok(())
    }

    /// Adapt the cursor into a stream of field/value pairs.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<(String, String), MapError>> + 'a {
        futures_util::stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

fn positioned(page: ScanPage) -> CursorState {
    CursorState::Positioned {
        batch: page.entries.into(),
        cursor: page.cursor,
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use redmap_core::{MapConfig, Store, mem::MemStore};

    use crate::{RemoteMap, StringMap};

    fn small_batches() -> MapConfig {
        MapConfig {
            scan_count: 2,
            ..MapConfig::default()
        }
    }

    async fn filled(store: impl Into<Store>, n: usize) -> RemoteMap {
        let map = RemoteMap::private(store, &small_batches());
        for i in 0..n {
            map.put(&format!("k{:02}", i), &i.to_string()).await.unwrap();
        }
        map
    }

    #[tokio::test]
    async fn enumerates_every_field_across_batches() {
        let map = filled(MemStore::new(), 7).await;
        let mut cursor = map.cursor().await.unwrap();

        let mut seen = Vec::new();
        while let Some((field, _)) = cursor.next().await.unwrap() {
            seen.push(field);
        }

        let expected: Vec<String> = (0..7).map(|i| format!("k{:02}", i)).collect();
        assert_eq!(seen, expected);
        assert!(!cursor.has_next());
        assert_eq!(cursor.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_map_has_nothing_next() {
        let map = filled(MemStore::new(), 0).await;
        let mut cursor = map.cursor().await.unwrap();
        assert!(!cursor.has_next());
        assert_eq!(cursor.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_requires_a_preceding_next() {
        let map = filled(MemStore::new(), 3).await;
        let mut cursor = map.cursor().await.unwrap();

        assert_eq!(cursor.remove().await, Err(redmap_core::MapError::InvalidIteratorState));

        cursor.next().await.unwrap();
        cursor.remove().await.unwrap();
        assert_eq!(
            cursor.remove().await,
            Err(redmap_core::MapError::InvalidIteratorState)
        );
        assert_eq!(map.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn removing_while_iterating_drains_the_map() {
        let map = filled(MemStore::new(), 5).await;
        let mut cursor = map.cursor().await.unwrap();

        let mut removed = 0;
        while cursor.next().await.unwrap().is_some() {
            cursor.remove().await.unwrap();
            removed += 1;
        }

        assert_eq!(removed, 5);
        assert!(map.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn failed_fetch_can_be_retried() {
        let mem = MemStore::new();
        let map = filled(mem.clone(), 4).await;
        let mut cursor = map.cursor().await.unwrap();

        cursor.next().await.unwrap();
        cursor.next().await.unwrap();

        mem.set_offline(true);
        assert!(cursor.next().await.unwrap_err().is_communication());
        assert!(cursor.has_next());

        mem.set_offline(false);
        assert_eq!(
            cursor.next().await.unwrap(),
            Some(("k02".to_string(), "2".to_string()))
        );
    }

    #[tokio::test]
    async fn empty_batches_with_a_live_cursor_are_skipped() {
        let mem = MemStore::new();
        let map = filled(mem.clone(), 5).await;
        mem.set_empty_pages(3);

        let mut cursor = map.cursor().await.unwrap();
        assert!(cursor.has_next(), "an empty first batch still has pages behind it");

        let mut seen = Vec::new();
        while let Some((field, _)) = cursor.next().await.unwrap() {
            seen.push(field);
        }

        let expected: Vec<String> = (0..5).map(|i| format!("k{:02}", i)).collect();
        assert_eq!(seen, expected);
        assert!(!cursor.has_next());
    }

    #[tokio::test]
    async fn stream_yields_all_pairs() {
        let map = filled(MemStore::new(), 5).await;
        let pairs: Vec<_> = map.cursor().await.unwrap().into_stream().collect().await;
        assert_eq!(pairs.len(), 5);
        assert!(pairs.iter().all(Result::is_ok));
    }
}
