//! Lazy store cursors and transient-fault recovery.
//!
//! Store queries return a [`Cursor`] that fetches keyset-paged batches on
//! demand. A cursor may report [`StoreError::Transient`] mid-iteration; the
//! [`ResumableCursor`] wrapper then reopens the query after the key of the
//! last record it yielded and keeps going, so no record is yielded twice and
//! none is skipped.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::StoreError;

/// Consecutive transient faults tolerated before the fault is surfaced.
pub const DEFAULT_MAX_CONSECUTIVE_RESETS: u32 = 5;

/// A lazily evaluated sequence of store records.
#[async_trait]
pub trait Cursor: Send {
    /// Record type yielded by the cursor.
    type Item: Send;

    /// Fetches the next record, or `None` once the query is exhausted.
    async fn next(&mut self) -> Result<Option<Self::Item>, StoreError>;
}

/// Boxed cursor, used at trait seams where the store implementation varies.
pub type BoxCursor<T> = Box<dyn Cursor<Item = T>>;

#[async_trait]
impl<T: Send> Cursor for BoxCursor<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>, StoreError> {
        (**self).next().await
    }
}

/// Record with a position in its query's keyset order.
pub trait Keyed {
    type Key: Send;

    fn key(&self) -> Self::Key;
}

/// Cursor that reopens its query after transient store faults.
pub struct ResumableCursor<C, F>
where
    C: Cursor,
    C::Item: Keyed,
{
    open: F,
    current: C,
    last_key: Option<<C::Item as Keyed>::Key>,
    resets: u32,
    consecutive_resets: u32,
    max_consecutive_resets: u32,
}

impl<C, F> ResumableCursor<C, F>
where
    C: Cursor,
    C::Item: Keyed,
    F: FnMut(Option<&<C::Item as Keyed>::Key>) -> C + Send,
{
    /// Opens the first cursor with `open(None)`. Every reset calls `open`
    /// again with the key of the last record yielded so far.
    pub fn new(mut open: F) -> Self {
        let current = open(None);
        Self {
            open,
            current,
            last_key: None,
            resets: 0,
            consecutive_resets: 0,
            max_consecutive_resets: DEFAULT_MAX_CONSECUTIVE_RESETS,
        }
    }

    /// Overrides how many back-to-back transient faults are absorbed.
    #[must_use]
    pub fn with_max_consecutive_resets(mut self, max: u32) -> Self {
        self.max_consecutive_resets = max;
        self
    }

    /// Total number of times the inner cursor was recreated.
    #[must_use]
    pub fn resets(&self) -> u32 {
        self.resets
    }
}

#[async_trait]
impl<C, F> Cursor for ResumableCursor<C, F>
where
    C: Cursor,
    C::Item: Keyed,
    F: FnMut(Option<&<C::Item as Keyed>::Key>) -> C + Send,
{
    type Item = C::Item;

    async fn next(&mut self) -> Result<Option<C::Item>, StoreError> {
        loop {
            match self.current.next().await {
                Ok(item) => {
                    self.consecutive_resets = 0;
                    if let Some(item) = &item {
                        self.last_key = Some(item.key());
                    }
                    return Ok(item);
                }
                Err(error)
                    if error.is_transient()
                        && self.consecutive_resets < self.max_consecutive_resets =>
                {
                    self.resets += 1;
                    self.consecutive_resets += 1;
                    warn!(
                        error = %error,
                        resets = self.resets,
                        "store cursor lost; reopening after the last yielded record"
                    );
                    self.current = (self.open)(self.last_key.as_ref());
                }
                Err(error) => {
                    debug!(error = %error, "store cursor failed");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Row(u32);

    impl Keyed for Row {
        type Key = u32;

        fn key(&self) -> u32 {
            self.0
        }
    }

    /// Yields its items in order, including any scripted errors.
    struct ScriptedCursor {
        items: VecDeque<Result<Row, StoreError>>,
    }

    impl ScriptedCursor {
        /// Rows after `after` up to `last`, then a transient fault if `fail_at` is reached.
        fn rows(after: Option<&u32>, last: u32, fail_at: Option<u32>) -> Self {
            let first = after.map_or(1, |key| key + 1);
            let mut items = VecDeque::new();
            for id in first..=last {
                if fail_at == Some(id) {
                    items.push_back(Err(StoreError::transient("cursor not found")));
                    break;
                }
                items.push_back(Ok(Row(id)));
            }
            Self { items }
        }
    }

    #[async_trait]
    impl Cursor for ScriptedCursor {
        type Item = Row;

        async fn next(&mut self) -> Result<Option<Row>, StoreError> {
            match self.items.pop_front() {
                Some(Ok(item)) => Ok(Some(item)),
                Some(Err(error)) => Err(error),
                None => Ok(None),
            }
        }
    }

    async fn collect<C: Cursor>(cursor: &mut C) -> Result<Vec<C::Item>, StoreError> {
        let mut out = Vec::new();
        while let Some(item) = cursor.next().await? {
            out.push(item);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_resumable_cursor_reopens_after_last_yielded_key() {
        let mut reopened_after = Vec::new();
        let mut cursor = ResumableCursor::new(|after: Option<&u32>| {
            reopened_after.push(after.copied());
            let fail_at = after.is_none().then_some(3);
            ScriptedCursor::rows(after, 5, fail_at)
        });

        let items = collect(&mut cursor).await.unwrap();
        assert_eq!(items, vec![Row(1), Row(2), Row(3), Row(4), Row(5)]);
        assert_eq!(cursor.resets(), 1);
        drop(cursor);
        assert_eq!(reopened_after, vec![None, Some(2)]);
    }

    #[tokio::test]
    async fn test_resumable_cursor_reopens_from_start_before_first_record() {
        let mut opened = 0;
        let mut cursor = ResumableCursor::new(|after: Option<&u32>| {
            opened += 1;
            assert_eq!(after, None);
            ScriptedCursor::rows(after, 2, (opened == 1).then_some(1))
        });

        assert_eq!(collect(&mut cursor).await.unwrap(), vec![Row(1), Row(2)]);
        assert_eq!(cursor.resets(), 1);
    }

    #[tokio::test]
    async fn test_resumable_cursor_surfaces_non_transient_errors() {
        let mut cursor = ResumableCursor::new(|_: Option<&u32>| ScriptedCursor {
            items: vec![
                Ok(Row(1)),
                Err(StoreError::Serialization {
                    field: "payload",
                    message: "bad json".to_string(),
                }),
            ]
            .into(),
        });

        assert_eq!(cursor.next().await.unwrap(), Some(Row(1)));
        assert!(matches!(
            cursor.next().await,
            Err(StoreError::Serialization { .. })
        ));
        assert_eq!(cursor.resets(), 0);
    }

    #[tokio::test]
    async fn test_resumable_cursor_gives_up_after_consecutive_faults() {
        let mut cursor = ResumableCursor::new(|_: Option<&u32>| ScriptedCursor {
            items: vec![Err(StoreError::transient("down"))].into(),
        })
        .with_max_consecutive_resets(2);

        let result = cursor.next().await;
        assert!(matches!(result, Err(StoreError::Transient { .. })));
        assert_eq!(cursor.resets(), 2);
    }
}
