//! Helpers shared by unit tests.

pub mod socket_guard;

use async_trait::async_trait;

use crate::store::{Cursor, StoreError, ViewCursor, ViewRecord};

/// View cursor that faults transiently once `fault_after` records are out.
pub struct FaultAfter {
    inner: ViewCursor,
    yielded: usize,
    fault_after: Option<usize>,
}

impl FaultAfter {
    pub fn new(inner: ViewCursor, fault_after: Option<usize>) -> Self {
        Self {
            inner,
            yielded: 0,
            fault_after,
        }
    }
}

#[async_trait]
impl Cursor for FaultAfter {
    type Item = ViewRecord;

    async fn next(&mut self) -> Result<Option<ViewRecord>, StoreError> {
        if self.fault_after == Some(self.yielded) {
            return Err(StoreError::transient("connection reset"));
        }
        let next = self.inner.next().await?;
        if next.is_some() {
            self.yielded += 1;
        }
        Ok(next)
    }
}
