use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc};

use async_trait::async_trait;

use crate::{
    logging::{tessera_log, LogContext},
    record::{Schema, Tuple},
    sort::TupleComparator,
    storage::{Phase, Scanner, StorageError},
};

/// K-way merge of scanners whose outputs are each sorted by the same
/// comparator. Produces their union in comparator order; equal tuples come
/// out in input order.
pub struct MergeScanner {
    comparator: Arc<TupleComparator>,
    inputs: Vec<Box<dyn Scanner>>,
    peeked: BinaryHeap<CmpEntry>,
    limit: Option<usize>,
    log: LogContext,
    phase: Phase,
}

impl MergeScanner {
    /// Merge `inputs`, each already sorted by `comparator`. Every input must
    /// produce the comparator's schema.
    pub fn new(
        comparator: Arc<TupleComparator>,
        inputs: Vec<Box<dyn Scanner>>,
    ) -> Result<Self, StorageError> {
        for (offset, input) in inputs.iter().enumerate() {
            if input.schema() != comparator.schema() {
                return Err(StorageError::SchemaMismatch {
                    table: format!("merge input {offset}"),
                    detail: format!(
                        "input produces {}, comparator expects {}",
                        input.schema(),
                        comparator.schema()
                    ),
                });
            }
        }
        Ok(Self {
            peeked: BinaryHeap::with_capacity(inputs.len()),
            comparator,
            inputs,
            limit: None,
            log: LogContext::default(),
            phase: Phase::Created,
        })
    }

    /// Stop after `limit` tuples.
    pub fn limit(self, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..self
        }
    }

    /// Attach the key/values of the worker running this merge to its events.
    pub fn log(self, log: LogContext) -> Self {
        Self {
            log: log.with("stage=merge"),
            ..self
        }
    }

    async fn open(&mut self) -> Result<(), StorageError> {
        for offset in 0..self.inputs.len() {
            self.inputs[offset].init().await?;
            if let Some(tuple) = self.inputs[offset].next().await? {
                let entry = self.entry(offset, tuple);
                self.peeked.push(entry);
            }
        }
        tessera_log!(
            log::Level::Debug,
            ctx: self.log,
            "merge_init",
            "inputs={} primed={} keys=[{}]",
            self.inputs.len(),
            self.peeked.len(),
            self.comparator
        );
        Ok(())
    }

    fn entry(&self, offset: usize, tuple: Tuple) -> CmpEntry {
        CmpEntry {
            offset,
            tuple,
            comparator: self.comparator.clone(),
        }
    }
}

#[async_trait]
impl Scanner for MergeScanner {
    fn schema(&self) -> &Schema {
        self.comparator.schema()
    }

    async fn init(&mut self) -> Result<(), StorageError> {
        self.phase.begin()?;
        let opened = self.open().await;
        if opened.is_err() {
            self.peeked.clear();
        }
        self.phase.settle(opened)
    }

    async fn next(&mut self) -> Result<Option<Tuple>, StorageError> {
        self.phase.ensure_open()?;
        if self.limit == Some(0) {
            self.phase = Phase::Exhausted;
        }
        if self.phase == Phase::Exhausted {
            return Ok(None);
        }
        let Some(head) = self.peeked.pop() else {
            self.phase = Phase::Exhausted;
            return Ok(None);
        };
        if let Some(tuple) = self.inputs[head.offset].next().await? {
            let entry = self.entry(head.offset, tuple);
            self.peeked.push(entry);
        }
        if let Some(limit) = self.limit.as_mut() {
            *limit -= 1;
        }
        Ok(Some(head.tuple))
    }

    /// Closes every input even if some fail, reporting the first failure.
    async fn close(&mut self) -> Result<(), StorageError> {
        if self.phase.finish() {
            return Ok(());
        }
        self.peeked.clear();
        let mut first_err = None;
        for (offset, input) in self.inputs.iter_mut().enumerate() {
            if let Err(err) = input.close().await {
                tessera_log!(
                    log::Level::Warn,
                    ctx: self.log,
                    "merge_input_close_failed",
                    "input={} error={}",
                    offset,
                    err
                );
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

struct CmpEntry {
    offset: usize,
    tuple: Tuple,
    comparator: Arc<TupleComparator>,
}

impl PartialEq for CmpEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CmpEntry {}

impl PartialOrd for CmpEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CmpEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&self.tuple, &other.tuple)
            .then(self.offset.cmp(&other.offset))
            .reverse()
    }
}
