//! In-memory tablespace.
//!
//! Tables live in a shared map; each table is a schema plus a vector of rows
//! in insertion order. Appenders batch rows locally and publish them under one
//! write lock on flush or close, so a reader never sees a half-written batch.
//! Fragments are row ranges over the vector.

use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_lock::RwLock;
use async_trait::async_trait;

use super::{
    AppendContext, Appender, Fragment, FragmentRange, Phase, ScanContext, Scanner, StorageError,
    Tablespace,
};
use crate::{
    logging::{tessera_log, LogContext},
    option::{ConnectionInfo, StorageOptions},
    record::{Schema, Tuple},
};

#[derive(Debug)]
struct MemTable {
    schema: Schema,
    rows: Vec<Tuple>,
}

type Tables = Arc<RwLock<BTreeMap<String, MemTable>>>;

/// Shared state every scanner and appender of one tablespace points at.
#[derive(Debug, Clone)]
struct Source {
    tables: Tables,
    reachable: Arc<AtomicBool>,
    address: String,
}

impl Source {
    fn check_reachable(&self) -> Result<(), StorageError> {
        if self.reachable.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::SourceUnreachable(self.address.clone()))
        }
    }

    fn check_connected(&self) -> Result<(), StorageError> {
        if self.reachable.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Io(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                format!("lost connection to {}", self.address),
            )))
        }
    }
}

/// Tablespace holding every table in process memory.
#[derive(Debug)]
pub struct MemTablespace {
    name: String,
    connection: ConnectionInfo,
    options: Arc<StorageOptions>,
    source: Source,
    log: LogContext,
}

impl MemTablespace {
    /// An empty tablespace. `connection` only names the source; nothing is
    /// dialed.
    pub fn new(
        name: impl Into<String>,
        connection: ConnectionInfo,
        options: StorageOptions,
        log: LogContext,
    ) -> Self {
        let name = name.into();
        let address = connection
            .address()
            .unwrap_or_else(|| format!("{}://{}", connection.scheme, connection.database));
        let log = log.with(format!("tablespace={name}"));
        tessera_log!(
            log::Level::Info,
            ctx: log,
            "tablespace_open",
            "kind=memory database={} address={}",
            connection.database,
            address
        );
        Self {
            name,
            connection,
            options: Arc::new(options),
            source: Source {
                tables: Arc::new(RwLock::new(BTreeMap::new())),
                reachable: Arc::new(AtomicBool::new(true)),
                address,
            },
            log,
        }
    }

    /// Connection parameters the tablespace was built with.
    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Simulate losing (or regaining) the backing source. While unreachable,
    /// metadata calls fail with `SourceUnreachable` and open scanners or
    /// appenders fail with an I/O error.
    pub fn set_reachable(&self, reachable: bool) {
        self.source.reachable.store(reachable, Ordering::Release);
    }

    /// Number of committed rows in `table`.
    pub async fn row_count(&self, table: &str) -> Result<usize, StorageError> {
        self.source.check_reachable()?;
        let tables = self.source.tables.read().await;
        tables
            .get(table)
            .map(|table| table.rows.len())
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))
    }
}

#[async_trait]
impl Tablespace for MemTablespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn database_name(&self) -> &str {
        &self.connection.database
    }

    fn options(&self) -> &Arc<StorageOptions> {
        &self.options
    }

    async fn list_tables(&self) -> Result<BTreeSet<String>, StorageError> {
        self.source.check_reachable()?;
        Ok(self.source.tables.read().await.keys().cloned().collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Schema, StorageError> {
        self.source.check_reachable()?;
        self.source
            .tables
            .read()
            .await
            .get(table)
            .map(|table| table.schema.clone())
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))
    }

    async fn create_table(&self, table: &str, schema: Schema) -> Result<(), StorageError> {
        self.source.check_reachable()?;
        let mut tables = self.source.tables.write().await;
        if tables.contains_key(table) {
            return Err(StorageError::TableExists(table.to_string()));
        }
        tables.insert(
            table.to_string(),
            MemTable {
                schema,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn fragments(&self, table: &str) -> Result<Vec<Fragment>, StorageError> {
        let rows = self.row_count(table).await? as u64;
        let step = self.options.fragment_rows;
        let fragments = (0..rows)
            .step_by(step as usize)
            .map(|start| Fragment::rows(table, &self.name, start, step.min(rows - start)))
            .collect::<Vec<_>>();
        tessera_log!(
            log::Level::Debug,
            ctx: self.log,
            "fragments_planned",
            "table={} rows={} fragments={}",
            table,
            rows,
            fragments.len()
        );
        Ok(fragments)
    }

    fn scanner(
        &self,
        schema: Schema,
        fragment: Fragment,
    ) -> Result<Box<dyn Scanner>, StorageError> {
        if !matches!(fragment.range, FragmentRange::Rows { .. }) {
            return Err(StorageError::InvalidFragment {
                fragment: fragment.to_string(),
                reason: "memory tables are addressed by row ranges".to_string(),
            });
        }
        let log = self.log.with(format!("table={}", fragment.table));
        Ok(Box::new(MemScanner {
            ctx: ScanContext {
                options: self.options.clone(),
                schema,
                fragment,
                log,
            },
            source: self.source.clone(),
            rows: Vec::new().into_iter(),
            phase: Phase::Created,
        }))
    }

    fn appender(
        &self,
        table: &str,
        partition: u32,
        schema: Schema,
    ) -> Result<Box<dyn Appender>, StorageError> {
        Ok(Box::new(MemAppender {
            ctx: AppendContext {
                options: self.options.clone(),
                schema,
                table: table.to_string(),
                partition,
                log: self.log.with(format!("table={table} partition={partition}")),
            },
            source: self.source.clone(),
            buffer: Vec::new(),
            buffered_bytes: 0,
            offset: 0,
            phase: Phase::Created,
        }))
    }
}

/// Scans one row range of a [`MemTablespace`] table from a snapshot taken at
/// `init`.
pub struct MemScanner {
    ctx: ScanContext,
    source: Source,
    rows: std::vec::IntoIter<Tuple>,
    phase: Phase,
}

impl MemScanner {
    async fn open(&mut self) -> Result<(), StorageError> {
        self.source.check_connected()?;

        let (start, count) = match self.ctx.fragment.range {
            FragmentRange::Rows { start, count } => (start as usize, count as usize),
            _ => {
                return Err(StorageError::InvalidFragment {
                    fragment: self.ctx.fragment.to_string(),
                    reason: "memory tables are addressed by row ranges".to_string(),
                })
            }
        };
        let tables = self.source.tables.read().await;
        let table = tables
            .get(&self.ctx.fragment.table)
            .ok_or_else(|| StorageError::UnknownTable(self.ctx.fragment.table.clone()))?;
        let projection = table.schema.projection_of(&self.ctx.schema)?;

        let end = start.saturating_add(count).min(table.rows.len());
        let start = start.min(end);
        self.rows = table.rows[start..end]
            .iter()
            .map(|row| row.project(&projection))
            .collect::<Vec<_>>()
            .into_iter();

        tessera_log!(
            log::Level::Debug,
            ctx: self.ctx.log,
            "scanner_init",
            "fragment={} rows={}",
            self.ctx.fragment,
            end - start
        );
        Ok(())
    }
}

#[async_trait]
impl Scanner for MemScanner {
    fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    async fn init(&mut self) -> Result<(), StorageError> {
        self.phase.begin()?;
        let opened = self.open().await;
        self.phase.settle(opened)
    }

    async fn next(&mut self) -> Result<Option<Tuple>, StorageError> {
        self.phase.ensure_open()?;
        if self.phase == Phase::Exhausted {
            return Ok(None);
        }
        self.source.check_connected()?;
        match self.rows.next() {
            Some(row) => Ok(Some(row)),
            None => {
                self.phase = Phase::Exhausted;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if !self.phase.finish() {
            self.rows = Vec::new().into_iter();
            tessera_log!(
                log::Level::Debug,
                ctx: self.ctx.log,
                "scanner_close",
                "fragment={}",
                self.ctx.fragment
            );
        }
        Ok(())
    }
}

/// Buffers tuples for one partition of a [`MemTablespace`] table and
/// publishes them in batches.
pub struct MemAppender {
    ctx: AppendContext,
    source: Source,
    buffer: Vec<Tuple>,
    buffered_bytes: usize,
    offset: u64,
    phase: Phase,
}

impl MemAppender {
    async fn publish(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.source.check_connected()?;
        let mut tables = self.source.tables.write().await;
        let table = tables
            .get_mut(&self.ctx.table)
            .ok_or_else(|| StorageError::UnknownTable(self.ctx.table.clone()))?;
        let published = self.buffer.len();
        table.rows.append(&mut self.buffer);
        self.buffered_bytes = 0;
        tessera_log!(
            log::Level::Trace,
            ctx: self.ctx.log,
            "appender_flush",
            "rows={} offset={}",
            published,
            self.offset
        );
        Ok(())
    }

    /// Creates the target table when it does not exist yet; an existing table
    /// must have exactly the appender's schema.
    async fn open(&mut self) -> Result<(), StorageError> {
        self.source.check_connected()?;
        let mut tables = self.source.tables.write().await;
        match tables.get(&self.ctx.table) {
            Some(table) if table.schema != self.ctx.schema => {
                return Err(StorageError::SchemaMismatch {
                    table: self.ctx.table.clone(),
                    detail: format!("table has {}, appender writes {}", table.schema, self.ctx.schema),
                });
            }
            Some(_) => {}
            None => {
                tables.insert(
                    self.ctx.table.clone(),
                    MemTable {
                        schema: self.ctx.schema.clone(),
                        rows: Vec::new(),
                    },
                );
            }
        }
        tessera_log!(log::Level::Debug, ctx: self.ctx.log, "appender_init", "schema={}", self.ctx.schema);
        Ok(())
    }
}

#[async_trait]
impl Appender for MemAppender {
    fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    async fn init(&mut self) -> Result<(), StorageError> {
        self.phase.begin()?;
        let opened = self.open().await;
        self.phase.settle(opened)
    }

    async fn append(&mut self, tuple: &Tuple) -> Result<(), StorageError> {
        self.phase.ensure_open()?;
        self.source.check_connected()?;
        self.ctx.schema.validate(tuple)?;

        let size = bincode::serialized_size(tuple)? as usize;
        self.buffer.push(tuple.clone());
        self.buffered_bytes += size;
        self.offset += size as u64;

        if self.buffered_bytes >= self.ctx.options.write_buffer_size {
            self.publish().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        self.phase.ensure_open()?;
        self.publish().await
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        let was_open = self.phase == Phase::Open;
        if self.phase.finish() {
            return Ok(());
        }
        let result = if was_open { self.publish().await } else { Ok(()) };
        self.buffer = Vec::new();
        self.buffered_bytes = 0;
        tessera_log!(
            log::Level::Debug,
            ctx: self.ctx.log,
            "appender_close",
            "offset={} ok={}",
            self.offset,
            result.is_ok()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        record::{Column, ColumnRef, DataType},
        stream::{append_all, scan_all},
        tuple,
    };

    fn people() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int32, false),
            Column::new("name", DataType::Text, true),
            Column::new("score", DataType::Float64, true),
        ])
    }

    fn tablespace(options: StorageOptions) -> MemTablespace {
        MemTablespace::new(
            "mem",
            ConnectionInfo::new("mem", "test"),
            options,
            LogContext::new("worker=0"),
        )
    }

    fn rows(n: i32) -> Vec<Tuple> {
        (0..n)
            .map(|i| tuple![i, format!("p{i}"), (i % 3 != 0).then_some(i as f64)])
            .collect()
    }

    #[tokio::test]
    async fn append_then_scan_round_trip() {
        let space = tablespace(StorageOptions::default());
        let appender = space.appender("people", 0, people()).unwrap();
        append_all(appender, rows(10).iter()).await.unwrap();

        assert_eq!(space.row_count("people").await.unwrap(), 10);
        assert_eq!(space.describe_table("people").await.unwrap(), people());

        let fragments = space.fragments("people").await.unwrap();
        assert_eq!(fragments.len(), 1);
        let scanned = scan_all(space.scanner(people(), fragments[0].clone()).unwrap())
            .await
            .unwrap();
        assert_eq!(scanned, rows(10));
    }

    #[tokio::test]
    async fn scanner_honors_projection() {
        let space = tablespace(StorageOptions::default());
        append_all(space.appender("people", 0, people()).unwrap(), rows(3).iter())
            .await
            .unwrap();

        let projected = people()
            .project(&[ColumnRef::new("name"), ColumnRef::new("id")])
            .unwrap();
        let fragment = space.fragments("people").await.unwrap().remove(0);
        let scanner = space.scanner(projected.clone(), fragment).unwrap();
        assert_eq!(scanner.schema(), &projected);

        let scanned = scan_all(scanner).await.unwrap();
        assert_eq!(scanned[2], tuple!["p2", 2_i32]);
    }

    #[tokio::test]
    async fn row_fragments_cover_every_row_once() {
        let space = tablespace(StorageOptions::default().fragment_rows(4));
        append_all(space.appender("people", 0, people()).unwrap(), rows(10).iter())
            .await
            .unwrap();

        let fragments = space.fragments("people").await.unwrap();
        assert_eq!(
            fragments.iter().map(|f| f.range.clone()).collect::<Vec<_>>(),
            vec![
                FragmentRange::Rows { start: 0, count: 4 },
                FragmentRange::Rows { start: 4, count: 4 },
                FragmentRange::Rows { start: 8, count: 2 },
            ]
        );

        let mut all = Vec::new();
        for fragment in fragments.into_iter().rev() {
            all.extend(scan_all(space.scanner(people(), fragment).unwrap()).await.unwrap());
        }
        all.sort_by_key(|row| match row[0] {
            crate::record::Datum::Int32(id) => id,
            _ => unreachable!(),
        });
        assert_eq!(all, rows(10));
    }

    #[tokio::test]
    async fn offsets_grow_with_each_append() {
        let space = tablespace(StorageOptions::default());
        let mut appender = space.appender("people", 0, people()).unwrap();
        appender.init().await.unwrap();
        assert_eq!(appender.offset(), 0);

        let mut last = 0;
        for row in rows(5) {
            appender.append(&row).await.unwrap();
            assert!(appender.offset() > last);
            last = appender.offset();
        }
        appender.close().await.unwrap();
        assert_eq!(appender.offset(), last);
    }

    #[tokio::test]
    async fn buffered_rows_publish_on_flush_or_threshold() {
        let space = tablespace(StorageOptions::default().write_buffer_size(usize::MAX));
        let mut appender = space.appender("people", 0, people()).unwrap();
        appender.init().await.unwrap();
        for row in rows(3) {
            appender.append(&row).await.unwrap();
        }
        assert_eq!(space.row_count("people").await.unwrap(), 0);
        appender.flush().await.unwrap();
        assert_eq!(space.row_count("people").await.unwrap(), 3);
        appender.close().await.unwrap();

        let eager = tablespace(StorageOptions::default().write_buffer_size(0));
        let mut appender = eager.appender("people", 0, people()).unwrap();
        appender.init().await.unwrap();
        appender.append(&rows(1)[0]).await.unwrap();
        assert_eq!(eager.row_count("people").await.unwrap(), 1);
        appender.close().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_tuple_fails_append_and_close_still_releases() {
        let space = tablespace(StorageOptions::default());
        let mut appender = space.appender("people", 0, people()).unwrap();
        appender.init().await.unwrap();
        appender.append(&rows(1)[0]).await.unwrap();

        let err = appender
            .append(&tuple!["not an id", "x", 1.0_f64])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);

        appender.close().await.unwrap();
        appender.close().await.unwrap();
        assert_eq!(space.row_count("people").await.unwrap(), 1);
        assert!(matches!(
            appender.append(&rows(1)[0]).await,
            Err(StorageError::Lifecycle(_))
        ));
    }

    #[tokio::test]
    async fn metadata_errors() {
        let space = tablespace(StorageOptions::default());
        space.create_table("people", people()).await.unwrap();
        assert!(matches!(
            space.create_table("people", people()).await,
            Err(StorageError::TableExists(_))
        ));
        assert_eq!(
            space.list_tables().await.unwrap(),
            BTreeSet::from(["people".to_string()])
        );
        assert_eq!(
            space.describe_table("ghost").await.unwrap_err().kind(),
            ErrorKind::UnknownTable
        );

        space.set_reachable(false);
        assert_eq!(
            space.list_tables().await.unwrap_err().kind(),
            ErrorKind::SourceUnreachable
        );
        space.set_reachable(true);
        assert!(space.list_tables().await.is_ok());
    }

    #[tokio::test]
    async fn appender_rejects_mismatched_table_schema() {
        let space = tablespace(StorageOptions::default());
        space.create_table("people", people()).await.unwrap();
        let other = Schema::new(vec![Column::new("id", DataType::Int64, false)]);
        let mut appender = space.appender("people", 1, other).unwrap();
        assert!(matches!(
            appender.init().await,
            Err(StorageError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            appender.append(&tuple![5_i64]).await,
            Err(StorageError::Lifecycle(_))
        ));
        assert!(matches!(
            appender.flush().await,
            Err(StorageError::Lifecycle(_))
        ));
        appender.close().await.unwrap();

        assert_eq!(space.row_count("people").await.unwrap(), 0);
        append_all(space.appender("people", 0, people()).unwrap(), rows(2).iter())
            .await
            .unwrap();
        let fragment = space.fragments("people").await.unwrap().remove(0);
        let scanned = scan_all(space.scanner(people(), fragment).unwrap())
            .await
            .unwrap();
        assert_eq!(scanned, rows(2));
    }

    #[tokio::test]
    async fn scanner_after_failed_init_is_not_empty_stream() {
        let space = tablespace(StorageOptions::default());
        let mut scanner = space
            .scanner(people(), Fragment::rows("ghost", "mem", 0, 10))
            .unwrap();
        assert!(matches!(
            scanner.init().await,
            Err(StorageError::UnknownTable(_))
        ));
        assert!(matches!(
            scanner.next().await,
            Err(StorageError::Lifecycle(_))
        ));
        assert!(matches!(
            scanner.init().await,
            Err(StorageError::Lifecycle(_))
        ));
        scanner.close().await.unwrap();
    }

    #[tokio::test]
    async fn scanner_lifecycle() {
        let space = tablespace(StorageOptions::default());
        append_all(space.appender("people", 0, people()).unwrap(), rows(2).iter())
            .await
            .unwrap();
        let fragment = space.fragments("people").await.unwrap().remove(0);

        let mut scanner = space.scanner(people(), fragment.clone()).unwrap();
        assert!(matches!(
            scanner.next().await,
            Err(StorageError::Lifecycle(_))
        ));
        scanner.init().await.unwrap();
        assert!(scanner.next().await.unwrap().is_some());

        // Losing the source mid-scan surfaces as an I/O failure.
        space.set_reachable(false);
        assert_eq!(
            scanner.next().await.unwrap_err().kind(),
            ErrorKind::IoFailure
        );
        scanner.close().await.unwrap();
        scanner.close().await.unwrap();
        space.set_reachable(true);

        let mut scanner = space.scanner(people(), fragment).unwrap();
        scanner.init().await.unwrap();
        while scanner.next().await.unwrap().is_some() {}
        assert!(scanner.next().await.unwrap().is_none());
        scanner.close().await.unwrap();

        let bad = Fragment::bytes("people", "mem", 0, 10);
        assert!(matches!(
            space.scanner(people(), bad),
            Err(StorageError::InvalidFragment { .. })
        ));
    }
}
