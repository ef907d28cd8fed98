//! Row files on the local file system.
//!
//! A tablespace maps to one root directory. Each table is a subdirectory
//! holding its `schema.json` and one `part-<n>.rows` file per output
//! partition. Part files are sequences of checksummed frames (see
//! [`frame`]), and fragments are frame-aligned byte ranges of a part file.

mod appender;
mod frame;
mod scanner;

use std::{
    collections::BTreeSet,
    io::{self, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
};

pub use appender::RowFileAppender;
use async_trait::async_trait;
pub use scanner::RowFileScanner;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};

use self::frame::{FrameHeader, FRAME_HEADER_SIZE};
use super::{
    AppendContext, Appender, Fragment, FragmentRange, ScanContext, Scanner, StorageError,
    Tablespace,
};
use crate::{
    logging::{tessera_log, LogContext},
    option::StorageOptions,
    record::Schema,
};

const SCHEMA_FILE: &str = "schema.json";
const PART_PREFIX: &str = "part-";
const PART_SUFFIX: &str = ".rows";

/// Tablespace over a directory of row files.
#[derive(Debug)]
pub struct RowFileTablespace {
    name: String,
    root: PathBuf,
    database: String,
    options: Arc<StorageOptions>,
    log: LogContext,
}

impl RowFileTablespace {
    /// Tablespace rooted at `root`. The directory is checked on first use, not
    /// here.
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        options: StorageOptions,
        log: LogContext,
    ) -> Self {
        let name = name.into();
        let root = root.into();
        let log = log.with(format!("tablespace={name}"));
        tessera_log!(
            log::Level::Info,
            ctx: log,
            "tablespace_open",
            "kind=rowfile root={}",
            root.display()
        );
        Self {
            name,
            database: root.to_string_lossy().into_owned(),
            root,
            options: Arc::new(options),
            log,
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: &str) -> Result<PathBuf, StorageError> {
        check_table_name(table)?;
        Ok(self.root.join(table))
    }

    async fn check_root(&self) -> Result<(), StorageError> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::SourceUnreachable(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(err) => Err(StorageError::SourceUnreachable(format!(
                "{}: {err}",
                self.root.display()
            ))),
        }
    }

    /// Part files of `table`, ordered by partition number.
    async fn part_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut parts = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(partition) = file_name.to_str().and_then(parse_partition) else {
                continue;
            };
            parts.push((partition, entry.path()));
        }
        parts.sort();
        Ok(parts.into_iter().map(|(_, path)| path).collect())
    }

    /// Cut one part file into byte ranges of roughly `fragment_bytes`, each
    /// ending on a frame boundary.
    async fn plan_part(
        &self,
        table: &str,
        path: &Path,
        fragments: &mut Vec<Fragment>,
    ) -> Result<(), StorageError> {
        let file = File::open(path).await?;
        let file_len = file.metadata().await?.len();
        let mut reader = BufReader::new(file);
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let location = path.to_string_lossy().into_owned();

        let (mut start, mut position) = (0u64, 0u64);
        while position < file_len {
            read_exact_or_corrupt(&mut reader, &mut header, "frame header truncated").await?;
            position += FrameHeader::decode(&header)?.frame_len();
            if position > file_len {
                return Err(StorageError::Corrupt("frame payload truncated"));
            }
            reader.seek(SeekFrom::Start(position)).await?;
            if position - start >= self.options.fragment_bytes {
                fragments.push(Fragment::bytes(table, &location, start, position - start));
                start = position;
            }
        }
        if position > start {
            fragments.push(Fragment::bytes(table, location, start, position - start));
        }
        Ok(())
    }
}

#[async_trait]
impl Tablespace for RowFileTablespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    fn options(&self) -> &Arc<StorageOptions> {
        &self.options
    }

    async fn list_tables(&self) -> Result<BTreeSet<String>, StorageError> {
        self.check_root().await?;
        let mut tables = BTreeSet::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if fs::metadata(entry.path().join(SCHEMA_FILE)).await.is_err() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                tables.insert(name);
            }
        }
        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<Schema, StorageError> {
        let dir = self.table_dir(table)?;
        self.check_root().await?;
        read_schema(&dir, table).await
    }

    async fn create_table(&self, table: &str, schema: Schema) -> Result<(), StorageError> {
        let dir = self.table_dir(table)?;
        self.check_root().await?;
        fs::create_dir_all(&dir).await?;
        match write_schema(&dir, &schema).await {
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(StorageError::TableExists(table.to_string()))
            }
            result => Ok(result?),
        }
    }

    async fn fragments(&self, table: &str) -> Result<Vec<Fragment>, StorageError> {
        let dir = self.table_dir(table)?;
        self.check_root().await?;
        read_schema(&dir, table).await?;

        let mut fragments = Vec::new();
        for part in self.part_files(&dir).await? {
            self.plan_part(table, &part, &mut fragments).await?;
        }
        tessera_log!(
            log::Level::Debug,
            ctx: self.log,
            "fragments_planned",
            "table={} fragments={}",
            table,
            fragments.len()
        );
        Ok(fragments)
    }

    fn scanner(
        &self,
        schema: Schema,
        fragment: Fragment,
    ) -> Result<Box<dyn Scanner>, StorageError> {
        if !matches!(fragment.range, FragmentRange::Bytes { .. }) {
            return Err(StorageError::InvalidFragment {
                fragment: fragment.to_string(),
                reason: "row files are addressed by byte ranges".to_string(),
            });
        }
        let table_dir = self.table_dir(&fragment.table)?;
        let log = self.log.with(format!("table={}", fragment.table));
        Ok(Box::new(RowFileScanner::new(
            ScanContext {
                options: self.options.clone(),
                schema,
                fragment,
                log,
            },
            table_dir,
        )))
    }

    fn appender(
        &self,
        table: &str,
        partition: u32,
        schema: Schema,
    ) -> Result<Box<dyn Appender>, StorageError> {
        let table_dir = self.table_dir(table)?;
        Ok(Box::new(RowFileAppender::new(
            AppendContext {
                options: self.options.clone(),
                schema,
                table: table.to_string(),
                partition,
                log: self.log.with(format!("table={table} partition={partition}")),
            },
            table_dir,
        )))
    }
}

fn check_table_name(table: &str) -> Result<(), StorageError> {
    let valid = !table.is_empty()
        && !table.starts_with('.')
        && !table.contains(['/', '\\'])
        && table != SCHEMA_FILE;
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(table.to_string()))
    }
}

fn part_file_name(partition: u32) -> String {
    format!("{PART_PREFIX}{partition}{PART_SUFFIX}")
}

fn parse_partition(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(PART_PREFIX)?
        .strip_suffix(PART_SUFFIX)?
        .parse()
        .ok()
}

async fn read_schema(dir: &Path, table: &str) -> Result<Schema, StorageError> {
    match fs::read(dir.join(SCHEMA_FILE)).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(StorageError::UnknownTable(table.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Write `schema.json`, failing with `AlreadyExists` if the table has one.
async fn write_schema(dir: &Path, schema: &Schema) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(schema)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dir.join(SCHEMA_FILE))
        .await?;
    file.write_all(&bytes).await?;
    file.sync_all().await
}

async fn read_exact_or_corrupt<R>(
    reader: &mut R,
    buf: &mut [u8],
    truncated: &'static str,
) -> Result<(), StorageError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            Err(StorageError::Corrupt(truncated))
        }
        Err(err) => Err(err.into()),
    }
}
