use std::{io::SeekFrom, path::PathBuf};

use async_trait::async_trait;
use tokio::{
    fs::File,
    io::{AsyncSeekExt, BufReader},
};

use super::{
    frame::{decode_payload, FrameHeader, FRAME_HEADER_SIZE},
    read_exact_or_corrupt, read_schema,
};
use crate::{
    logging::tessera_log,
    record::{Schema, Tuple},
    storage::{FragmentRange, Phase, ScanContext, Scanner, StorageError},
};

/// Decodes the frames of one byte range of a part file.
pub struct RowFileScanner {
    ctx: ScanContext,
    table_dir: PathBuf,
    reader: Option<BufReader<File>>,
    projection: Vec<usize>,
    table_arity: usize,
    position: u64,
    end: u64,
    payload: Vec<u8>,
    phase: Phase,
}

impl RowFileScanner {
    pub(super) fn new(ctx: ScanContext, table_dir: PathBuf) -> Self {
        Self {
            ctx,
            table_dir,
            reader: None,
            projection: Vec::new(),
            table_arity: 0,
            position: 0,
            end: 0,
            payload: Vec::new(),
            phase: Phase::Created,
        }
    }

    async fn read_frame(&mut self) -> Result<Tuple, StorageError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or(StorageError::Lifecycle("used after close"))?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        read_exact_or_corrupt(reader, &mut header, "frame header truncated").await?;
        let header = FrameHeader::decode(&header)?;
        if self.position.saturating_add(header.frame_len()) > self.end {
            return Err(StorageError::Corrupt("frame crosses fragment end"));
        }

        self.payload.resize(header.len as usize, 0);
        read_exact_or_corrupt(reader, &mut self.payload, "frame payload truncated").await?;
        if self.ctx.options.verify_checksums {
            header.verify(&self.payload)?;
        }
        self.position += header.frame_len();

        let tuple = decode_payload(&self.payload)?;
        if tuple.len() != self.table_arity {
            return Err(StorageError::Corrupt("tuple arity differs from table schema"));
        }
        Ok(tuple.project(&self.projection))
    }

    async fn open(&mut self) -> Result<(), StorageError> {
        let FragmentRange::Bytes { start, length } = self.ctx.fragment.range else {
            return Err(StorageError::InvalidFragment {
                fragment: self.ctx.fragment.to_string(),
                reason: "row files are addressed by byte ranges".to_string(),
            });
        };

        let table_schema = read_schema(&self.table_dir, &self.ctx.fragment.table).await?;
        self.projection = table_schema.projection_of(&self.ctx.schema)?;
        self.table_arity = table_schema.len();

        let mut file = File::open(&self.ctx.fragment.location).await?;
        file.seek(SeekFrom::Start(start)).await?;
        self.reader = Some(BufReader::new(file));
        self.position = start;
        self.end = start.saturating_add(length);

        tessera_log!(
            log::Level::Debug,
            ctx: self.ctx.log,
            "scanner_init",
            "fragment={}",
            self.ctx.fragment
        );
        Ok(())
    }
}

#[async_trait]
impl Scanner for RowFileScanner {
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
        if self.position >= self.end {
            self.phase = Phase::Exhausted;
            return Ok(None);
        }
        match self.read_frame().await {
            Ok(tuple) => Ok(Some(tuple)),
            Err(err) => {
                tessera_log!(
                    log::Level::Warn,
                    ctx: self.ctx.log,
                    "scanner_read_failed",
                    "fragment={} position={} error={}",
                    self.ctx.fragment,
                    self.position,
                    err
                );
                Err(err)
            }
        }
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if !self.phase.finish() {
            self.reader = None;
            self.payload = Vec::new();
            tessera_log!(
                log::Level::Debug,
                ctx: self.ctx.log,
                "scanner_close",
                "fragment={} position={}",
                self.ctx.fragment,
                self.position
            );
        }
        Ok(())
    }
}
