use std::{io, path::PathBuf};

use async_trait::async_trait;
use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, BufWriter},
};

use super::{frame::encode_tuple, part_file_name, read_schema, write_schema};
use crate::{
    logging::tessera_log,
    record::{Schema, Tuple},
    storage::{AppendContext, Appender, Phase, StorageError},
};

/// Writes one partition of a table as `part-<partition>.rows`, replacing any
/// earlier file for the same partition.
pub struct RowFileAppender {
    ctx: AppendContext,
    table_dir: PathBuf,
    writer: Option<BufWriter<File>>,
    scratch: Vec<u8>,
    offset: u64,
    phase: Phase,
}

impl RowFileAppender {
    pub(super) fn new(ctx: AppendContext, table_dir: PathBuf) -> Self {
        Self {
            ctx,
            table_dir,
            writer: None,
            scratch: Vec::new(),
            offset: 0,
            phase: Phase::Created,
        }
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.table_dir).await?;
        match write_schema(&self.table_dir, &self.ctx.schema).await {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }
        let existing = read_schema(&self.table_dir, &self.ctx.table).await?;
        if existing != self.ctx.schema {
            return Err(StorageError::SchemaMismatch {
                table: self.ctx.table.clone(),
                detail: format!("table has {existing}, appender writes {}", self.ctx.schema),
            });
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<(), StorageError> {
        self.ensure_schema().await?;

        let path = self.table_dir.join(part_file_name(self.ctx.partition));
        let file = File::create(&path).await?;
        self.writer = Some(BufWriter::with_capacity(
            self.ctx.options.write_buffer_size,
            file,
        ));
        tessera_log!(
            log::Level::Debug,
            ctx: self.ctx.log,
            "appender_init",
            "path={}",
            path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl Appender for RowFileAppender {
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
        self.ctx.schema.validate(tuple)?;

        self.scratch.clear();
        let written = encode_tuple(tuple, &mut self.scratch)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or(StorageError::Lifecycle("used after close"))?;
        writer.write_all(&self.scratch).await?;
        self.offset += written as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        self.phase.ensure_open()?;
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.flush().await?),
            None => Err(StorageError::Lifecycle("used after close")),
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if self.phase.finish() {
            return Ok(());
        }
        let result = match self.writer.take() {
            Some(mut writer) => match writer.flush().await {
                Ok(()) => writer.get_mut().sync_all().await.map_err(StorageError::from),
                Err(err) => Err(err.into()),
            },
            None => Ok(()),
        };
        self.scratch = Vec::new();
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
