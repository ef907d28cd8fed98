//! Drivers that run scanners and appenders through their full lifecycle.

mod merge;

use futures_util::stream::{self, Stream};
pub use merge::MergeScanner;

use crate::{
    logging::tessera_log,
    record::Tuple,
    storage::{Appender, Scanner, StorageError},
};

/// Initialize `scanner`, drain it and close it. The scanner is closed on every
/// path; when both draining and closing fail the draining error wins.
pub async fn scan_all(mut scanner: Box<dyn Scanner>) -> Result<Vec<Tuple>, StorageError> {
    let mut tuples = Vec::new();
    let drained = async {
        scanner.init().await?;
        while let Some(tuple) = scanner.next().await? {
            tuples.push(tuple);
        }
        Ok::<_, StorageError>(())
    }
    .await;
    let closed = scanner.close().await;
    drained.and(closed).map(|_| tuples)
}

/// Initialize `appender`, write every tuple, and close it. Returns the final
/// offset.
pub async fn append_all<'a, I>(
    mut appender: Box<dyn Appender>,
    tuples: I,
) -> Result<u64, StorageError>
where
    I: IntoIterator<Item = &'a Tuple>,
{
    let written = async {
        appender.init().await?;
        for tuple in tuples {
            appender.append(tuple).await?;
        }
        Ok::<_, StorageError>(())
    }
    .await;
    let closed = appender.close().await;
    written.and(closed).map(|_| appender.offset())
}

enum State {
    Fresh(Box<dyn Scanner>),
    Open(Box<dyn Scanner>),
    Done,
}

/// Adapt `scanner` into a stream of tuples. The scanner is initialized on the
/// first poll and closed once the stream ends or yields an error.
pub fn into_stream(
    scanner: Box<dyn Scanner>,
) -> impl Stream<Item = Result<Tuple, StorageError>> + Send {
    stream::unfold(State::Fresh(scanner), |state| async move {
        let mut scanner = match state {
            State::Fresh(mut scanner) => {
                if let Err(err) = scanner.init().await {
                    release(scanner).await;
                    return Some((Err(err), State::Done));
                }
                scanner
            }
            State::Open(scanner) => scanner,
            State::Done => return None,
        };
        match scanner.next().await {
            Ok(Some(tuple)) => Some((Ok(tuple), State::Open(scanner))),
            Ok(None) => scanner.close().await.err().map(|err| (Err(err), State::Done)),
            Err(err) => {
                release(scanner).await;
                Some((Err(err), State::Done))
            }
        }
    })
}

async fn release(mut scanner: Box<dyn Scanner>) {
    if let Err(err) = scanner.close().await {
        tessera_log!(
            log::Level::Warn,
            "scanner_close_failed",
            "error={}",
            err
        );
    }
}

#[cfg(all(test, feature = "tokio"))]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;
    use crate::{
        logging::LogContext,
        option::{ConnectionInfo, StorageOptions},
        record::{Column, DataType, Schema},
        storage::{memory::MemTablespace, Fragment, Tablespace},
        tuple,
    };

    fn schema() -> Schema {
        Schema::new(vec![Column::new("v", DataType::Int64, false)])
    }

    async fn filled(n: i64) -> (MemTablespace, Fragment) {
        let space = MemTablespace::new(
            "mem",
            ConnectionInfo::new("mem", "db"),
            StorageOptions::default(),
            LogContext::default(),
        );
        let rows = (0..n).map(|v| tuple![v]).collect::<Vec<_>>();
        append_all(space.appender("t", 0, schema()).unwrap(), rows.iter())
            .await
            .unwrap();
        let fragment = space.fragments("t").await.unwrap().remove(0);
        (space, fragment)
    }

    #[tokio::test]
    async fn stream_yields_all_rows() {
        let (space, fragment) = filled(5).await;
        let rows = into_stream(space.scanner(schema(), fragment).unwrap())
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(rows, (0..5_i64).map(|v| tuple![v]).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stream_stops_after_error() {
        let (space, fragment) = filled(3).await;
        space.set_reachable(false);
        let results = futures_util::StreamExt::collect::<Vec<_>>(into_stream(
            space.scanner(schema(), fragment).unwrap(),
        ))
        .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[tokio::test]
    async fn scan_all_reports_init_failure() {
        let (space, fragment) = filled(1).await;
        space.set_reachable(false);
        assert!(scan_all(space.scanner(schema(), fragment).unwrap())
            .await
            .is_err());
    }
}
