use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{ServerError, StreamError};
use crate::producer::{ArchiveProducer, ZipExit, EMPTY_ZIP};
use crate::relay::{self, FrameSender, RelayOptions, RelayStats};
use crate::state::AppState;

const ATTACHMENT_DISPOSITION: &str = "attachment; filename=\"photo_archive.zip\"";
const NOT_FOUND_MESSAGE: &str = "archive does not exist or has been deleted";

/// GET /archive/{archive_hash}/ — stream a zip of the identified directory.
///
/// Lookup and producer start failures are reported as HTTP errors. Once the
/// producer runs the 200 headers are returned immediately and the body is
/// fed by a separate task, so later failures can only abort the connection.
pub async fn download_archive(
    State(state): State<AppState>,
    Path(archive_hash): Path<String>,
) -> Result<Response, ServerError> {
    let Some(source_dir) = state.archive_dir(&archive_hash) else {
        tracing::error!(archive = %archive_hash, "archive not found");
        return Err(ServerError::NotFound(NOT_FOUND_MESSAGE.into()));
    };

    tracing::info!(archive = %archive_hash, "preparing archive");

    let config = &state.inner.config;
    let producer = ArchiveProducer::spawn(
        &config.zip_program,
        &config.producer_args,
        &source_dir,
        state.inner.live_producers.clone(),
    )
    .map_err(|e| {
        ServerError::Internal(format!(
            "failed to start archive producer '{}': {e}",
            config.zip_program
        ))
    })?;

    let options = RelayOptions {
        chunk_size: config.chunk_size,
        delay: config.response_delay(),
    };
    let (tx, rx) = relay::frame_channel();
    tokio::spawn(stream_archive(
        producer,
        tx,
        options,
        state.inner.shutdown.clone(),
        archive_hash,
    ));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip"),
            (header::CONTENT_DISPOSITION, ATTACHMENT_DISPOSITION),
        ],
        Body::from_stream(relay::body_stream(rx)),
    )
        .into_response())
}

/// Per-download task: relay, then reap the producer no matter how the relay
/// ended. `tx` is dropped only after the producer is gone.
async fn stream_archive(
    mut producer: ArchiveProducer,
    tx: FrameSender,
    options: RelayOptions,
    shutdown: CancellationToken,
    archive_hash: String,
) {
    let outcome = pump(&mut producer, &tx, options, &shutdown).await;

    match producer.terminate().await {
        Ok(status) => {
            tracing::debug!(archive = %archive_hash, %status, "archive producer finished")
        }
        Err(e) => tracing::error!(
            archive = %archive_hash,
            pid = producer.id(),
            error = %e,
            "failed to terminate archive producer"
        ),
    }

    match outcome {
        Ok(stats) => tracing::info!(
            archive = %archive_hash,
            bytes = stats.bytes,
            chunks = stats.chunks,
            "archive download complete"
        ),
        Err(e) if e.is_interruption() => tracing::debug!(
            archive = %archive_hash,
            reason = %e,
            "download interrupted; archive producer terminated"
        ),
        Err(e) => tracing::error!(archive = %archive_hash, error = %e, "archive streaming failed"),
    }
}

async fn pump(
    producer: &mut ArchiveProducer,
    tx: &FrameSender,
    options: RelayOptions,
    shutdown: &CancellationToken,
) -> Result<RelayStats, StreamError> {
    let mut stats = relay::relay(producer.stdout(), tx, options, shutdown).await?;

    // Output is exhausted; the exit status decides whether the archive is whole.
    let status = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Err(StreamError::Cancelled),
        _ = tx.closed() => return Err(StreamError::PeerClosed),
        status = producer.wait() => status.map_err(StreamError::Wait)?,
    };
    match ZipExit::from_status(status) {
        ZipExit::Complete => {}
        ZipExit::SkippedFiles => {
            tracing::warn!(%status, "archive producer skipped unreadable files");
        }
        // An empty directory still downloads as a valid, empty archive.
        ZipExit::NothingToDo if stats.bytes == 0 => {
            relay::send_chunk(tx, Bytes::from_static(&EMPTY_ZIP), shutdown).await?;
            stats.chunks += 1;
            stats.bytes += EMPTY_ZIP.len() as u64;
        }
        ZipExit::NothingToDo | ZipExit::Failed => {
            return Err(StreamError::ProducerFailed(status.to_string()));
        }
    }

    relay::finish(tx).await?;
    Ok(stats)
}
