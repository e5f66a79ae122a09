//! Bidirectional byte pump between a bridge client and an agent stream

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pair `client` with `stream`, copying both directions on `tasks`
///
/// Each direction copies until its source ends, then shuts down its
/// destination, which in turn ends the opposite direction. Both stop
/// early when `done` is cancelled.
pub fn spawn_pump<C, S>(tasks: &TaskTracker, client: C, stream: S, done: CancellationToken)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (stream_read, stream_write) = tokio::io::split(stream);

    tasks.spawn(copy_direction(
        "client->agent",
        client_read,
        stream_write,
        done.clone(),
    ));
    tasks.spawn(copy_direction("agent->client", stream_read, client_write, done));
}

async fn copy_direction<R, W>(
    direction: &'static str,
    mut reader: R,
    mut writer: W,
    done: CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::select! {
        result = tokio::io::copy(&mut reader, &mut writer) => result,
        _ = done.cancelled() => {
            tracing::debug!(direction, "stream direction aborted");
            return 0;
        }
    };
    let _ = writer.shutdown().await;

    match result {
        Ok(bytes) => {
            tracing::debug!(direction, bytes, "stream direction finished");
            bytes
        }
        Err(e) => {
            tracing::debug!(direction, error = %e, "stream direction failed");
            0
        }
    }
}
