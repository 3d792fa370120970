use crate::batch::{dispatch, BatchHandler, LineBatcher, StopReason};
use crate::config::types::ReadStart;
use crate::source::reader::{decode_line, SourceError};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Watches an append-only log file and feeds appended lines into a `LineBatcher`.
///
/// The file size is polled at a fixed interval; only the byte range appended since
/// the last poll is read. A batch is evaluated early when a burst of growth leaves at
/// least `batch_size` lines buffered, and otherwise when the idle timeout elapses,
/// so slow-growing files still get analysed within a bounded delay.
pub struct TailWatcher {
    path: PathBuf,
    offset: u64,
    // Bytes after the last newline, waiting for the rest of their line
    partial: Vec<u8>,
    idle_timeout: Duration,
    poll_interval: Duration,
}

impl TailWatcher {
    pub async fn open(
        path: &Path,
        start: ReadStart,
        idle_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, SourceError> {
        let len = tokio::fs::metadata(path)
            .await
            .map_err(|e| SourceError::io(path, e))?
            .len();

        let offset = match start {
            ReadStart::Beginning => 0,
            ReadStart::End => len,
        };

        Ok(Self {
            path: path.to_path_buf(),
            offset,
            partial: Vec::new(),
            idle_timeout,
            poll_interval,
        })
    }

    /// Byte offset up to which the file has been consumed
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the bytes appended since the last call and return the complete lines among them.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, SourceError> {
        let len = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?
            .len();

        if len < self.offset {
            warn!(
                path = %self.path.display(),
                offset = self.offset,
                size = len,
                "File shrank; truncation and rotation are not followed, resuming at new end"
            );
            self.offset = len;
            self.partial.clear();
            return Ok(Vec::new());
        }

        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;
        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;

        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        file.take(len - self.offset)
            .read_to_end(&mut chunk)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;

        self.offset += chunk.len() as u64;
        Ok(self.take_complete_lines(&chunk))
    }

    fn take_complete_lines(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);

        let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Watch the file until the batch cap is reached or the handler stops.
    ///
    /// Polling and the idle deadline are branches of one `select!` loop and the
    /// handler is awaited inside the branch, so evaluations never overlap.
    pub async fn run<H>(
        &mut self,
        batcher: &mut LineBatcher,
        handler: &mut H,
    ) -> Result<StopReason, H::Error>
    where
        H: BatchHandler,
        H::Error: From<SourceError>,
    {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let idle = tokio::time::sleep(self.idle_timeout);
        tokio::pin!(idle);

        info!(
            path = %self.path.display(),
            offset = self.offset,
            timeout_secs = self.idle_timeout.as_secs_f64(),
            "Watching file for new lines"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let lines = self.read_new_lines().await?;
                    if lines.is_empty() {
                        continue;
                    }

                    debug!(lines = lines.len(), offset = self.offset, "File grew");

                    let mut dispatched = false;
                    for line in lines {
                        if let Some(batch) = batcher.push_line(line) {
                            dispatched = true;
                            if let Some(reason) = dispatch(batcher, handler, batch).await? {
                                return Ok(reason);
                            }
                        }
                    }

                    if batcher.buffered() >= batcher.batch_size() {
                        if let Some(batch) = batcher.evaluate() {
                            dispatched = true;
                            if let Some(reason) = dispatch(batcher, handler, batch).await? {
                                return Ok(reason);
                            }
                        }
                    }

                    // The idle timer counts from the end of the last evaluation
                    if dispatched {
                        idle.as_mut().reset(Instant::now() + self.idle_timeout);
                    }
                }
                _ = &mut idle => {
                    if let Some(batch) = batcher.evaluate() {
                        debug!(lines = batch.len(), "Idle timeout elapsed, sending buffered lines");
                        if let Some(reason) = dispatch(batcher, handler, batch).await? {
                            return Ok(reason);
                        }
                    }
                    idle.as_mut().reset(Instant::now() + self.idle_timeout);
                }
            }
        }
    }
}
