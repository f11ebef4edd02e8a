//! Moving file data around in bounded chunks: from the connection into
//! a file (PUT), from a file to the connection (GET), and from file to
//! file (COPY).
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use http::StatusCode;
use tokio::io::AsyncRead;

use crate::DavResult;
use crate::body::Body;
use crate::errors::DavError;
use crate::fs::DavFile;
use crate::request::RequestBody;

/// Callback that is told how far a transfer is: name of the file,
/// percentage done, and whether we are receiving (PUT) or sending.
pub type ProgressFn = dyn Fn(&str, u8, bool) + Send + Sync;

/// Progress reporting for one transfer.
#[derive(Clone)]
pub(crate) struct Progress {
    name: String,
    total: u64,
    done: u64,
    receive: bool,
    cb: Option<Arc<ProgressFn>>,
}

impl Progress {
    pub fn new(cb: Option<Arc<ProgressFn>>, name: impl Into<String>, total: u64, receive: bool) -> Progress {
        Progress {
            name: name.into(),
            total,
            done: 0,
            receive,
            cb,
        }
    }

    pub fn advance(&mut self, n: u64) {
        self.done += n;
        if let Some(ref cb) = self.cb {
            let pct = if self.total == 0 {
                100
            } else {
                (self.done.saturating_mul(100) / self.total).min(100) as u8
            };
            cb(&self.name, pct, self.receive);
        }
    }
}

/// Why an upload did not complete.
#[derive(Debug)]
pub(crate) enum UploadError {
    /// The file accepted fewer bytes than offered.
    ShortWrite,
    /// The client did not send the data in time.
    Timeout,
    /// Anything else: I/O error on the connection or the file.
    Failed(DavError),
}

/// Copy `body` into `file`, chunk by chunk. Every read from the
/// connection is bounded by `timeout`, and every chunk must be written
/// completely before the next one is read.
pub(crate) async fn copy_in<R>(
    body: &mut RequestBody<'_, R>,
    file: &mut Box<dyn DavFile>,
    chunk_size: usize,
    timeout: Duration,
    progress: &mut Progress,
) -> Result<u64, UploadError>
where
    R: AsyncRead + Unpin,
{
    let mut total = 0u64;
    loop {
        let chunk = match body.read_chunk(chunk_size, timeout).await {
            Ok(c) => c,
            Err(DavError::Timeout) => return Err(UploadError::Timeout),
            Err(e) => return Err(UploadError::Failed(e)),
        };
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        let n = file
            .write_bytes(chunk)
            .await
            .map_err(|e| UploadError::Failed(e.into()))?;
        if n < len {
            debug!("short write: {} of {} bytes", n, len);
            return Err(UploadError::ShortWrite);
        }
        total += n as u64;
        progress.advance(n as u64);
    }
    file.flush().await.map_err(|e| UploadError::Failed(e.into()))?;
    Ok(total)
}

/// Stream `count` bytes from the current position of `file`. A short
/// read ends the stream with an error, which aborts the response.
pub(crate) fn copy_out(mut file: Box<dyn DavFile>, count: u64, chunk_size: usize, mut progress: Progress) -> Body {
    Body::from_stream(stream! {
        let mut left = count;
        while left > 0 {
            let want = std::cmp::min(left, chunk_size as u64) as usize;
            let data = match file.read_bytes(want).await {
                Ok(d) => d,
                Err(e) => {
                    yield Err(io::Error::other(e));
                    break;
                },
            };
            if data.is_empty() {
                yield Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
                break;
            }
            left -= data.len() as u64;
            progress.advance(data.len() as u64);
            yield Ok::<Bytes, io::Error>(data);
        }
    })
}

/// Copy everything from `src` to `dst`. A short write is an
/// internal error.
pub(crate) async fn copy_file(src: &mut Box<dyn DavFile>, dst: &mut Box<dyn DavFile>, chunk_size: usize) -> DavResult<u64> {
    let mut total = 0u64;
    loop {
        let data = src.read_bytes(chunk_size).await?;
        if data.is_empty() {
            break;
        }
        let len = data.len();
        let n = dst.write_bytes(data).await?;
        if n < len {
            debug!("copy: short write: {} of {} bytes", n, len);
            return Err(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"));
        }
        total += n as u64;
    }
    dst.flush().await?;
    Ok(total)
}
