// Output sink: the named pipe the director streams segments into.

use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::hls::HlsPipeError;

#[derive(Debug)]
pub struct OutputSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl OutputSink {
    /// Open an existing sink read/write. Holding a read end keeps a FIFO
    /// open without a consumer attached. The file is never created here.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HlsPipeError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| HlsPipeError::sink_open(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream `segment` to its end into the sink. Returns bytes written.
    /// Any error here is a sink failure: the caller opens the segment.
    pub async fn write_segment<R>(&self, segment: &mut R) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut file = self.file.lock().await;
        let copied = tokio::io::copy(segment, &mut *file).await?;
        file.flush().await?;
        Ok(copied)
    }
}
