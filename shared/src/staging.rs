use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Run-scoped on-disk copy of the object being processed.
///
/// The backing file is removed when the buffer is dropped, so every exit
/// path of a run releases it.
pub struct StagingBuffer {
    file: NamedTempFile,
    len: u64,
}

impl StagingBuffer {
    pub fn create(dir: &Path) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("img-")
            .tempfile_in(dir)?;

        Ok(StagingBuffer { file, len: 0 })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Truncates the staged content and starts appending to it.
    pub async fn writer(&mut self) -> io::Result<StagingWriter<'_>> {
        let file = fs::File::create(self.file.path()).await?;
        self.len = 0;

        Ok(StagingWriter { buffer: self, file })
    }

    pub async fn head(&self, n: usize) -> io::Result<Vec<u8>> {
        let file = fs::File::open(self.file.path()).await?;
        let mut buf = Vec::with_capacity(n);

        file.take(n as u64).read_to_end(&mut buf).await?;

        Ok(buf)
    }

    pub async fn read_all(&self) -> io::Result<Vec<u8>> {
        fs::read(self.file.path()).await
    }
}

pub struct StagingWriter<'a> {
    buffer: &'a mut StagingBuffer,
    file: fs::File,
}

impl StagingWriter<'_> {
    pub fn written(&self) -> u64 {
        self.buffer.len
    }

    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.buffer.len += chunk.len() as u64;

        Ok(())
    }

    /// Flushes pending writes, returning the staged byte count.
    pub async fn finish(mut self) -> io::Result<u64> {
        self.file.flush().await?;

        Ok(self.buffer.len)
    }
}
