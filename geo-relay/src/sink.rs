use std::io;
use std::path::{Path, PathBuf};

use geo_common::point::Point;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Local copy of every emitted point, one JSON object per line.
pub enum Sink {
    /// Not opened yet: whatever the file holds is left alone.
    Pending(PathBuf),
    File(File),
    Discard,
}

impl Sink {
    /// A sink writing to `path` once opened. `None` discards points.
    pub fn new(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Sink::Pending(path.to_path_buf()),
            None => Sink::Discard,
        }
    }

    /// Open the output file, truncating it. Does nothing if already open.
    pub async fn open(&mut self) -> Result<(), io::Error> {
        if let Sink::Pending(path) = self {
            info!(path = %path.display(), "writing points to file");
            let file = File::create(&*path).await?;
            *self = Sink::File(file);
        }

        Ok(())
    }

    /// Append the point's full record as the source reported it, unstripped, and flush it.
    pub async fn append(&mut self, point: &Point) -> Result<(), io::Error> {
        self.open().await?;

        let Sink::File(file) = self else {
            return Ok(());
        };

        let mut line = serde_json::to_vec(point.record())?;
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await
    }
}
