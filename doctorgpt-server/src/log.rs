use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only plain-text log of served questions and answers.
///
/// A debugging aid, not a structured audit log: one record per served
/// request, no rotation. The file handle is opened per append and dropped
/// as soon as the record is flushed; an internal mutex serializes writers
/// so concurrent records never interleave.
pub struct QueryLog {
    path: PathBuf,
    write: Mutex<()>,
}

impl QueryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write: Mutex::new(()),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one `Doctor:`/`Q:`/`A:` record.
    pub async fn append(&self, doctor: &str, question: &str, answer: &str) -> io::Result<()> {
        let record = format!("Doctor: {doctor}\nQ: {question}\nA: {answer}\n\n");
        let _guard = self.write.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await
    }
}
