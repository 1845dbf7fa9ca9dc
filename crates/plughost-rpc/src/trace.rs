//! Debug request tracing.
//!
//! When debug mode is on, every outbound request and every inbound response
//! (or transport failure) is appended to a plain-text log, framed by the RPC
//! method name so individual exchanges can be found by eye.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File name of the trace log inside the logs directory.
pub const TRACE_LOG_FILE: &str = "requests.log";

/// Append-only trace log.
#[derive(Debug)]
pub struct RequestTrace {
    path: PathBuf,
    /// Serializes appends from concurrent calls so blocks never interleave.
    write_lock: Mutex<()>,
}

impl RequestTrace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Trace log at `<logs_dir>/requests.log`.
    pub fn in_dir(logs_dir: &Path) -> Self {
        Self::new(logs_dir.join(TRACE_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record_request(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) {
        let mut block = format!("\n>>>>>>>>> {method} >>>>>>>>>\nPOST {url} HTTP/1.1\n");
        for (name, value) in headers {
            block.push_str(&format!("{name}: {value}\n"));
        }
        block.push('\n');
        block.push_str(body);
        block.push('\n');
        self.append(&block).await;
    }

    pub async fn record_response(
        &self,
        method: &str,
        status: reqwest::StatusCode,
        headers: &reqwest::header::HeaderMap,
        body: &[u8],
    ) {
        let mut block = format!("\n<<<<<<<<< {method} <<<<<<<<<\nHTTP/1.1 {status}\n");
        for (name, value) in headers {
            block.push_str(&format!(
                "{}: {}\n",
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes())
            ));
        }
        block.push('\n');
        block.push_str(&String::from_utf8_lossy(body));
        block.push('\n');
        self.append(&block).await;
    }

    pub async fn record_failure(&self, method: &str, error: &str) {
        let block = format!("\n<<<<<<<<< {method} <<<<<<<<<\n(no response) {error}\n");
        self.append(&block).await;
    }

    async fn append(&self, block: &str) {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(path = %self.path.display(), "cannot create trace directory: {e}");
                return;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await;
        match file {
            Ok(mut f) => {
                // tokio finishes file writes on a blocking thread; flush waits for it
                let written = match f.write_all(block.as_bytes()).await {
                    Ok(()) => f.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::warn!(path = %self.path.display(), "failed to append trace: {e}");
                }
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to open trace log: {e}");
            }
        }
    }
}
