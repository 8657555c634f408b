//! Line-oriented request/response loop spoken by every deployed artifact.
//!
//! One JSON request per input line, exactly one JSON response per output line,
//! blank lines skipped. A line that does not parse still gets an answer
//! (`{"error": ...}`), so requests and responses always pair one-to-one.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Computes the response for one parsed request.
pub trait LineHandler {
    /// Handle a single request. Returning `Err` produces an error response line.
    fn handle(&mut self, request: Value) -> Result<Value, String>;
}

impl<F> LineHandler for F
where
    F: FnMut(Value) -> Result<Value, String>,
{
    fn handle(&mut self, request: Value) -> Result<Value, String> {
        self(request)
    }
}

/// Serve requests from `reader` until EOF, writing responses to `writer`.
///
/// Returns the number of responses written.
pub async fn serve_lines<R, W, H>(reader: R, mut writer: W, mut handler: H) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    H: LineHandler,
{
    let mut lines = reader.lines();
    let mut answered = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(line) {
            Ok(req) => match handler.handle(req) {
                Ok(v) => v,
                Err(e) => json!({ "error": e }),
            },
            Err(e) => {
                tracing::debug!(error = %e, "unparseable request line");
                json!({ "error": format!("invalid request: {e}") })
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
        answered += 1;
    }

    Ok(answered)
}
