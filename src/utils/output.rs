/// Bounded, incremental output collection for child process streams
///
/// Streams are read chunk by chunk as the child produces them. Past the
/// limit the collector keeps draining and discards the excess, so a chatty
/// child never blocks on a full pipe.
use crate::config::types::OutputIntegrity;
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 4096;

/// Output limits configuration
#[derive(Debug, Clone)]
pub struct OutputLimits {
    /// Per-stream stdout limit (bytes)
    pub stdout_limit: usize,
    /// Per-stream stderr limit (bytes)
    pub stderr_limit: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 8 * 1024 * 1024, // 8 MB stdout
            stderr_limit: 2 * 1024 * 1024, // 2 MB stderr
        }
    }
}

/// Bytes captured from one stream
#[derive(Debug, Clone, Default)]
pub struct CollectedStream {
    pub bytes: Vec<u8>,
    pub integrity: OutputIntegrity,
    /// Total bytes the child wrote, including discarded excess
    pub total_bytes: usize,
}

impl CollectedStream {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes.
pub async fn collect_stream<R>(mut stream: R, limit: usize) -> CollectedStream
where
    R: AsyncRead + Unpin,
{
    let mut collected = CollectedStream::default();
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                collected.total_bytes += n;
                let room = limit.saturating_sub(collected.bytes.len());
                if n > room {
                    collected.bytes.extend_from_slice(&chunk[..room]);
                    collected.integrity = OutputIntegrity::TruncatedByLimit;
                } else {
                    collected.bytes.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("stream read failed: {}", e);
                collected.integrity = OutputIntegrity::ReadError;
                break;
            }
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_limits_default() {
        let limits = OutputLimits::default();
        assert_eq!(limits.stdout_limit, 8 * 1024 * 1024);
        assert_eq!(limits.stderr_limit, 2 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_collect_small_stream() {
        let data: &[u8] = b"7\n";
        let collected = collect_stream(data, 1024).await;
        assert_eq!(collected.bytes, b"7\n");
        assert_eq!(collected.integrity, OutputIntegrity::Complete);
        assert_eq!(collected.text(), "7\n");
    }

    #[tokio::test]
    async fn test_collect_truncates_but_drains() {
        let data = vec![b'x'; 3 * CHUNK_SIZE + 17];
        let collected = collect_stream(data.as_slice(), 100).await;
        assert_eq!(collected.bytes.len(), 100);
        assert_eq!(collected.total_bytes, data.len());
        assert_eq!(collected.integrity, OutputIntegrity::TruncatedByLimit);
    }

    #[tokio::test]
    async fn test_collect_exact_limit_is_complete() {
        let data = vec![b'y'; 64];
        let collected = collect_stream(data.as_slice(), 64).await;
        assert_eq!(collected.bytes.len(), 64);
        assert_eq!(collected.integrity, OutputIntegrity::Complete);
    }

    #[tokio::test]
    async fn test_collect_invalid_utf8_is_lossy() {
        let data: &[u8] = &[0x66, 0xff, 0x6f];
        let collected = collect_stream(data, 16).await;
        assert_eq!(collected.text(), "f\u{fffd}o");
    }
}
