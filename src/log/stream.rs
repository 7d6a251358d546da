use super::classifier::LogClassifier;
use super::record::LogRecord;
use futures::Stream;
use futures_lite::io::{AsyncRead, AsyncReadExt};

/// Read size for server output pipes.
pub(crate) const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Raw chunks read from `reader` until EOF or a read error.
pub(crate) fn chunk_stream<R>(mut reader: R) -> impl Stream<Item = Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    async_stream::stream! {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => yield buf[..n].to_vec(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read server output, closing stream");
                    break;
                }
            }
        }
    }
}

/// Classified records read from `reader`, in arrival order.
///
/// The stream is lazy and ends once the reader reaches EOF and the final
/// entry has been emitted. It cannot be restarted.
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use tomcat_runner::log::{record_stream, LogLevel};
///
/// # futures::executor::block_on(async {
/// let output: &[u8] = b"src\nINFO: one\nsrc\nSEVERE: two\n";
/// let records: Vec<_> = record_stream(output).collect().await;
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[1].level, LogLevel::Severe);
/// # });
/// ```
pub fn record_stream<R>(reader: R) -> impl Stream<Item = LogRecord>
where
    R: AsyncRead + Unpin,
{
    async_stream::stream! {
        let mut classifier = LogClassifier::new();
        for await chunk in chunk_stream(reader) {
            for record in classifier.feed(&chunk) {
                yield record;
            }
        }
        for record in classifier.finish() {
            yield record;
        }
    }
}
