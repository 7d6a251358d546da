//! Server console output classification.
//!
//! Tomcat writes its log to the console as a sequence of entries, each made of
//! a source line (timestamp and logger) followed by a `LEVEL: text` line whose
//! text may continue over further lines:
//!
//! ```text
//! Jan 1, 2024 10:00:01 AM org.apache.catalina.startup.Catalina start
//! INFO: Server startup in 543 ms
//! ```
//!
//! This module turns the raw byte stream into [`LogRecord`]s. Entry boundaries
//! are only recognized at `"\nINFO: "` and `"\nSEVERE: "`, which means the
//! classifier has to look ahead past multi-line bodies and hold back an
//! incomplete tail between reads. Once that tail grows past
//! [`MAX_PENDING_BYTES`] its complete lines are emitted without a boundary,
//! so output that never carries a level label still gets through.
//!
//! # Components
//!
//! * `classifier` - The pure `classify`/`finish` functions and the stateful `LogClassifier`
//! * `record` - `LogRecord` and `LogLevel`
//! * `stream` - Lazy record streams over async readers

mod classifier;
mod record;
mod stream;

pub use classifier::{LogClassifier, MAX_PENDING_BYTES, PartialState, classify, finish};
pub use record::{LogLevel, LogRecord};
pub use stream::record_stream;

pub(crate) use stream::chunk_stream;
