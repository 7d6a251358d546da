use super::record::{LogLevel, LogRecord};

/// Markers that open a new entry. The entry itself starts one line earlier,
/// at its source line.
const BOUNDARY_MARKERS: [&[u8]; 2] = [b"\nSEVERE: ", b"\nINFO: "];

/// Length of the longest boundary marker.
const LONGEST_MARKER: usize = BOUNDARY_MARKERS[0].len();

/// Separator between the level label and the message text.
const LEVEL_SEPARATOR: &[u8] = b": ";

/// Most bytes the carry holds before its complete lines are emitted
/// without waiting for a boundary.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Bytes received but not yet attributable to a complete record.
///
/// Output arrives in arbitrarily sized chunks, so an entry (or a boundary
/// marker) may be split across reads. The carry holds that unfinished tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialState {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a boundary.
    scanned: usize,
}

impl PartialState {
    /// An empty carry, for the start of a stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// The buffered bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Classify one chunk of server output.
///
/// Appends `chunk` to the carried tail and returns every record whose right
/// boundary is now known, together with the new carry. A record is only
/// produced once the next `"\nINFO: "`/`"\nSEVERE: "` marker has arrived;
/// the last entry of a stream is produced by [`finish`].
///
/// # Examples
///
/// ```
/// use tomcat_runner::log::{classify, finish, LogLevel, PartialState};
///
/// let (records, carry) = classify(b"2024 Jan 1\nINFO: Server sta", PartialState::new());
/// assert!(records.is_empty());
///
/// let (records, carry) = classify(b"rtup in 200 ms\n", carry);
/// assert!(records.is_empty());
///
/// let records = finish(carry);
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].level, LogLevel::Info);
/// assert_eq!(records[0].text, "Server startup in 200 ms");
/// ```
pub fn classify(chunk: &[u8], carry: PartialState) -> (Vec<LogRecord>, PartialState) {
    let PartialState {
        mut buffer,
        mut scanned,
    } = carry;
    buffer.extend_from_slice(chunk);

    let mut records = Vec::new();
    let mut consumed = 0;
    while let Some((record, used)) = next_entry(&buffer[consumed..], false, scanned) {
        records.push(record);
        consumed += used;
        scanned = 0;
    }
    buffer.drain(..consumed);

    if buffer.len() > MAX_PENDING_BYTES {
        // Output without boundaries: give up on the entry and emit its
        // complete lines.
        let cut = buffer
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(buffer.len(), |newline| newline + 1);
        let rest = buffer.split_off(cut);
        records.extend(finish(PartialState {
            buffer,
            scanned: 0,
        }));
        buffer = rest;
    }

    let scanned = buffer.len();
    (records, PartialState { buffer, scanned })
}

/// Classify whatever is left at end of stream.
pub fn finish(carry: PartialState) -> Vec<LogRecord> {
    let buffer = carry.buffer;
    let mut records = Vec::new();
    let mut consumed = 0;
    while let Some((record, used)) = next_entry(&buffer[consumed..], true, 0) {
        records.push(record);
        consumed += used;
    }
    records
}

/// Stateful wrapper around [`classify`] for a single output stream.
#[derive(Debug, Default)]
pub struct LogClassifier {
    carry: PartialState,
}

impl LogClassifier {
    /// Create a classifier for a new stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk, returning the records it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<LogRecord> {
        let carry = std::mem::take(&mut self.carry);
        let (records, carry) = classify(chunk, carry);
        self.carry = carry;
        records
    }

    /// Bytes still waiting for a boundary
    pub fn pending(&self) -> &[u8] {
        self.carry.as_bytes()
    }

    /// Emit the buffered entry without waiting for its boundary.
    ///
    /// Only flushes when the buffer ends on a complete line, so a line that
    /// is still arriving is never cut in half.
    pub fn flush_pending(&mut self) -> Vec<LogRecord> {
        if self.carry.buffer.last() != Some(&b'\n') {
            return Vec::new();
        }
        finish(std::mem::take(&mut self.carry))
    }

    /// End of stream: emit everything that is left
    pub fn finish(self) -> Vec<LogRecord> {
        finish(self.carry)
    }
}

/// Parse the entry at the front of `input`.
///
/// Returns the record and the number of bytes it spans, or `None` when the
/// entry's extent can't be decided from the bytes at hand. The first
/// `scanned` bytes hold no complete boundary marker.
fn next_entry(input: &[u8], at_end: bool, scanned: usize) -> Option<(LogRecord, usize)> {
    if input.is_empty() {
        return None;
    }

    let Some(source_end) = find(input, b"\n") else {
        if at_end {
            let record = LogRecord::new(decode_line(input), LogLevel::Unknown, "");
            return Some((record, input.len()));
        }
        return None;
    };
    let source = &input[..source_end];
    let rest = &input[source_end + 1..];

    let line_end = find(rest, b"\n");
    let level_line = &rest[..line_end.unwrap_or(rest.len())];
    let (level, body_start) = match find(level_line, LEVEL_SEPARATOR) {
        Some(sep) => (
            LogLevel::from_label(&String::from_utf8_lossy(&level_line[..sep])),
            sep + LEVEL_SEPARATOR.len(),
        ),
        // A complete line with no label: it is all message text.
        None if line_end.is_some() || at_end => (LogLevel::Unknown, 0),
        None => return None,
    };

    let body = &rest[body_start..];
    let body_offset = source_end + 1 + body_start;
    let search_from = scanned
        .saturating_sub(LONGEST_MARKER - 1)
        .saturating_sub(body_offset)
        .min(body.len());
    let boundary = first_boundary(&body[search_from..]).map(|at| at + search_from);
    let (text, body_used) = match boundary {
        Some(marker) => {
            let next_start = body[..marker]
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |newline| newline + 1);
            (&body[..next_start.saturating_sub(1)], next_start)
        }
        None if at_end => (body, body.len()),
        None => return None,
    };

    let record = LogRecord::new(decode_line(source), level, decode_text(text));
    Some((record, body_offset + body_used))
}

fn first_boundary(body: &[u8]) -> Option<usize> {
    BOUNDARY_MARKERS
        .iter()
        .filter_map(|marker| find(body, marker))
        .min()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    decode_line(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_all(input: &[u8]) -> Vec<LogRecord> {
        let (mut records, carry) = classify(input, PartialState::new());
        records.extend(finish(carry));
        records
    }

    const TWO_ENTRIES: &[u8] = b"Jan 1, 2024 10:00:00 AM org.apache.catalina.core.AprLifecycleListener init\n\
INFO: The APR based Apache Tomcat Native library was not found\n\
on the java.library.path: /usr/lib\n\
Jan 1, 2024 10:00:01 AM org.apache.catalina.startup.Catalina start\n\
INFO: Server startup in 543 ms\n";

    #[test]
    fn test_single_startup_entry() {
        let records = classify_all(b"2024 Jan 1\nINFO: Server startup in 543 ms\n");
        assert_eq!(
            records,
            vec![LogRecord::new(
                "2024 Jan 1",
                LogLevel::Info,
                "Server startup in 543 ms"
            )]
        );
    }

    #[test]
    fn test_multiline_body_is_kept_together() {
        let records = classify_all(TWO_ENTRIES);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].text,
            "The APR based Apache Tomcat Native library was not found\non the java.library.path: /usr/lib"
        );
        assert_eq!(
            records[1].source,
            "Jan 1, 2024 10:00:01 AM org.apache.catalina.startup.Catalina start"
        );
        assert_eq!(records[1].text, "Server startup in 543 ms");
    }

    #[test]
    fn test_record_waits_for_boundary() {
        let (records, carry) = classify(b"2024 Jan 1\nINFO: Server startup in 543 ms\n", PartialState::new());
        assert!(records.is_empty());
        assert!(!carry.is_empty());

        let (records, carry) = classify(b"2024 Jan 1\nSEVERE: boom\n", carry);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Server startup in 543 ms");
        assert_eq!(carry.as_bytes(), b"2024 Jan 1\nSEVERE: boom\n");
    }

    #[test]
    fn test_every_split_point_gives_same_records() {
        let expected = classify_all(TWO_ENTRIES);
        for split in 0..=TWO_ENTRIES.len() {
            let (mut records, carry) = classify(&TWO_ENTRIES[..split], PartialState::new());
            let (more, carry) = classify(&TWO_ENTRIES[split..], carry);
            records.extend(more);
            records.extend(finish(carry));
            assert_eq!(records, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let expected = classify_all(TWO_ENTRIES);
        let mut classifier = LogClassifier::new();
        let mut records = Vec::new();
        for byte in TWO_ENTRIES {
            records.extend(classifier.feed(std::slice::from_ref(byte)));
        }
        records.extend(classifier.finish());
        assert_eq!(records, expected);
    }

    #[test]
    fn test_severe_and_unknown_levels() {
        let records = classify_all(b"src\nSEVERE: Port already in use\nsrc2\nWARNING: odd\n");
        assert_eq!(records[0].level, LogLevel::Severe);
        assert_eq!(records[0].text, "Port already in use\nsrc2\nWARNING: odd");
    }

    #[test]
    fn test_line_without_label_is_unknown() {
        let records = classify_all(b"Using CATALINA_BASE:   /opt/tomcat\nTomcat started.\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "Using CATALINA_BASE:   /opt/tomcat");
        assert_eq!(records[0].level, LogLevel::Unknown);
        assert_eq!(records[0].text, "Tomcat started.");
    }

    #[test]
    fn test_crlf_line_endings() {
        let records = classify_all(b"src\r\nINFO: one\r\nsrc2\r\nINFO: two\r\n");
        assert_eq!(records[0], LogRecord::new("src", LogLevel::Info, "one"));
        assert_eq!(records[1], LogRecord::new("src2", LogLevel::Info, "two"));
    }

    #[test]
    fn test_split_utf8_character() {
        let input = "src\nINFO: caf\u{e9} ready\n".as_bytes();
        let split = input.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let (mut records, carry) = classify(&input[..split], PartialState::new());
        let (more, carry) = classify(&input[split..], carry);
        records.extend(more);
        records.extend(finish(carry));
        assert_eq!(records[0].text, "caf\u{e9} ready");
    }

    #[test]
    fn test_flush_pending_only_on_line_boundary() {
        let mut classifier = LogClassifier::new();
        assert!(classifier.feed(b"src\nINFO: Server startup in 1 ms").is_empty());
        assert!(classifier.flush_pending().is_empty());

        assert!(classifier.feed(b"\n").is_empty());
        let flushed = classifier.flush_pending();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].text, "Server startup in 1 ms");
        assert!(classifier.pending().is_empty());
    }

    #[test]
    fn test_output_without_markers_is_bounded() {
        let line = b"Using CATALINA_BASE:   /opt/tomcat, hello from System.out\n";
        let mut classifier = LogClassifier::new();
        let mut records = Vec::new();
        let mut fed = 0;
        while fed < 4 * MAX_PENDING_BYTES {
            records.extend(classifier.feed(line));
            fed += line.len();
            assert!(classifier.pending().len() <= MAX_PENDING_BYTES + line.len());
        }

        assert!(!records.is_empty());
        records.extend(classifier.finish());
        let text: usize = records
            .iter()
            .map(|record| record.source.len() + record.text.len())
            .sum();
        assert!(text > 2 * MAX_PENDING_BYTES);
        assert!(records.iter().all(|record| record.level == LogLevel::Unknown));
    }

    #[test]
    fn test_marker_after_long_body_is_found() {
        let mut input = b"src\nSEVERE: trace\n".to_vec();
        for n in 0..500 {
            input.extend_from_slice(format!("\tat Frame{}.run(Frame.java:{})\n", n, n).as_bytes());
        }
        input.extend_from_slice(b"src2\nINFO: Server startup in 5 ms\n");
        let expected = classify_all(&input);
        assert_eq!(expected.len(), 2);

        for size in [1, 7, 64, 1000] {
            let mut classifier = LogClassifier::new();
            let mut records = Vec::new();
            for chunk in input.chunks(size) {
                records.extend(classifier.feed(chunk));
            }
            records.extend(classifier.finish());
            assert_eq!(records, expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_finish_on_empty_and_bare_source() {
        assert!(finish(PartialState::new()).is_empty());
        let records = finish(classify(b"no newline", PartialState::new()).1);
        assert_eq!(records, vec![LogRecord::new("no newline", LogLevel::Unknown, "")]);
    }
}
