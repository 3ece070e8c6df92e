//! Turning evaluation outcomes into transcript text.

use crate::consts::RESULT_PREFIX;
use crate::interpreter::{Failure, Frame, SourceLocation, Value};

/// Drop the engine's own frames from `trace`.
///
/// Everything from the first frame located at `marker` onwards belongs to
/// the engine. Frames before it are returned untouched; a trace without the
/// marker is returned whole.
pub fn sanitize(trace: &[Frame], marker: &SourceLocation) -> Vec<Frame> {
    let end = trace
        .iter()
        .position(|frame| frame.location == *marker)
        .unwrap_or(trace.len());
    trace[..end].to_vec()
}

/// `"=> <inspect>\n"`
pub fn format_value(value: &Value) -> String {
    format!("{RESULT_PREFIX}{}\n", value.inspect())
}

/// `"<Kind>: <message>\n"`, then the sanitized frames one per line.
pub fn format_failure(failure: &Failure, marker: &SourceLocation) -> String {
    let mut text = format!("{}: {}\n", failure.kind, failure.message);
    let frames = sanitize(&failure.trace, marker);
    if !frames.is_empty() {
        let lines: Vec<String> = frames.iter().map(ToString::to_string).collect();
        text.push_str(&lines.join("\n"));
        text.push('\n');
    }
    text
}
