//! Line-oriented operator input.
//!
//! The producer side of the command channel: reads one line at a time and
//! turns it into a speed command or a stop request.
//!
//! | Line | Effect |
//! |------|--------|
//! | `120` | submit speed 120 (range checked) |
//! | `q`, `quit`, `exit`, `stop` | request cancellation |
//! | empty | ignored |
//! | anything else | rejected with a warning |
//!
//! End of input ends the producer without cancelling the supervisor.

use std::io::BufRead;

use crate::cancel::CancelToken;
use crate::command::{CommandSender, SubmitError};

/// One parsed operator line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperatorLine {
    /// Requested speed, not yet range checked.
    Speed(i64),
    /// Stop the supervisor.
    Quit,
    /// Whitespace only.
    Blank,
    /// Not understood.
    Unrecognized(String),
}

impl OperatorLine {
    /// Parse a single line of input.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return OperatorLine::Blank;
        }
        if let Ok(value) = line.parse::<i64>() {
            return OperatorLine::Speed(value);
        }
        match line.to_ascii_lowercase().as_str() {
            "q" | "quit" | "exit" | "stop" => OperatorLine::Quit,
            _ => OperatorLine::Unrecognized(line.to_string()),
        }
    }
}

/// Why the input loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEnd {
    /// Operator asked to stop; cancellation was requested.
    Quit,
    /// Reader reached end of input.
    EndOfInput,
    /// Cancellation observed before a read.
    Cancelled,
    /// The supervisor side closed the channel.
    ChannelClosed,
    /// The reader failed.
    ReadError,
}

/// Tally of one input session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSummary {
    /// Speed commands queued.
    pub accepted: u32,
    /// Out-of-range or unparseable lines.
    pub rejected: u32,
    /// How the loop ended.
    pub end: InputEnd,
}

/// Feed `reader` into `sender` until quit, end of input, cancellation or a
/// closed channel.
///
/// Cancellation is checked before every read. A blocking read that is
/// already in progress is not interrupted.
pub fn run_operator_input<R: BufRead>(
    mut reader: R,
    sender: &CommandSender,
    cancel: &CancelToken,
) -> InputSummary {
    let mut accepted = 0;
    let mut rejected = 0;
    let mut line = String::new();

    let end = loop {
        if cancel.is_cancelled() {
            break InputEnd::Cancelled;
        }
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break InputEnd::EndOfInput,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "operator input failed");
                break InputEnd::ReadError;
            }
        }

        match OperatorLine::parse(&line) {
            OperatorLine::Blank => {}
            OperatorLine::Quit => {
                tracing::info!("operator requested stop");
                cancel.cancel();
                break InputEnd::Quit;
            }
            OperatorLine::Speed(value) => match sender.submit_speed(value) {
                Ok(cmd) => {
                    accepted += 1;
                    tracing::info!(speed = cmd.value(), "speed command queued");
                }
                Err(SubmitError::Invalid(err)) => {
                    rejected += 1;
                    tracing::warn!(error = %err, "speed command rejected");
                }
                Err(SubmitError::Closed) => break InputEnd::ChannelClosed,
            },
            OperatorLine::Unrecognized(text) => {
                rejected += 1;
                tracing::warn!(input = %text, "unrecognized operator input");
            }
        }
    };

    tracing::debug!(accepted, rejected, ?end, "operator input finished");
    InputSummary {
        accepted,
        rejected,
        end,
    }
}
