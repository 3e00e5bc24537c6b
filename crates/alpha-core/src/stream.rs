//! Chat stream frames and the assembly state machine.
//!
//! The wire carries one frame per line: `data: {"content": "..."}` for a
//! fragment and `data: [DONE]` once the answer is complete. [`Assembly`]
//! folds frames into the visible message text; it does no I/O, so the async
//! driver in the client only decides *when* frames, cancellation and transport
//! failures reach it.

use serde::{Deserialize, Serialize};

pub const SENTINEL: &str = "[DONE]";
pub const APOLOGY: &str = "I apologize, but I encountered an error. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Fragment(String),
    Done,
    /// A data line whose payload is not valid frame JSON.
    Malformed,
    /// Blank lines, comments, other SSE fields, or frames without content.
    Ignored,
}

/// JSON payload of a fragment frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// JSON payload of a fragment frame, without the `data:` prefix.
pub fn fragment_json(content: &str) -> String {
    let payload = FramePayload {
        content: Some(content.to_string()),
    };
    // Serializing a struct holding one string cannot fail.
    serde_json::to_string(&payload).unwrap_or_default()
}

/// Render a fragment as a wire line (without the trailing blank line).
pub fn encode_fragment(content: &str) -> String {
    format!("data: {}", fragment_json(content))
}

pub fn encode_done() -> String {
    format!("data: {SENTINEL}")
}

/// Classify one line of the stream.
pub fn parse_frame(line: &str) -> Frame {
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim(),
        None if line.trim() == SENTINEL => return Frame::Done,
        None => return Frame::Ignored,
    };

    if payload == SENTINEL {
        return Frame::Done;
    }
    match serde_json::from_str::<FramePayload>(payload) {
        Ok(FramePayload {
            content: Some(content),
        }) if !content.is_empty() => Frame::Fragment(content),
        Ok(_) => Frame::Ignored,
        Err(_) => Frame::Malformed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyState {
    Idle,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl AssemblyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Result of feeding one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Step<'a> {
    /// The buffer grew; carries the whole buffer to publish.
    Published(&'a str),
    /// The sentinel arrived; the assembly is now Completed.
    Finished,
    /// Nothing changed.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Assembly {
    state: AssemblyState,
    buffer: String,
}

impl Default for Assembly {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembly {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::Idle,
            buffer: String::new(),
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    pub fn into_content(self) -> String {
        self.buffer
    }

    pub fn start(&mut self) {
        if self.state == AssemblyState::Idle {
            self.state = AssemblyState::Streaming;
        }
    }

    pub fn apply(&mut self, frame: Frame) -> Step<'_> {
        if self.state != AssemblyState::Streaming {
            return Step::Skipped;
        }
        match frame {
            Frame::Fragment(text) => {
                self.buffer.push_str(&text);
                Step::Published(&self.buffer)
            }
            Frame::Done => {
                self.state = AssemblyState::Completed;
                Step::Finished
            }
            Frame::Malformed | Frame::Ignored => Step::Skipped,
        }
    }

    pub fn apply_line(&mut self, line: &str) -> Step<'_> {
        self.apply(parse_frame(line))
    }

    /// Freeze the buffer at its last published value.
    /// Returns false if the assembly had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = AssemblyState::Cancelled;
        true
    }

    /// Replace partial content with the apology. Returns the new content if
    /// the transition happened.
    pub fn fail(&mut self) -> Option<&str> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = AssemblyState::Failed;
        self.buffer = APOLOGY.to_string();
        Some(&self.buffer)
    }

    /// End of input without a sentinel still completes the assembly.
    pub fn finish(&mut self) {
        if !self.state.is_terminal() {
            self.state = AssemblyState::Completed;
        }
    }
}
