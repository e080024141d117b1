//! Incremental turn assembly over the unprocessed tail of a session log

use crate::transcript::{is_terminal_stop_reason, parse_line, LogEntry};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// One assistant message, with streamed parts merged
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub message_id: Option<String>,
    pub model: Option<String>,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Resolved {
        content: Value,
        is_error: bool,
        completed_at: Option<DateTime<Utc>>,
    },
    /// No matching result was logged before the turn closed
    Unresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub invoked_at: Option<DateTime<Utc>>,
    pub outcome: ToolOutcome,
}

/// A user input, the assistant's replies and the tool calls in between
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Byte offset of the line holding the user message
    pub start_offset: u64,
    pub user_text: String,
    pub user_timestamp: Option<DateTime<Utc>>,
    pub replies: Vec<AssistantReply>,
    pub tool_calls: Vec<ToolCall>,
    /// Timestamp of the last entry that belongs to the turn
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    fn new(start_offset: u64, text: String, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            start_offset,
            user_text: text,
            user_timestamp: timestamp,
            replies: Vec::new(),
            tool_calls: Vec::new(),
            last_timestamp: timestamp,
        }
    }

    /// Text of the last assistant reply that said anything
    pub fn final_output(&self) -> &str {
        self.replies
            .iter()
            .rev()
            .map(|r| r.text.as_str())
            .find(|t| !t.is_empty())
            .unwrap_or("")
    }

    pub fn model(&self) -> Option<&str> {
        self.replies.iter().find_map(|r| r.model.as_deref())
    }
}

/// A complete turn and the offset just past its last line
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTurn {
    pub turn: Turn,
    pub end_offset: u64,
}

struct OpenTurn {
    turn: Turn,
    /// Last entry is an assistant message that declared itself finished
    complete: bool,
    /// Opened on entries found before any user message
    resumed: bool,
    end_offset: u64,
}

impl OpenTurn {
    fn apply(&mut self, entry: LogEntry) {
        if let Some(ts) = entry.timestamp() {
            self.turn.last_timestamp = Some(ts);
        }
        match entry {
            LogEntry::UserMessage { .. } => {}
            LogEntry::AssistantMessage {
                message_id,
                model,
                text,
                stop_reason,
                timestamp,
            } => {
                let continues = match (self.turn.replies.last(), &message_id) {
                    (Some(last), Some(id)) => last.message_id.as_deref() == Some(id.as_str()),
                    _ => false,
                };
                if continues {
                    if let Some(last) = self.turn.replies.last_mut() {
                        if !text.is_empty() {
                            if !last.text.is_empty() {
                                last.text.push('\n');
                            }
                            last.text.push_str(&text);
                        }
                        if last.model.is_none() {
                            last.model = model;
                        }
                    }
                } else {
                    self.turn.replies.push(AssistantReply {
                        message_id,
                        model,
                        text,
                        timestamp,
                    });
                }
                self.complete = stop_reason.as_deref().is_some_and(is_terminal_stop_reason);
            }
            LogEntry::ToolInvocation {
                id,
                name,
                input,
                timestamp,
            } => {
                self.turn.tool_calls.push(ToolCall {
                    id,
                    name,
                    input,
                    invoked_at: timestamp,
                    outcome: ToolOutcome::Unresolved,
                });
                self.complete = false;
            }
            LogEntry::ToolResult {
                tool_use_id,
                content,
                is_error,
                timestamp,
            } => {
                let call = self.turn.tool_calls.iter_mut().rev().find(|c| {
                    c.id == tool_use_id && matches!(c.outcome, ToolOutcome::Unresolved)
                });
                match call {
                    Some(call) => {
                        call.outcome = ToolOutcome::Resolved {
                            content,
                            is_error,
                            completed_at: timestamp,
                        };
                    }
                    None => {
                        tracing::debug!(tool_use_id = %tool_use_id, "tool result without matching invocation");
                    }
                }
                self.complete = false;
            }
        }
    }
}

/// Lazily yields complete turns from a log, starting at a line boundary
///
/// Only newline-terminated lines are consumed. A turn is yielded once the next
/// user message starts, or at end of input when its last entry is an assistant
/// message with a terminal stop reason. Anything else at end of input may
/// still be mid-write and is held back, so restarting from the last yielded
/// `end_offset` is always safe.
pub struct TurnAssembler<R> {
    reader: R,
    position: u64,
    open: Option<OpenTurn>,
    malformed: usize,
    finished: bool,
}

impl TurnAssembler<BufReader<File>> {
    /// Open a log file and position the assembler at `offset`
    pub fn open(path: &Path, offset: u64) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self::new(BufReader::new(file), offset))
    }
}

impl<R: BufRead> TurnAssembler<R> {
    /// `reader` must already be positioned at `start_offset`
    pub fn new(reader: R, start_offset: u64) -> Self {
        Self {
            reader,
            position: start_offset,
            open: None,
            malformed: 0,
            finished: false,
        }
    }

    /// Number of lines skipped as unparseable so far
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// Read the next full line, `None` at end of input or on a partial line
    fn next_line(&mut self) -> Option<(u64, String)> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) if buf.last() != Some(&b'\n') => None,
            Ok(n) => {
                let start = self.position;
                self.position += n as u64;
                Some((start, String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(e) => {
                tracing::warn!(offset = self.position, error = %e, "failed to read session log");
                None
            }
        }
    }

    fn close_open(&mut self) -> Option<AssembledTurn> {
        let open = self.open.take()?;
        if open.turn.replies.is_empty() {
            if open.resumed {
                tracing::warn!(
                    offset = open.turn.start_offset,
                    tool_calls = open.turn.tool_calls.len(),
                    "entries before the next user message had no reply, dropping them"
                );
            } else {
                tracing::debug!(
                    offset = open.turn.start_offset,
                    "user message superseded without a reply"
                );
            }
            return None;
        }
        Some(AssembledTurn {
            turn: open.turn,
            end_offset: open.end_offset,
        })
    }
}

impl<R: BufRead> Iterator for TurnAssembler<R> {
    type Item = AssembledTurn;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while let Some((line_start, line)) = self.next_line() {
            let line_end = self.position;
            if line.trim().is_empty() {
                if let Some(open) = self.open.as_mut() {
                    open.end_offset = line_end;
                }
                continue;
            }

            let entries = match parse_line(line.trim_end()) {
                Ok(entries) => entries,
                Err(e) => {
                    self.malformed += 1;
                    tracing::warn!(offset = line_start, error = %e, "skipping malformed log line");
                    if let Some(open) = self.open.as_mut() {
                        open.end_offset = line_end;
                    }
                    continue;
                }
            };

            let mut ready = None;
            for entry in entries {
                if let LogEntry::UserMessage { text, timestamp } = entry {
                    if let Some(closed) = self.close_open() {
                        ready = Some(closed);
                    }
                    self.open = Some(OpenTurn {
                        turn: Turn::new(line_start, text, timestamp),
                        complete: false,
                        resumed: false,
                        end_offset: line_end,
                    });
                    continue;
                }

                let open = self.open.get_or_insert_with(|| {
                    tracing::warn!(
                        offset = line_start,
                        "log resumes without a user message, continuing as its own turn"
                    );
                    OpenTurn {
                        turn: Turn::new(line_start, String::new(), entry.timestamp()),
                        complete: false,
                        resumed: true,
                        end_offset: line_end,
                    }
                });
                open.apply(entry);
            }
            if let Some(open) = self.open.as_mut() {
                open.end_offset = line_end;
            }

            if ready.is_some() {
                return ready;
            }
        }

        self.finished = true;
        let complete = self.open.as_ref().map(|o| o.complete).unwrap_or(false);
        if complete {
            self.close_open()
        } else {
            None
        }
    }
}
