#![allow(dead_code)]

use hooktrace_core::Config;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PROJECT_DIR: &str = "-Users-dev-checkout-service";

/// Temporary state and projects directories plus a config pointing at them
pub struct Workspace {
    pub temp: TempDir,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::new();
        config.state_dir = Some(temp.path().join("state"));
        config.projects_dir = Some(temp.path().join("projects"));
        Self { temp, config }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.temp.path().join("state")
    }

    pub fn log_path(&self, session: &str) -> PathBuf {
        self.temp
            .path()
            .join("projects")
            .join(PROJECT_DIR)
            .join(format!("{}.jsonl", session))
    }

    /// Append raw JSONL and set the file's mtime to `mtime` seconds
    pub fn append(&self, session: &str, lines: &[String], mtime: i64) {
        let path = self.log_path(session);
        append_lines(&path, lines);
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(mtime, 0)).unwrap();
    }
}

pub fn append_lines(path: &Path, lines: &[String]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

/// A transcript-format user prompt
pub fn user(text: &str, ts: &str) -> String {
    json!({
        "type": "user",
        "uuid": format!("u-{}", ts),
        "timestamp": ts,
        "message": {"role": "user", "content": text},
    })
    .to_string()
}

/// A transcript-format assistant message with optional tool calls
pub fn assistant(id: &str, text: &str, tools: &[(&str, &str)], ts: &str) -> String {
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(json!({"type": "text", "text": text}));
    }
    for (tool_id, name) in tools {
        content.push(json!({
            "type": "tool_use",
            "id": tool_id,
            "name": name,
            "input": {"command": "cargo fmt", "api_key": "sk-abcdefghijklmnopqrstuv"},
        }));
    }
    let stop_reason = if tools.is_empty() { "end_turn" } else { "tool_use" };
    json!({
        "type": "assistant",
        "timestamp": ts,
        "message": {
            "id": id,
            "role": "assistant",
            "model": "claude-sonnet-4",
            "stop_reason": stop_reason,
            "content": content,
        },
    })
    .to_string()
}

/// A transcript-format tool result
pub fn tool_result(tool_id: &str, output: &str, ts: &str) -> String {
    json!({
        "type": "user",
        "timestamp": ts,
        "message": {
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": tool_id, "content": output}],
        },
    })
    .to_string()
}

/// Prompt, one tool round trip, final answer
pub fn tool_turn(n: usize) -> Vec<String> {
    let minute = format!("2025-03-01T10:{:02}", n);
    let tool_id = format!("toolu_{}", n);
    vec![
        user(&format!("format the code, attempt {}", n), &format!("{}:00Z", minute)),
        assistant(
            &format!("msg_{}a", n),
            "Running the formatter.",
            &[(tool_id.as_str(), "Bash")],
            &format!("{}:01Z", minute),
        ),
        tool_result(&tool_id, "ok", &format!("{}:02Z", minute)),
        assistant(&format!("msg_{}b", n), "Formatted.", &[], &format!("{}:03Z", minute)),
    ]
}
