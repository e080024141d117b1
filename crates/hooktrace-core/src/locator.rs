//! Discovery of session logs modified since their checkpoint

use crate::types::{Checkpoint, Session};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Leading lines searched for a `sessionId`
const SESSION_ID_SCAN_LINES: usize = 8;
const SESSION_ID_SCAN_BYTES: u64 = 1024 * 1024;

/// Read access to per-session checkpoints
pub trait CheckpointRead {
    fn checkpoint(&self, session_id: &str) -> Checkpoint;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedSession {
    pub session: Session,
    pub modified_at: DateTime<Utc>,
    /// No checkpoint existed for this session yet
    pub new_since_checkpoint: bool,
}

/// Derive a readable project label from a projects sub-directory name
///
/// `-Users-name-my-project` becomes `my-project`; names with three or fewer
/// dash-separated parts are returned unchanged.
pub fn project_label(dir_name: &str) -> String {
    let parts: Vec<&str> = dir_name.split('-').collect();
    if parts.len() > 3 {
        parts[3..].join("-")
    } else {
        dir_name.to_string()
    }
}

/// The `sessionId` recorded near the top of a log, if any
pub fn logged_session_id(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    BufReader::new(file.take(SESSION_ID_SCAN_BYTES))
        .lines()
        .take(SESSION_ID_SCAN_LINES)
        .map_while(Result::ok)
        .filter_map(|line| serde_json::from_str::<Value>(&line).ok())
        .find_map(|value| {
            value
                .get("sessionId")
                .and_then(|id| id.as_str())
                .filter(|id| !id.is_empty())
                .map(String::from)
        })
}

/// All session logs under `projects_dir/<project>/<session>.jsonl` with their mtimes
pub fn discover_sessions(projects_dir: &Path) -> Vec<(Session, DateTime<Utc>)> {
    let project_dirs = match std::fs::read_dir(projects_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %projects_dir.display(), error = %e, "projects directory not readable");
            return Vec::new();
        }
    };

    let mut sessions = Vec::new();
    for project_entry in project_dirs.flatten() {
        let project_path = project_entry.path();
        if !project_path.is_dir() {
            continue;
        }
        let project = project_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(project_label)
            .unwrap_or_default();

        let files = match std::fs::read_dir(&project_path) {
            Ok(files) => files,
            Err(_) => continue,
        };
        for file_entry in files.flatten() {
            let path = file_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            let modified = match file_entry.metadata().and_then(|m| m.modified()) {
                Ok(m) if file_entry.file_type().map(|t| t.is_file()).unwrap_or(false) => m,
                _ => continue,
            };
            sessions.push((
                Session {
                    conversation_id: id.clone(),
                    id,
                    project: project.clone(),
                    log_path: path,
                },
                DateTime::<Utc>::from(modified),
            ));
        }
    }
    sessions
}

/// Sessions whose log is strictly newer than their checkpoint
///
/// Ordered most-recently-modified first and truncated to `max_sessions`.
/// The second value counts modified sessions left for a later run. Kept
/// sessions get their conversation id from the log when it records one.
pub fn locate_modified<C: CheckpointRead + ?Sized>(
    sessions: Vec<(Session, DateTime<Utc>)>,
    checkpoints: &C,
    max_sessions: usize,
) -> (Vec<LocatedSession>, usize) {
    let mut modified: Vec<LocatedSession> = sessions
        .into_iter()
        .filter_map(|(session, modified_at)| {
            let checkpoint = checkpoints.checkpoint(&session.id);
            if modified_at <= checkpoint.last_updated_at {
                return None;
            }
            Some(LocatedSession {
                new_since_checkpoint: checkpoint == Checkpoint::default(),
                session,
                modified_at,
            })
        })
        .collect();

    modified.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| a.session.id.cmp(&b.session.id))
    });

    let deferred = modified.len().saturating_sub(max_sessions);
    modified.truncate(max_sessions);
    for located in &mut modified {
        if let Some(id) = logged_session_id(&located.session.log_path) {
            located.session.conversation_id = id;
        }
    }
    (modified, deferred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct MapCheckpoints(HashMap<String, Checkpoint>);

    impl CheckpointRead for MapCheckpoints {
        fn checkpoint(&self, session_id: &str) -> Checkpoint {
            self.0.get(session_id).copied().unwrap_or_default()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            conversation_id: id.to_string(),
            project: "p".to_string(),
            log_path: PathBuf::from(format!("/tmp/{}.jsonl", id)),
        }
    }

    #[test]
    fn test_project_label() {
        assert_eq!(project_label("-Users-doneyli-djg-family-office"), "djg-family-office");
        assert_eq!(project_label("-Users-john-my-project"), "my-project");
        assert_eq!(project_label("-Users-doneyli-code-my-app"), "code-my-app");
        assert_eq!(project_label("-Users-bob"), "-Users-bob");
    }

    #[test]
    fn test_equal_mtime_is_not_modified() {
        let mut map = HashMap::new();
        map.insert(
            "a".to_string(),
            Checkpoint {
                offset: 10,
                last_updated_at: at(5),
                turn_count: 1,
            },
        );
        let checkpoints = MapCheckpoints(map);
        let (located, deferred) = locate_modified(vec![(session("a"), at(5))], &checkpoints, 10);
        assert!(located.is_empty());
        assert_eq!(deferred, 0);

        let (located, _) = locate_modified(vec![(session("a"), at(6))], &checkpoints, 10);
        assert_eq!(located.len(), 1);
        assert!(!located[0].new_since_checkpoint);
    }

    #[test]
    fn test_ordering_and_cap() {
        let checkpoints = MapCheckpoints(HashMap::new());
        let sessions: Vec<_> = (0..15)
            .map(|i| (session(&format!("s{:02}", i)), at(i)))
            .collect();
        let (located, deferred) = locate_modified(sessions, &checkpoints, 10);
        assert_eq!(located.len(), 10);
        assert_eq!(deferred, 5);
        assert_eq!(located[0].session.id, "s14");
        assert_eq!(located[9].session.id, "s05");
        assert!(located.iter().all(|l| l.new_since_checkpoint));
    }

    #[test]
    fn test_discover_sessions() {
        let temp = tempfile::TempDir::new().unwrap();
        let project_dir = temp.path().join("-Users-alice-web-app");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("abc.jsonl"), "{}\n").unwrap();
        std::fs::write(project_dir.join("notes.txt"), "x").unwrap();
        std::fs::write(temp.path().join("stray.jsonl"), "{}\n").unwrap();

        let sessions = discover_sessions(temp.path());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].0.id, "abc");
        assert_eq!(sessions[0].0.project, "web-app");
    }

    #[test]
    fn test_conversation_id_read_from_log() {
        let temp = tempfile::TempDir::new().unwrap();
        let project_dir = temp.path().join("-Users-alice-web-app");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(
            project_dir.join("file-stem.jsonl"),
            "{\"type\":\"summary\",\"summary\":\"x\"}\n\
             {\"type\":\"user\",\"sessionId\":\"conv-42\",\"message\":{\"content\":\"hi\"}}\n",
        )
        .unwrap();
        std::fs::write(project_dir.join("plain.jsonl"), "{\"type\":\"user_message\",\"text\":\"hi\"}\n")
            .unwrap();

        let sessions = discover_sessions(temp.path());
        let (mut located, _) = locate_modified(sessions, &MapCheckpoints(HashMap::new()), 10);
        located.sort_by(|a, b| a.session.id.cmp(&b.session.id));

        assert_eq!(located[0].session.id, "file-stem");
        assert_eq!(located[0].session.conversation_id, "conv-42");
        assert_eq!(located[1].session.id, "plain");
        assert_eq!(located[1].session.conversation_id, "plain");
    }

    #[test]
    fn test_discover_missing_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(discover_sessions(&temp.path().join("nope")).is_empty());
    }

    #[test]
    fn test_discover_uses_file_mtime() {
        let temp = tempfile::TempDir::new().unwrap();
        let project_dir = temp.path().join("proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join("s.jsonl");
        std::fs::write(&path, "{}\n").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_700_000_100, 0))
            .unwrap();

        let sessions = discover_sessions(temp.path());
        assert_eq!(sessions[0].1, at(100));
    }
}
