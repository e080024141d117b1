//! JSONL I/O and atomic file operations

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Append a JSON record to a JSONL file as a single write
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;
    file.sync_data()?;
    Ok(())
}

/// Records read from a JSONL file plus the raw lines that failed to parse
#[derive(Debug)]
pub struct JsonlContents<T> {
    pub records: Vec<T>,
    pub corrupt_lines: Vec<String>,
}

/// Read all records from a JSONL file
pub fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> std::io::Result<JsonlContents<T>> {
    let mut contents = JsonlContents {
        records: Vec::new(),
        corrupt_lines: Vec::new(),
    };
    if !path.exists() {
        return Ok(contents);
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => contents.records.push(record),
            Err(_) => contents.corrupt_lines.push(line),
        }
    }

    Ok(contents)
}

/// Write data atomically using a uniquely named temp file + rename
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = unique_sibling(path, "tmp");
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

/// `path` with a `.<pid>-<nanos>.<suffix>` extension, unique per process and call
pub fn unique_sibling(path: &Path, suffix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}-{:x}.{}", std::process::id(), nanos, suffix));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestRecord {
        id: u32,
        name: String,
    }

    #[test]
    fn test_jsonl_append_and_read() {
        let temp = tempfile::TempDir::new().unwrap();
        let test_file = temp.path().join("nested").join("records.jsonl");

        let records = vec![
            TestRecord {
                id: 1,
                name: "Alice".to_string(),
            },
            TestRecord {
                id: 2,
                name: "Bob".to_string(),
            },
        ];

        for record in &records {
            append_jsonl(&test_file, record).unwrap();
        }

        let read: JsonlContents<TestRecord> = read_jsonl(&test_file).unwrap();
        assert_eq!(records, read.records);
        assert!(read.corrupt_lines.is_empty());
    }

    #[test]
    fn test_read_jsonl_reports_corrupt_lines() {
        let temp = tempfile::TempDir::new().unwrap();
        let test_file = temp.path().join("records.jsonl");
        std::fs::write(
            &test_file,
            "{\"id\":1,\"name\":\"a\"}\n{\"id\":\n\n{\"id\":2,\"name\":\"b\"}\n",
        )
        .unwrap();

        let read: JsonlContents<TestRecord> = read_jsonl(&test_file).unwrap();
        assert_eq!(read.records.len(), 2);
        assert_eq!(read.corrupt_lines, vec!["{\"id\":".to_string()]);
    }

    #[test]
    fn test_read_jsonl_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let read: JsonlContents<TestRecord> = read_jsonl(&temp.path().join("none.jsonl")).unwrap();
        assert!(read.records.is_empty());
    }

    #[test]
    fn test_atomic_write_replaces_and_leaves_no_temp() {
        let temp = tempfile::TempDir::new().unwrap();
        let test_file = temp.path().join("state.json");

        atomic_write(&test_file, b"first").unwrap();
        atomic_write(&test_file, b"second").unwrap();

        assert_eq!(std::fs::read(&test_file).unwrap(), b"second");
        let entries = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_unique_sibling_differs() {
        let path = Path::new("/tmp/queue.jsonl");
        let a = unique_sibling(path, "claim");
        assert!(a.to_string_lossy().starts_with("/tmp/queue.jsonl."));
        assert!(a.to_string_lossy().ends_with(".claim"));
    }
}
