//! File-level contract for structured logs and artifact indexes.

use std::path::PathBuf;

use portremap_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, StreamKind, sha256_hex,
    validate_log_file,
};

fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("portremap-{}-{name}", std::process::id()))
}

#[test]
fn emitted_log_file_validates() {
    let path = scratch("emitted.jsonl");
    {
        let mut emitter = LogEmitter::to_file(&path, "bind", "run-1").unwrap();
        emitter.emit(LogLevel::Info, "suite_start").unwrap();
        emitter
            .emit_entry(
                LogEntry::new(String::new(), LogLevel::Info, "case_result")
                    .with_stream(StreamKind::E2e)
                    .with_case("database_port_redirected")
                    .with_ports(5432, Some(40000))
                    .with_outcome(Outcome::Pass),
            )
            .unwrap();
        emitter.emit(LogLevel::Info, "suite_end").unwrap();
        emitter.flush().unwrap();
    }

    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 3);
    assert!(errors.is_empty(), "{errors:?}");

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains(r#""trace_id":"bind::run-1::002""#));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn invalid_lines_are_reported_with_line_numbers() {
    let path = scratch("invalid.jsonl");
    std::fs::write(
        &path,
        "{\"timestamp\":\"t\",\"trace_id\":\"a::b::1\",\"level\":\"info\",\"event\":\"ok\"}\n\
         \n\
         not json\n\
         {\"timestamp\":\"t\",\"trace_id\":\"a::b::2\",\"level\":\"info\",\"event\":\"e\",\"outcome\":\"maybe\"}\n",
    )
    .unwrap();

    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 3);
    let numbered: Vec<(usize, &str)> = errors
        .iter()
        .map(|e| (e.line_number, e.field.as_str()))
        .collect();
    assert_eq!(numbered, vec![(3, "<json>"), (4, "outcome")]);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn artifact_index_hashes_log_contents() {
    let path = scratch("indexed.jsonl");
    std::fs::write(&path, b"abc").unwrap();

    let mut index = ArtifactIndex::new("run-9");
    index.add_file(&path, "log").unwrap();
    let entry = &index.artifacts[0];
    assert_eq!(
        entry.sha256,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(entry.sha256, sha256_hex(b"abc"));
    assert_eq!(entry.size_bytes, Some(3));

    let parsed: serde_json::Value = serde_json::from_str(&index.to_json().unwrap()).unwrap();
    assert_eq!(parsed["index_version"], 1);
    assert_eq!(parsed["artifacts"][0]["kind"], "log");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_log_is_an_io_error() {
    assert!(validate_log_file(&scratch("absent.jsonl")).is_err());
}
