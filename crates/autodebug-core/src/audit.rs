//! Tamper-evident session artifacts.
//!
//! `<dir>/<session_id>/session.json` holds the pretty-printed
//! [`SessionReport`]; `session.digest` holds the sha256 of those bytes.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{RepairError, Result};
use crate::session::SessionReport;

const ARTIFACT_FILE: &str = "session.json";
const DIGEST_FILE: &str = "session.digest";

/// Hex-encoded sha256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `report` under `dir` and return the artifact path.
pub fn write_session_artifact(report: &SessionReport, dir: &Path) -> Result<PathBuf> {
    let session_dir = dir.join(report.session.id.to_string());
    std::fs::create_dir_all(&session_dir)?;

    let artifact_path = session_dir.join(ARTIFACT_FILE);
    let json = serde_json::to_vec_pretty(report)?;

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(session_dir.join(DIGEST_FILE), content_digest(&json))?;

    Ok(artifact_path)
}

/// Read `<dir>/<session_id>/session.json` and verify its digest.
pub fn read_session_artifact(session_id: &str, dir: &Path) -> Result<SessionReport> {
    let session_dir = dir.join(session_id);
    let json = std::fs::read(session_dir.join(ARTIFACT_FILE))?;
    let expected = std::fs::read_to_string(session_dir.join(DIGEST_FILE))?;

    let actual = content_digest(&json);
    if expected.trim() != actual {
        return Err(RepairError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionOutcome;
    use crate::session::{AttemptRecord, DebugSession, TargetSource, TerminalState};
    use chrono::Utc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn sample_report() -> SessionReport {
        SessionReport {
            session: DebugSession {
                id: Uuid::new_v4(),
                target: TargetSource {
                    path: PathBuf::from("todo.py"),
                    content: "print('ok')".to_string(),
                },
                max_attempts: 5,
                attempts: vec![AttemptRecord {
                    index: 1,
                    outcome: ExecutionOutcome::Success,
                    proposal: None,
                    decision: None,
                    applied: false,
                }],
                backup_path: PathBuf::from("todo.py.backup"),
                started_at: Utc::now(),
            },
            terminal: TerminalState::Succeeded,
            executions: 1,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_content_digest_is_sha256_hex() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_write_then_read_verifies() {
        let dir = tempdir().unwrap();
        let report = sample_report();

        let path = write_session_artifact(&report, dir.path()).unwrap();
        assert!(path.ends_with("session.json"));

        let back = read_session_artifact(&report.session.id.to_string(), dir.path()).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_tampered_artifact_is_rejected() {
        let dir = tempdir().unwrap();
        let report = sample_report();
        let path = write_session_artifact(&report, dir.path()).unwrap();

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("succeeded", "exhausted");
        std::fs::write(&path, tampered).unwrap();

        let err = read_session_artifact(&report.session.id.to_string(), dir.path()).unwrap_err();
        assert!(matches!(err, RepairError::DigestMismatch { .. }));
    }
}
