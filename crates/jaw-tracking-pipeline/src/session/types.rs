//! Session bookkeeping: metadata, operation log and export records.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// `ProblemType::name()` of the owning session.
    pub problem_type: String,
    pub schema_version: u32,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub last_modified: u64,
    pub description: Option<String>,
}

impl SessionMetadata {
    pub fn new(problem_type: impl Into<String>, schema_version: u32) -> Self {
        let now = current_timestamp();
        Self {
            problem_type: problem_type.into(),
            schema_version,
            created_at: now,
            last_modified: now,
            description: None,
        }
    }

    pub fn with_description(
        problem_type: impl Into<String>,
        schema_version: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::new(problem_type, schema_version)
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = current_timestamp();
    }
}

/// One step executed on a session; an audit trail, not a replay log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    /// Step name ("calibrate", "register", "smooth", ...).
    pub operation: String,
    pub success: bool,
    pub notes: Option<String>,
}

impl LogEntry {
    pub fn success(operation: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: true,
            notes: None,
        }
    }

    pub fn success_with_notes(operation: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::success(operation)
        }
    }

    pub fn failure(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            notes: Some(error.into()),
            ..Self::success(operation)
        }
    }
}

/// A stored export of the session output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord<E> {
    pub timestamp: u64,
    pub export: E,
    pub notes: Option<String>,
}

impl<E> ExportRecord<E> {
    pub fn new(export: E) -> Self {
        Self {
            timestamp: current_timestamp(),
            export,
            notes: None,
        }
    }

    pub fn with_notes(export: E, notes: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            export,
            notes: Some(notes.into()),
        }
    }
}

/// Current Unix time in seconds (0 if the clock is before the epoch).
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_fields() {
        let meta = SessionMetadata::with_description("jaw_motion", 2, "patient 7");
        assert_eq!(meta.problem_type, "jaw_motion");
        assert_eq!(meta.schema_version, 2);
        assert_eq!(meta.created_at, meta.last_modified);
        assert_eq!(meta.description.as_deref(), Some("patient 7"));
    }

    #[test]
    fn log_entries() {
        let ok = LogEntry::success_with_notes("register", "rmse 0.02");
        assert!(ok.success);
        assert_eq!(ok.notes.as_deref(), Some("rmse 0.02"));
        let failed = LogEntry::failure("calibrate", "landmark `incisal` timed out");
        assert!(!failed.success);
        assert_eq!(failed.operation, "calibrate");
    }

    #[test]
    fn export_record_roundtrip() {
        let record = ExportRecord::with_notes(vec![0.5, 1.5], "smoothed");
        let json = serde_json::to_string(&record).unwrap();
        let back: ExportRecord<Vec<f64>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.export, vec![0.5, 1.5]);
        assert_eq!(back.notes.as_deref(), Some("smoothed"));
    }
}
