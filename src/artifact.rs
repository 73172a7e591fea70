//! Tabular artifacts and rendered views on disk.
//!
//! An artifact is a CSV snapshot of one result set, written as
//! `<name>.csv` inside the artifact directory. The rendered view for it is
//! `<name>.html` next to it. Both are replaced atomically: content goes to a
//! temp file in the same directory which is then renamed over the target, so
//! readers only ever see a complete old file or a complete new one.
//!
//! NULL is written as `\N`. Text starting with a backslash gets one extra
//! leading backslash, so decoding is unambiguous.

use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;
use crate::records::{FieldValue, ResultRecord, ResultSet};
use crate::schema::{SchemaContract, SemanticType};

const NULL_MARKER: &str = "\\N";

/// Reference to a tabular artifact (its path, as a string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides, once, whether a pending artifact write may replace its target.
///
/// The writer publishes through the gate; whoever stops waiting for the
/// write abandons it. Both take the same lock, so once `abandon` returns
/// `false` the target can no longer change.
#[derive(Debug, Default)]
pub struct CommitGate {
    state: Mutex<GateState>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum GateState {
    #[default]
    Pending,
    Committed,
    Abandoned,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_abandoned(&self) -> bool {
        *self.state() == GateState::Abandoned
    }

    /// Forbid publishing. Returns `true` if the write was already published.
    pub fn abandon(&self) -> bool {
        let mut state = self.state();
        if *state == GateState::Committed {
            return true;
        }
        *state = GateState::Abandoned;
        false
    }

    /// Run `publish` unless the gate was abandoned. Returns whether it ran.
    fn commit<E>(&self, publish: impl FnOnce() -> Result<(), E>) -> Result<bool, E> {
        let mut state = self.state();
        if *state == GateState::Abandoned {
            return Ok(false);
        }
        publish()?;
        *state = GateState::Committed;
        Ok(true)
    }
}

/// Abandons a [`CommitGate`] when dropped, unless disarmed first.
///
/// Held across the await of a blocking write: if the awaiting future is
/// dropped (timeout, caller cancellation) the write is never published.
pub struct AbandonOnDrop {
    gate: Option<Arc<CommitGate>>,
}

impl AbandonOnDrop {
    pub fn new(gate: Arc<CommitGate>) -> Self {
        Self { gate: Some(gate) }
    }

    /// The write finished and was awaited; dropping no longer abandons it.
    pub fn disarm(mut self) {
        self.gate = None;
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            if gate.abandon() {
                tracing::warn!("Artifact was replaced before its write was abandoned");
            } else {
                tracing::debug!("Abandoned pending artifact write");
            }
        }
    }
}

/// File-backed store for artifacts and their rendered views.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `dir` (relative paths resolve against the
    /// current directory).
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let dir = dir.as_ref();
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| ArtifactError::Io {
                    path: dir.display().to_string(),
                    source: e,
                })?
                .join(dir)
        };
        Ok(Self {
            root: normalize_lexical(&absolute),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate an artifact name: a single path segment of
    /// `[A-Za-z0-9_.-]`, not starting with a dot.
    pub fn validate_name(name: &str) -> Result<(), ArtifactError> {
        let ok = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if ok {
            Ok(())
        } else {
            Err(ArtifactError::InvalidName(name.to_string()))
        }
    }

    /// Path of the CSV artifact for `name`.
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        Self::validate_name(name)?;
        Ok(self.root.join(format!("{}.csv", name)))
    }

    /// Resolve a reference to a path inside the root.
    ///
    /// Relative references are taken relative to the root. Anything that
    /// normalizes to a location outside the root is rejected.
    pub fn resolve(&self, reference: &ArtifactRef) -> Result<PathBuf, ArtifactError> {
        let raw = Path::new(reference.as_str());
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };
        let resolved = normalize_lexical(&joined);

        if resolved == self.root || !resolved.starts_with(&self.root) {
            return Err(ArtifactError::OutsideRoot {
                reference: reference.to_string(),
                root: self.root.display().to_string(),
            });
        }
        Ok(resolved)
    }

    /// Where the rendered view for `reference` goes.
    pub fn view_path(&self, reference: &ArtifactRef) -> Result<PathBuf, ArtifactError> {
        Ok(self.resolve(reference)?.with_extension("html"))
    }

    /// Serialize `set` to the artifact `name`, replacing any previous one.
    pub fn write(&self, name: &str, set: &ResultSet) -> Result<ArtifactRef, ArtifactError> {
        let (path, bytes) = self.encode(name, set)?;
        write_atomic(&path, &bytes, None)?;
        Ok(self.written(path, set))
    }

    /// Like [`write`](Self::write), but the target is only replaced if
    /// `gate` has not been abandoned by then.
    ///
    /// Returns `None` when the write was abandoned; the previous artifact
    /// is left as it was and no temp file remains.
    pub fn write_gated(
        &self,
        name: &str,
        set: &ResultSet,
        gate: &CommitGate,
    ) -> Result<Option<ArtifactRef>, ArtifactError> {
        if gate.is_abandoned() {
            return Ok(None);
        }
        let (path, bytes) = self.encode(name, set)?;
        if !write_atomic(&path, &bytes, Some(gate))? {
            return Ok(None);
        }
        Ok(Some(self.written(path, set)))
    }

    fn encode(&self, name: &str, set: &ResultSet) -> Result<(PathBuf, Vec<u8>), ArtifactError> {
        let path = self.artifact_path(name)?;
        let bytes = encode_csv(set).map_err(|reason| ArtifactError::WriteFailed {
            path: path.display().to_string(),
            reason,
        })?;
        Ok((path, bytes))
    }

    fn written(&self, path: PathBuf, set: &ResultSet) -> ArtifactRef {
        tracing::debug!(
            path = %path.display(),
            rows = set.len(),
            "Wrote tabular artifact"
        );
        ArtifactRef::new(path.display().to_string())
    }

    /// Read an artifact back, checking its header against the contract.
    pub fn read(
        &self,
        reference: &ArtifactRef,
        contract: &SchemaContract,
    ) -> Result<ResultSet, ArtifactError> {
        let path = self.resolve(reference)?;
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound {
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(ArtifactError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        decode_csv(&bytes, contract).map_err(|reason| ArtifactError::Corrupt {
            path: path.display().to_string(),
            reason,
        })
    }

    /// Write the rendered HTML view for `reference`, returning its path.
    pub fn write_view(
        &self,
        reference: &ArtifactRef,
        set: &ResultSet,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.view_path(reference)?;
        write_atomic(&path, render_html(set).as_bytes(), None)?;
        Ok(path)
    }
}

/// Normalize a path by resolving `.` and `..` lexically (no filesystem access).
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if components
                    .last()
                    .is_some_and(|c| matches!(c, Component::Normal(_)))
                {
                    components.pop();
                }
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Replace `path` with `bytes` via a temp file in the same directory.
///
/// With a gate, the rename only happens if the gate is still open; returns
/// whether `path` was replaced.
fn write_atomic(
    path: &Path,
    bytes: &[u8],
    gate: Option<&CommitGate>,
) -> Result<bool, ArtifactError> {
    let write_failed = |reason: String| ArtifactError::WriteFailed {
        path: path.display().to_string(),
        reason,
    };

    let dir = path
        .parent()
        .ok_or_else(|| write_failed("no parent directory".to_string()))?;
    std::fs::create_dir_all(dir).map_err(|e| write_failed(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_failed(e.to_string()))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| write_failed(e.to_string()))?;
    let publish = move || {
        tmp.persist(path)
            .map(|_| ())
            .map_err(|e| write_failed(e.error.to_string()))
    };
    match gate {
        Some(gate) => gate.commit(publish),
        None => publish().map(|()| true),
    }
}

fn encode_cell(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => NULL_MARKER.to_string(),
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::Text(s) if s.starts_with('\\') => format!("\\{}", s),
        FieldValue::Text(s) => s.clone(),
    }
}

fn decode_cell(cell: &str, ty: SemanticType) -> Result<FieldValue, String> {
    if cell == NULL_MARKER {
        return Ok(FieldValue::Null);
    }
    match ty {
        SemanticType::Integer => cell
            .parse()
            .map(FieldValue::Integer)
            .map_err(|e| format!("'{}' is not an integer: {}", cell, e)),
        SemanticType::Text => Ok(FieldValue::Text(
            cell.strip_prefix('\\').unwrap_or(cell).to_string(),
        )),
    }
}

fn encode_csv(set: &ResultSet) -> Result<Vec<u8>, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&set.columns)
        .map_err(|e| e.to_string())?;
    for record in &set.records {
        writer
            .write_record(record.values.iter().map(encode_cell))
            .map_err(|e| e.to_string())?;
    }
    writer.into_inner().map_err(|e| e.to_string())
}

fn decode_csv(bytes: &[u8], contract: &SchemaContract) -> Result<ResultSet, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let mut types = Vec::with_capacity(headers.len());
    for column in headers.iter() {
        let spec = contract
            .field(column)
            .ok_or_else(|| format!("column '{}' is not a field of {}", column, contract.table()))?;
        types.push(spec.semantic_type);
    }

    let mut set = ResultSet::new(headers.iter().map(str::to_string).collect());
    for row in reader.records() {
        let row = row.map_err(|e| e.to_string())?;
        let values = row
            .iter()
            .zip(&types)
            .map(|(cell, ty)| decode_cell(cell, *ty))
            .collect::<Result<Vec<_>, _>>()?;
        set.push(ResultRecord::new(values));
    }
    Ok(set)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a result set as a standalone HTML document with one table.
pub fn render_html(set: &ResultSet) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Query results</title>\n</head>\n<body>\n",
    );
    html.push_str("<table border=\"1\" class=\"dataframe\">\n  <thead>\n    <tr style=\"text-align: right;\">\n");
    for column in &set.columns {
        html.push_str(&format!("      <th>{}</th>\n", escape_html(column)));
    }
    html.push_str("    </tr>\n  </thead>\n  <tbody>\n");
    for record in &set.records {
        html.push_str("    <tr>\n");
        for value in &record.values {
            html.push_str(&format!("      <td>{}</td>\n", escape_html(&value.to_string())));
        }
        html.push_str("    </tr>\n");
    }
    html.push_str("  </tbody>\n</table>\n</body>\n</html>\n");
    html
}
