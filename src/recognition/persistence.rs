//! Durable per-label template records
//!
//! One file per label, named `<slug>.tpl`:
//!
//! ```text
//! [name_len: u32 LE][name: UTF-8][normal fingerprint: f32 LE * FINGERPRINT_LEN]
//! [alt fingerprint][normal histogram: f32 LE * HISTOGRAM_LEN][alt histogram]
//! ```
//!
//! Sections after the normal fingerprint are optional: the loader checks the
//! remaining byte count before each one, so records written before a section
//! existed still load.

use super::error::{RecognitionError, RecognitionResult};
use super::features::{FINGERPRINT_LEN, HISTOGRAM_LEN};
use super::labels::{LABEL_COUNT, slug};
use super::template::Template;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Extension of template record files
pub const RECORD_EXTENSION: &str = "tpl";

const MAX_NAME_LEN: usize = 1024;

/// Floats in a record carrying every section
const MAX_RECORD_FLOATS: usize = 2 * FINGERPRINT_LEN + 2 * HISTOGRAM_LEN;

/// Path of the record for a label inside `dir`
pub fn record_path(dir: &Path, label: &str) -> PathBuf {
    dir.join(format!("{}.{}", slug(label), RECORD_EXTENSION))
}

fn push_floats(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Serialize a template into the record format
pub fn encode_record(template: &Template) -> Vec<u8> {
    let name = template.label.as_bytes();
    let mut out = Vec::with_capacity(4 + name.len() + 4 * MAX_RECORD_FLOATS);
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.extend_from_slice(name);
    push_floats(&mut out, &template.normal_fingerprint);
    push_floats(&mut out, &template.alt_fingerprint);
    if let Some(normal) = &template.normal_histogram {
        push_floats(&mut out, normal);
        push_floats(&mut out, template.alt_histogram.as_ref().unwrap_or(normal));
    }
    out
}

struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.remaining() < len {
            return None;
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }

    fn floats(&mut self, count: usize) -> Option<Vec<f32>> {
        let raw = self.take(count * 4)?;
        Some(
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// Optional section: read it only if the whole section is present
    fn optional_floats(&mut self, count: usize) -> Option<Vec<f32>> {
        if self.remaining() >= count * 4 {
            self.floats(count)
        } else {
            None
        }
    }
}

/// Parse one record. `path` is only used for error reporting.
pub fn decode_record(bytes: &[u8], path: &Path) -> RecognitionResult<Template> {
    let corrupt = |description: &str| RecognitionError::CorruptRecord {
        path: path.to_path_buf(),
        description: description.to_string(),
    };

    let mut reader = RecordReader { bytes, pos: 0 };
    let len_bytes = reader.take(4).ok_or_else(|| corrupt("missing name length"))?;
    let name_len =
        u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if name_len == 0 || name_len > MAX_NAME_LEN {
        return Err(corrupt("implausible name length"));
    }
    let name = reader
        .take(name_len)
        .ok_or_else(|| corrupt("truncated name"))?;
    let label = std::str::from_utf8(name)
        .map_err(|_| corrupt("name is not valid UTF-8"))?
        .to_string();

    let normal_fingerprint = reader
        .floats(FINGERPRINT_LEN)
        .ok_or_else(|| corrupt("truncated fingerprint"))?;
    let alt_fingerprint = reader
        .optional_floats(FINGERPRINT_LEN)
        .unwrap_or_else(|| normal_fingerprint.clone());
    let normal_histogram = reader.optional_floats(HISTOGRAM_LEN);
    let alt_histogram = match &normal_histogram {
        Some(normal) => Some(
            reader
                .optional_floats(HISTOGRAM_LEN)
                .unwrap_or_else(|| normal.clone()),
        ),
        None => None,
    };

    let all_finite = normal_fingerprint
        .iter()
        .chain(&alt_fingerprint)
        .chain(normal_histogram.iter().flatten())
        .chain(alt_histogram.iter().flatten())
        .all(|v| v.is_finite());
    if !all_finite {
        return Err(corrupt("non-finite values"));
    }
    if reader.remaining() > 0 {
        log::debug!(
            "Ignoring {} trailing bytes in {:?}",
            reader.remaining(),
            path
        );
    }

    Ok(Template {
        label,
        normal_fingerprint,
        alt_fingerprint,
        normal_histogram,
        alt_histogram,
    })
}

/// Outcome of loading a template directory
#[derive(Debug, Default)]
pub struct LoadReport {
    pub templates: Vec<Template>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Write one record per template into `dir`, replacing the previous contents.
///
/// Records for labels no longer present are removed so the directory always
/// mirrors a single store.
pub async fn save_templates(dir: &Path, templates: &[Template]) -> RecognitionResult<usize> {
    let mut owners: HashMap<PathBuf, &str> = HashMap::new();
    for template in templates {
        let path = record_path(dir, &template.label);
        if let Some(other) = owners.insert(path.clone(), &template.label) {
            return Err(RecognitionError::InvalidLabelSet {
                expected: LABEL_COUNT,
                description: format!(
                    "'{}' and '{}' would both be saved as {:?}",
                    other, template.label, path
                ),
            });
        }
    }

    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::with_capacity(templates.len());
    for template in templates {
        let path = record_path(dir, &template.label);
        let tmp = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));
        tokio::fs::write(&tmp, encode_record(template)).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Saved template '{}' to {:?}", template.label, path);
        written.push(path);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_record = path.extension().is_some_and(|e| e == RECORD_EXTENSION);
        if is_record && !written.contains(&path) {
            log::info!("Removing stale template record {:?}", path);
            tokio::fs::remove_file(&path).await?;
        }
    }

    Ok(written.len())
}

/// Load every record in `dir`. Unreadable or corrupt files are skipped with a
/// warning; they never abort the rest of the load.
pub async fn load_templates(dir: &Path) -> RecognitionResult<LoadReport> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == RECORD_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut report = LoadReport::default();
    for path in paths {
        let result = match tokio::fs::read(&path).await {
            Ok(bytes) => decode_record(&bytes, &path),
            Err(e) => Err(RecognitionError::from(e)),
        };
        match result {
            Ok(template) => report.templates.push(template),
            Err(e) => {
                log::warn!("⚠️ Skipping template record {:?}: {}", path, e);
                report.skipped.push((path, e.to_string()));
            }
        }
    }

    log::info!(
        "Loaded {} template records from {:?} ({} skipped)",
        report.templates.len(),
        dir,
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::features::{FINGERPRINT_LEN, HISTOGRAM_LEN};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hand-recognizer-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn sample(label: &str, seed: f32) -> Template {
        Template {
            label: label.to_string(),
            normal_fingerprint: (0..FINGERPRINT_LEN).map(|i| seed + i as f32 * 0.001).collect(),
            alt_fingerprint: (0..FINGERPRINT_LEN).map(|i| seed * 0.5 + i as f32 * 0.0005).collect(),
            normal_histogram: Some((0..HISTOGRAM_LEN).map(|i| seed + i as f32).collect()),
            alt_histogram: Some((0..HISTOGRAM_LEN).map(|i| seed - i as f32).collect()),
        }
    }

    #[test]
    fn test_encode_decode_full_record() {
        let template = sample("Goblin Barrel", 0.25);
        let bytes = encode_record(&template);
        assert_eq!(
            bytes.len(),
            4 + "Goblin Barrel".len() + 4 * (2 * FINGERPRINT_LEN + 2 * HISTOGRAM_LEN)
        );
        let decoded = decode_record(&bytes, Path::new("x.tpl")).unwrap();
        assert_eq!(decoded, template);
    }

    #[test]
    fn test_decode_legacy_fingerprint_only() {
        let template = sample("Knight", 0.1);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(b"Knight");
        push_floats(&mut bytes, &template.normal_fingerprint);

        let decoded = decode_record(&bytes, Path::new("knight.tpl")).unwrap();
        assert_eq!(decoded.label, "Knight");
        assert_eq!(decoded.normal_fingerprint, template.normal_fingerprint);
        assert_eq!(decoded.alt_fingerprint, template.normal_fingerprint);
        assert!(decoded.normal_histogram.is_none());
        assert!(decoded.alt_histogram.is_none());
    }

    #[test]
    fn test_decode_legacy_without_histograms() {
        let template = sample("Knight", 0.1);
        let full = encode_record(&template);
        let cut = 4 + 6 + 4 * 2 * FINGERPRINT_LEN;

        let decoded = decode_record(&full[..cut], Path::new("knight.tpl")).unwrap();
        assert_eq!(decoded.alt_fingerprint, template.alt_fingerprint);
        assert!(decoded.normal_histogram.is_none());

        // A partial histogram section is not enough to read it.
        let decoded = decode_record(&full[..cut + 10], Path::new("knight.tpl")).unwrap();
        assert!(decoded.normal_histogram.is_none());
    }

    #[test]
    fn test_decode_rejects_truncated_and_garbage() {
        let bytes = encode_record(&sample("Knight", 0.1));
        assert!(decode_record(&bytes[..3], Path::new("a")).is_err());
        assert!(decode_record(&bytes[..100], Path::new("a")).is_err());

        let mut huge_name = Vec::new();
        huge_name.extend_from_slice(&u32::MAX.to_le_bytes());
        huge_name.extend_from_slice(&[0u8; 64]);
        let err = decode_record(&huge_name, Path::new("a")).unwrap_err();
        assert!(matches!(err, RecognitionError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = temp_dir("roundtrip");
        let templates = vec![sample("Knight", 0.1), sample("Goblin Barrel", 0.7)];

        let written = save_templates(&dir, &templates).await.unwrap();
        assert_eq!(written, 2);
        assert!(record_path(&dir, "Goblin Barrel").exists());

        let report = load_templates(&dir).await.unwrap();
        assert!(report.skipped.is_empty());
        assert_eq!(report.templates.len(), 2);
        for original in &templates {
            let loaded = report
                .templates
                .iter()
                .find(|t| t.label == original.label)
                .unwrap();
            assert_eq!(loaded, original);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let dir = temp_dir("corrupt");
        save_templates(&dir, &[sample("Knight", 0.1)]).await.unwrap();
        std::fs::write(dir.join("broken.tpl"), [1u8, 0, 0]).unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let report = load_templates(&dir).await.unwrap();
        assert_eq!(report.templates.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("broken.tpl"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_save_removes_stale_records() {
        let dir = temp_dir("stale");
        save_templates(&dir, &[sample("Knight", 0.1), sample("Giant", 0.2)])
            .await
            .unwrap();
        save_templates(&dir, &[sample("Knight", 0.3)]).await.unwrap();

        let report = load_templates(&dir).await.unwrap();
        assert_eq!(report.templates.len(), 1);
        assert_eq!(report.templates[0].label, "Knight");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_save_refuses_colliding_record_names() {
        let dir = temp_dir("collide");
        save_templates(&dir, &[sample("Knight", 0.1)]).await.unwrap();

        let result = save_templates(
            &dir,
            &[sample("Goblin Barrel", 0.1), sample("Goblin_Barrel", 0.2)],
        )
        .await;

        assert!(matches!(result, Err(RecognitionError::InvalidLabelSet { .. })));
        let report = load_templates(&dir).await.unwrap();
        assert_eq!(report.templates.len(), 1, "Nothing written or removed");
        assert_eq!(report.templates[0].label, "Knight");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
