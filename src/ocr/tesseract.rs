//! Tesseract CLI engine.
//! Pipes a PNG into `tesseract stdin stdout -l <lang> --psm <n> tsv` and parses the
//! word rows (level 5) of the TSV report. Availability is probed once at construction.

use std::io::{Cursor, Write};
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::{ImageFormat, RgbaImage};
use tracing::{debug, info, warn};

use super::{RecognitionError, TextRecognizer, Word};

/// TSV row level for individual words.
const WORD_LEVEL: u32 = 5;
/// Columns in a tesseract TSV row (the text column may be missing on empty words).
const TSV_COLUMNS: usize = 12;

/// Tesseract engine driven through its command-line interface.
pub struct TesseractEngine {
    cmd: String,
    language: String,
    psm: u32,
    available: AtomicBool,
}

impl TesseractEngine {
    /// `cmd`: tesseract binary name or full path.
    /// `language`: traineddata codes, e.g. "eng" or "eng+por".
    pub fn new(cmd: &str, language: &str, psm: u32) -> Self {
        let available = probe_tesseract(cmd);
        if available {
            info!(cmd, language, psm, "tesseract OCR engine available");
        } else {
            warn!(cmd, "tesseract not found, OCR will be unavailable");
        }
        Self {
            cmd: cmd.to_string(),
            language: language.to_string(),
            psm,
            available: AtomicBool::new(available),
        }
    }

    fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RecognitionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RecognitionError::InvalidImage("empty image".into()));
        }
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| RecognitionError::InvalidImage(format!("png encode: {e}")))?;
        Ok(buf.into_inner())
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<Word>, RecognitionError> {
        if !self.is_available() {
            return Err(RecognitionError::EngineUnavailable(self.cmd.clone()));
        }

        let png = Self::encode_png(image)?;
        let start = Instant::now();

        let child = Command::new(&self.cmd)
            .args(["stdin", "stdout", "-l", &self.language, "--psm"])
            .arg(self.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                self.available.store(false, Ordering::SeqCst);
                RecognitionError::EngineUnavailable(format!("failed to spawn {}: {e}", self.cmd))
            })?;

        let output = feed_and_wait(child, &png)?;

        let tsv = String::from_utf8_lossy(&output.stdout);
        let words = parse_tsv(&tsv)?;
        debug!(
            words = words.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tesseract recognition done"
        );
        Ok(words)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Parse tesseract's TSV report into word rows.
pub fn parse_tsv(tsv: &str) -> Result<Vec<Word>, RecognitionError> {
    let mut words = Vec::new();

    for (idx, raw) in tsv.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.is_empty() || line.starts_with("level") {
            continue;
        }

        let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
        if fields.len() < TSV_COLUMNS - 1 {
            return Err(RecognitionError::MalformedOutput {
                line: idx + 1,
                reason: format!("expected {TSV_COLUMNS} columns, got {}", fields.len()),
            });
        }

        let level: u32 = parse_field(&fields, 0, idx)?;
        if level != WORD_LEVEL {
            continue;
        }

        words.push(Word {
            block_id: parse_field(&fields, 2, idx)?,
            paragraph_id: parse_field(&fields, 3, idx)?,
            line_id: parse_field(&fields, 4, idx)?,
            left: parse_field(&fields, 6, idx)?,
            top: parse_field(&fields, 7, idx)?,
            width: parse_field(&fields, 8, idx)?,
            height: parse_field(&fields, 9, idx)?,
            confidence: parse_field(&fields, 10, idx)?,
            text: fields.get(11).copied().unwrap_or_default().to_string(),
        });
    }

    Ok(words)
}

fn parse_field<T: std::str::FromStr>(
    fields: &[&str],
    col: usize,
    idx: usize,
) -> Result<T, RecognitionError> {
    let raw = fields[col].trim();
    raw.parse().map_err(|_| RecognitionError::MalformedOutput {
        line: idx + 1,
        reason: format!("column {col} is not numeric: {raw:?}"),
    })
}

/// Write `input` to the child's stdin, then always reap it. A child that exits before
/// reading everything (bad language, missing traineddata) is reported by its exit status
/// and stderr rather than by the broken pipe.
fn feed_and_wait(mut child: Child, input: &[u8]) -> Result<Output, RecognitionError> {
    // tesseract reads the whole image before it writes anything
    let write_result = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(input),
        None => Ok(()),
    };

    let output = child
        .wait_with_output()
        .map_err(|e| RecognitionError::ProcessingFailed(format!("wait: {e}")))?;

    if !output.status.success() {
        return Err(RecognitionError::ProcessingFailed(format!(
            "tesseract exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    write_result.map_err(|e| RecognitionError::ProcessingFailed(format!("write image: {e}")))?;
    Ok(output)
}

fn probe_tesseract(cmd: &str) -> bool {
    Command::new(cmd)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
