//! Change detection between ticks.
//! The fingerprint is a blake3 hash over the ordered region texts of the last batch that was
//! actually translated. Capture and OCR run every tick; translation only runs when the
//! fingerprint would change.

use crate::grouping::TextRegion;

pub type Fingerprint = [u8; 32];

/// Hash the ordered region texts. Returns None when there is no text.
pub fn fingerprint(regions: &[TextRegion]) -> Option<Fingerprint> {
    if regions.iter().all(|r| r.original_text.trim().is_empty()) {
        return None;
    }
    let mut hasher = blake3::Hasher::new();
    for region in regions {
        hasher.update(region.original_text.as_bytes());
        hasher.update(b"\n");
    }
    Some(*hasher.finalize().as_bytes())
}

/// What the pipeline should do with the current tick's regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// New text differs from the last translated text.
    Translate(Fingerprint),
    /// Text disappeared; the remembered text has been cleared and the overlay should blank.
    Clear,
    /// Same text as last time, or still no text.
    Unchanged,
}

/// Remembers what was last translated. Owned by a single session worker.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what to do with `regions`. A `Clear` decision resets the remembered text
    /// immediately; a `Translate` decision only takes effect once [`commit`](Self::commit)
    /// is called.
    pub fn assess(&mut self, regions: &[TextRegion]) -> Change {
        match (fingerprint(regions), self.last) {
            (Some(current), Some(last)) if current == last => Change::Unchanged,
            (Some(current), _) => Change::Translate(current),
            (None, Some(_)) => {
                self.reset();
                Change::Clear
            }
            (None, None) => Change::Unchanged,
        }
    }

    /// Remember `fp` as the last translated text.
    pub fn commit(&mut self, fp: Fingerprint) {
        self.last = Some(fp);
    }

    pub fn has_text(&self) -> bool {
        self.last.is_some()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(texts: &[&str]) -> Vec<TextRegion> {
        texts
            .iter()
            .map(|t| TextRegion {
                original_text: t.to_string(),
                translated_text: String::new(),
                x: 0,
                y: 0,
                w: 10,
                h: 10,
            })
            .collect()
    }

    #[test]
    fn same_text_twice_translates_once() {
        let mut detector = ChangeDetector::new();
        let frame = regions(&["Hello", "World"]);

        let first = detector.assess(&frame);
        let Change::Translate(fp) = first else {
            panic!("expected translate, got {first:?}");
        };
        detector.commit(fp);

        assert_eq!(detector.assess(&frame), Change::Unchanged);
        assert_eq!(detector.assess(&frame), Change::Unchanged);
    }

    #[test]
    fn uncommitted_change_is_retried() {
        let mut detector = ChangeDetector::new();
        let frame = regions(&["Hello"]);
        assert!(matches!(detector.assess(&frame), Change::Translate(_)));
        assert!(matches!(detector.assess(&frame), Change::Translate(_)));
    }

    #[test]
    fn text_then_empty_clears_once() {
        let mut detector = ChangeDetector::new();
        if let Change::Translate(fp) = detector.assess(&regions(&["Hello"])) {
            detector.commit(fp);
        }

        assert_eq!(detector.assess(&[]), Change::Clear);
        assert!(!detector.has_text());
        assert_eq!(detector.assess(&[]), Change::Unchanged);
    }

    #[test]
    fn empty_to_empty_is_noop() {
        let mut detector = ChangeDetector::new();
        assert_eq!(detector.assess(&[]), Change::Unchanged);
    }

    #[test]
    fn text_after_clear_translates_again() {
        let mut detector = ChangeDetector::new();
        let frame = regions(&["Hello"]);
        if let Change::Translate(fp) = detector.assess(&frame) {
            detector.commit(fp);
        }
        detector.assess(&[]);
        assert!(matches!(detector.assess(&frame), Change::Translate(_)));
    }

    #[test]
    fn reordered_regions_count_as_change() {
        let a = fingerprint(&regions(&["one", "two"]));
        let b = fingerprint(&regions(&["two", "one"]));
        assert_ne!(a, b);
        // region boundaries are part of the fingerprint
        assert_ne!(fingerprint(&regions(&["ab"])), fingerprint(&regions(&["a", "b"])));
    }

    #[test]
    fn blank_regions_have_no_fingerprint() {
        assert!(fingerprint(&regions(&[" ", ""])).is_none());
        assert!(fingerprint(&[]).is_none());
    }
}
