//! Paragraph grouping.
//! Words that share a `(block, paragraph)` key from the OCR engine become one text region:
//! the union of their boxes and their texts joined in encounter order. Regions come out
//! sorted by key, which is the reading-order proxy the change detector and the overlay
//! both depend on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capture::Rectangle;
use crate::ocr::Word;

/// Structural key of a paragraph within one recognition pass.
pub type GroupKey = (u32, u32);

/// Unit of translation and rendering. Coordinates are image-local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRegion {
    pub original_text: String,
    pub translated_text: String,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl TextRegion {
    /// The region's box in screen coordinates, given the captured rectangle.
    pub fn screen_box(&self, rect: &Rectangle) -> (i32, i32, i32, i32) {
        (rect.x + self.x, rect.y + self.y, self.w, self.h)
    }
}

/// Running accumulator for one bucket.
struct Bucket {
    min_left: i32,
    min_top: i32,
    max_right: i32,
    max_bottom: i32,
    texts: Vec<String>,
}

impl Bucket {
    fn new(word: &Word, text: &str) -> Self {
        Self {
            min_left: word.left,
            min_top: word.top,
            max_right: word.right(),
            max_bottom: word.bottom(),
            texts: vec![text.to_string()],
        }
    }

    fn push(&mut self, word: &Word, text: &str) {
        self.min_left = self.min_left.min(word.left);
        self.min_top = self.min_top.min(word.top);
        self.max_right = self.max_right.max(word.right());
        self.max_bottom = self.max_bottom.max(word.bottom());
        self.texts.push(text.to_string());
    }

    fn finish(self) -> TextRegion {
        TextRegion {
            original_text: self.texts.join(" "),
            translated_text: String::new(),
            x: self.min_left,
            y: self.min_top,
            w: self.max_right - self.min_left,
            h: self.max_bottom - self.min_top,
        }
    }
}

/// Clusters OCR words into paragraph regions.
#[derive(Debug, Clone, Copy)]
pub struct RegionGrouper {
    /// Words must score strictly above this to be kept.
    min_confidence: f32,
}

impl Default for RegionGrouper {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl RegionGrouper {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    /// Group words into regions ordered by ascending `(block, paragraph)`.
    pub fn group(&self, words: &[Word]) -> Vec<TextRegion> {
        self.group_keyed(words)
            .into_iter()
            .map(|(_, region)| region)
            .collect()
    }

    /// Same as [`group`](Self::group) but keeps each region's key.
    pub fn group_keyed(&self, words: &[Word]) -> Vec<(GroupKey, TextRegion)> {
        let mut buckets: BTreeMap<GroupKey, Bucket> = BTreeMap::new();

        for word in words {
            if word.confidence <= self.min_confidence {
                continue;
            }
            let text = word.text.trim();
            if text.is_empty() {
                continue;
            }

            buckets
                .entry((word.block_id, word.paragraph_id))
                .and_modify(|b| b.push(word, text))
                .or_insert_with(|| Bucket::new(word, text));
        }

        buckets
            .into_iter()
            .map(|(key, bucket)| (key, bucket.finish()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, left: i32, top: i32, w: i32, h: i32, block: u32, par: u32) -> Word {
        Word {
            text: text.into(),
            left,
            top,
            width: w,
            height: h,
            confidence: 90.0,
            block_id: block,
            paragraph_id: par,
            line_id: 1,
        }
    }

    #[test]
    fn merged_box_is_union_of_word_boxes() {
        let words = vec![word("Hello", 0, 0, 10, 10, 1, 1), word("world", 20, 0, 10, 10, 1, 1)];
        let regions = RegionGrouper::default().group(&words);

        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!((r.x, r.y, r.w, r.h), (0, 0, 30, 10));
        assert_eq!(r.original_text, "Hello world");
        assert!(r.translated_text.is_empty());
    }

    #[test]
    fn regions_sorted_by_block_then_paragraph() {
        // engine-native order deliberately scrambled
        let words = vec![
            word("third", 0, 80, 10, 10, 2, 1),
            word("second", 0, 40, 10, 10, 1, 2),
            word("first", 0, 0, 10, 10, 1, 1),
            word("more", 20, 0, 10, 10, 1, 1),
        ];
        let keyed = RegionGrouper::default().group_keyed(&words);
        let keys: Vec<GroupKey> = keyed.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1)]);

        let texts: Vec<&str> = keyed.iter().map(|(_, r)| r.original_text.as_str()).collect();
        assert_eq!(texts, vec!["first more", "second", "third"]);
    }

    #[test]
    fn grouping_is_stable_across_runs() {
        let words = vec![
            word("b", 50, 5, 8, 12, 3, 1),
            word("a", 2, 40, 8, 12, 1, 1),
            word("c", 14, 41, 9, 10, 1, 1),
            word("d", 0, 90, 30, 14, 2, 4),
        ];
        let grouper = RegionGrouper::default();
        let first = grouper.group(&words);
        for _ in 0..20 {
            assert_eq!(grouper.group(&words), first);
        }
    }

    #[test]
    fn encounter_order_kept_within_bucket() {
        let words = vec![word("zeta", 40, 0, 10, 10, 1, 1), word("alpha", 0, 0, 10, 10, 1, 1)];
        let regions = RegionGrouper::default().group(&words);
        assert_eq!(regions[0].original_text, "zeta alpha");
        assert_eq!((regions[0].x, regions[0].w), (0, 50));
    }

    #[test]
    fn noise_and_blank_words_are_dropped() {
        let mut noisy = word("ghost", 100, 100, 50, 50, 1, 1);
        noisy.confidence = -1.0;
        let mut zero = word("zero", 100, 100, 50, 50, 1, 1);
        zero.confidence = 0.0;
        let words = vec![
            noisy,
            zero,
            word("   ", 200, 200, 5, 5, 1, 1),
            word(" kept ", 0, 0, 10, 10, 1, 1),
        ];
        let regions = RegionGrouper::default().group(&words);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].original_text, "kept");
        assert_eq!((regions[0].x, regions[0].y, regions[0].w, regions[0].h), (0, 0, 10, 10));
    }

    #[test]
    fn custom_threshold_filters_low_confidence() {
        let mut low = word("low", 0, 0, 10, 10, 1, 1);
        low.confidence = 30.0;
        let words = vec![low, word("high", 20, 0, 10, 10, 1, 1)];
        let regions = RegionGrouper::new(50.0).group(&words);
        assert_eq!(regions[0].original_text, "high");
    }

    #[test]
    fn no_words_yields_no_regions() {
        assert!(RegionGrouper::default().group(&[]).is_empty());
    }

    #[test]
    fn screen_box_offsets_by_capture_origin() {
        let region = TextRegion {
            original_text: "x".into(),
            translated_text: String::new(),
            x: 5,
            y: 7,
            w: 20,
            h: 10,
        };
        let rect = Rectangle::new(100, -50, 400, 300);
        assert_eq!(region.screen_box(&rect), (105, -43, 20, 10));
    }
}
