//! Normalized text similarity for matching OCR output across samples.
//!
//! OCR output for one watermark drifts between frames: casing changes,
//! whitespace splits, and characters are dropped or misread. Matching is
//! therefore done on normalized text with substring and edit-distance tolerance.

/// Lowercase and collapse runs of whitespace to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein distance over Unicode scalar values.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Thresholds for deciding that two texts name the same watermark.
#[derive(Debug, Clone, Copy)]
pub struct TextMatcher {
    /// Minimum `1 - distance / max_len` for an edit-distance match.
    pub min_similarity: f64,

    /// Shortest text (in chars) allowed to match by containment.
    pub min_substring_chars: usize,
}

impl TextMatcher {
    /// Match score in `(0.0, 1.0]`, or `None` if the texts do not match.
    ///
    /// Empty texts never match by text.
    pub fn score(&self, a: &str, b: &str) -> Option<f64> {
        let a = normalize_text(a);
        let b = normalize_text(b);
        if a.is_empty() || b.is_empty() {
            return None;
        }
        if a == b {
            return Some(1.0);
        }

        let (shorter, longer) = if a.chars().count() <= b.chars().count() {
            (&a, &b)
        } else {
            (&b, &a)
        };
        let short_len = shorter.chars().count();
        let long_len = longer.chars().count();

        let edit_score = 1.0 - edit_distance(&a, &b) as f64 / long_len as f64;
        let substring_score = if short_len >= self.min_substring_chars && longer.contains(shorter.as_str())
        {
            0.5 + 0.5 * short_len as f64 / long_len as f64
        } else {
            0.0
        };

        let best = edit_score.max(substring_score);
        if substring_score > 0.0 || edit_score >= self.min_similarity {
            Some(best)
        } else {
            None
        }
    }
}
