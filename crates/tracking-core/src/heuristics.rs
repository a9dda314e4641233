//! Text heuristics for watermark-likeness, method selection, and noise.
//!
//! The pattern tables are plain configuration and are compiled once into a
//! [`TextHeuristics`] value that callers pass explicitly.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use clearmark_common::error::{ClearmarkError, ClearmarkResult};
use clearmark_timeline_model::detection::{Detection, RawDetection};

/// Pattern tables used to interpret detected text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextHeuristicsConfig {
    /// Regexes for URLs and domain names (matched case-insensitively).
    pub url_patterns: Vec<String>,

    /// Copyright and trademark glyphs.
    pub legal_glyphs: Vec<String>,

    /// Words that mark legal notices (matched case-insensitively).
    pub legal_keywords: Vec<String>,

    /// Words typical of overlaid promotional text.
    pub watermark_keywords: Vec<String>,

    /// Regexes for text that is never a watermark (timecodes, frame counters).
    pub noise_patterns: Vec<String>,
}

impl Default for TextHeuristicsConfig {
    fn default() -> Self {
        Self {
            url_patterns: vec![
                r"www\.".to_string(),
                r"https?://".to_string(),
                r"\.(com|org|net|tv|me|io|co|cc)\b".to_string(),
                r"[a-z0-9]+\.[a-z]{2,}\b".to_string(),
            ],
            legal_glyphs: vec!["©".to_string(), "™".to_string(), "®".to_string()],
            legal_keywords: vec!["copyright".to_string(), "all rights reserved".to_string()],
            watermark_keywords: [
                "watermark",
                "logo",
                "subscribe",
                "follow",
                "stream",
                "download",
                "watch",
                "movie",
                "drama",
                "1080p",
                "720p",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            noise_patterns: vec![
                r"\b\d{1,2}:\d{2}(:\d{2})?\b".to_string(),
                r"\b\d+(\.\d+)?\s*fps\b".to_string(),
                r"\bframe\s*#?\d+\b".to_string(),
                r"\b\d+(\.\d+)?\s*sec\b".to_string(),
            ],
        }
    }
}

/// Compiled text heuristics.
#[derive(Debug, Clone)]
pub struct TextHeuristics {
    url_patterns: Vec<Regex>,
    noise_patterns: Vec<Regex>,
    legal_glyphs: Vec<String>,
    legal_keywords: Vec<String>,
    watermark_keywords: Vec<String>,
}

impl TextHeuristics {
    /// Compile the pattern tables. Fails with `Config` on an invalid regex.
    pub fn compile(config: &TextHeuristicsConfig) -> ClearmarkResult<Self> {
        Ok(Self {
            url_patterns: compile_all(&config.url_patterns)?,
            noise_patterns: compile_all(&config.noise_patterns)?,
            legal_glyphs: config.legal_glyphs.clone(),
            legal_keywords: lowercase_all(&config.legal_keywords),
            watermark_keywords: lowercase_all(&config.watermark_keywords),
        })
    }

    /// Text looks like a URL or a domain name.
    pub fn is_url_like(&self, text: &str) -> bool {
        let text = text.trim();
        !text.is_empty() && self.url_patterns.iter().any(|re| re.is_match(text))
    }

    /// Text carries a copyright/trademark glyph or notice.
    pub fn has_legal_mark(&self, text: &str) -> bool {
        if self.legal_glyphs.iter().any(|g| text.contains(g.as_str())) {
            return true;
        }
        let lower = text.to_lowercase();
        self.legal_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Text is a timecode, frame counter, or similar overlay that never needs removal.
    pub fn is_noise(&self, text: &str) -> bool {
        self.noise_patterns.iter().any(|re| re.is_match(text))
    }

    /// Text resembles a watermark: a URL, a legal mark, or promotional wording.
    pub fn is_watermark_like(&self, text: &str) -> bool {
        if self.is_url_like(text) || self.has_legal_mark(text) {
            return true;
        }
        let lower = text.to_lowercase();
        self.watermark_keywords
            .iter()
            .any(|k| lower.contains(k.as_str()))
    }

    /// Turn a detector record into a [`Detection`] at `time_secs`.
    pub fn annotate(&self, time_secs: f64, raw: RawDetection) -> Detection {
        let text = raw.text.trim().to_string();
        let watermark_like = !text.is_empty() && self.is_watermark_like(&text);
        Detection {
            time_secs,
            bbox: raw.bbox,
            text,
            confidence: raw.confidence.clamp(0.0, 1.0),
            watermark_like,
        }
    }
}

fn compile_all(patterns: &[String]) -> ClearmarkResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ClearmarkError::config(format!("invalid pattern {pattern:?}: {e}")))
        })
        .collect()
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearmark_timeline_model::detection::BoundingBox;

    fn heuristics() -> TextHeuristics {
        TextHeuristics::compile(&TextHeuristicsConfig::default()).unwrap()
    }

    #[test]
    fn test_url_detection() {
        let h = heuristics();
        assert!(h.is_url_like("WWW.DRAMACOOL.TV"));
        assert!(h.is_url_like("visit example.com now"));
        assert!(h.is_url_like("https://x"));
        assert!(!h.is_url_like("MOVING WATERMARK"));
        assert!(!h.is_url_like(""));
    }

    #[test]
    fn test_legal_marks() {
        let h = heuristics();
        assert!(h.has_legal_mark("Studio©"));
        assert!(h.has_legal_mark("Copyright 2024 Studio"));
        assert!(!h.has_legal_mark("Studio"));
    }

    #[test]
    fn test_noise_patterns() {
        let h = heuristics();
        assert!(h.is_noise("00:12"));
        assert!(h.is_noise("29.97 fps"));
        assert!(h.is_noise("Frame 1200"));
        assert!(!h.is_noise("secure.net"));
        assert!(!h.is_noise("SUBSCRIBE"));
    }

    #[test]
    fn test_annotate_sets_flag_and_clamps_confidence() {
        let h = heuristics();
        let raw = RawDetection {
            bbox: BoundingBox::new(1, 2, 3, 4),
            text: "  Subscribe!  ".to_string(),
            confidence: 1.4,
        };
        let detection = h.annotate(2.0, raw);
        assert!(detection.watermark_like);
        assert_eq!(detection.text, "Subscribe!");
        assert_eq!(detection.confidence, 1.0);

        let logo = h.annotate(
            2.0,
            RawDetection {
                bbox: BoundingBox::new(1, 2, 3, 4),
                text: String::new(),
                confidence: 0.8,
            },
        );
        assert!(!logo.watermark_like);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = TextHeuristicsConfig {
            url_patterns: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            TextHeuristics::compile(&config),
            Err(ClearmarkError::Config { .. })
        ));
    }
}
