//! Detection aggregation: group per-sample detections into tracks.
//!
//! # Algorithm
//!
//! 1. **Filter** detections below the confidence floor and noise text.
//! 2. **Order** the rest by time (ties broken by position, then text).
//! 3. **Collapse** duplicates within one sample: overlapping boxes with
//!    matching text (or both text-less) keep only the most confident one.
//! 4. **Assign** each detection to the best-matching open track, or open a new one.
//!    A track is open for a detection if its last detection came from an
//!    earlier sample no more than `max_gap` seconds before.
//! 5. **Emit** one [`Track`] per group, ordered by first appearance.
//!
//! Two detections match when their normalized texts match, or when both
//! carry no text and their boxes overlap by more than the IoU threshold.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use clearmark_timeline_model::detection::Detection;
use clearmark_timeline_model::track::Track;

use crate::heuristics::TextHeuristics;
use crate::similarity::TextMatcher;

/// Detections this close in time come from the same sample.
const SAME_SAMPLE_EPSILON_SECS: f64 = 1e-6;

/// Configuration for the detection aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Detections below this confidence are discarded before grouping.
    pub min_confidence: f64,

    /// Minimum IoU for two text-less detections to match.
    pub iou_threshold: f64,

    /// Maximum gap between consecutive detections of a track, in sampling intervals.
    pub max_gap_intervals: f64,

    /// Explicit maximum gap in seconds; overrides `max_gap_intervals` when set.
    pub max_gap_secs: Option<f64>,

    /// Minimum normalized edit similarity for two texts to match.
    pub text_similarity: f64,

    /// Shortest text that may match another by containment.
    pub min_substring_chars: usize,

    /// Discard timecodes, frame counters, and similar overlays.
    pub drop_noise: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            iou_threshold: 0.3,
            max_gap_intervals: 2.0,
            max_gap_secs: None,
            text_similarity: 0.7,
            min_substring_chars: 3,
            drop_noise: true,
        }
    }
}

impl AggregatorConfig {
    /// Effective maximum gap for a given sampling interval.
    pub fn max_gap_for(&self, sample_interval_secs: f64) -> f64 {
        self.max_gap_secs
            .unwrap_or(self.max_gap_intervals * sample_interval_secs)
    }

    pub fn text_matcher(&self) -> TextMatcher {
        TextMatcher {
            min_similarity: self.text_similarity,
            min_substring_chars: self.min_substring_chars,
        }
    }
}

/// Counters describing one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationReport {
    /// Detections received.
    pub input: usize,
    /// Discarded below the confidence floor.
    pub low_confidence: usize,
    /// Discarded as noise text.
    pub noise: usize,
    /// Collapsed into a more confident duplicate from the same sample.
    pub duplicates: usize,
    /// Tracks produced.
    pub tracks: usize,
}

/// Strategy for partitioning filtered, time-ordered detections into groups.
pub trait GroupingStrategy {
    /// Partition `detections` (sorted by time) into groups, each sorted by time.
    fn group(&self, detections: Vec<Detection>, max_gap_secs: f64) -> Vec<Vec<Detection>>;

    /// Strategy name for logs.
    fn name(&self) -> &str;
}

/// Single-pass greedy assignment to the best-matching open group.
///
/// Deterministic, but not globally optimal: an early detection may claim a
/// group that a later one would have matched better.
#[derive(Debug, Clone)]
pub struct GreedyGrouping {
    pub iou_threshold: f64,
    pub matcher: TextMatcher,
}

impl GreedyGrouping {
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self {
            iou_threshold: config.iou_threshold,
            matcher: config.text_matcher(),
        }
    }

    /// Match score between the tail of a group and a new detection.
    fn match_score(&self, last: &Detection, candidate: &Detection) -> Option<f64> {
        match (last.has_text(), candidate.has_text()) {
            (true, true) => self.matcher.score(&last.text, &candidate.text),
            (false, false) => {
                let iou = last.bbox.iou(&candidate.bbox);
                (iou > self.iou_threshold).then_some(iou)
            }
            _ => None,
        }
    }
}

impl GroupingStrategy for GreedyGrouping {
    fn group(&self, detections: Vec<Detection>, max_gap_secs: f64) -> Vec<Vec<Detection>> {
        let mut groups: Vec<Vec<Detection>> = Vec::new();

        for detection in detections {
            let mut best: Option<(usize, f64)> = None;

            for (idx, group) in groups.iter().enumerate() {
                let Some(last) = group.last() else {
                    continue;
                };
                let gap = detection.time_secs - last.time_secs;
                if gap <= SAME_SAMPLE_EPSILON_SECS || gap > max_gap_secs + SAME_SAMPLE_EPSILON_SECS
                {
                    continue;
                }
                if let Some(score) = self.match_score(last, &detection) {
                    if best.map(|(_, s)| score > s).unwrap_or(true) {
                        best = Some((idx, score));
                    }
                }
            }

            match best {
                Some((idx, _)) => groups[idx].push(detection),
                None => groups.push(vec![detection]),
            }
        }

        groups
    }

    fn name(&self) -> &str {
        "greedy"
    }
}

/// Groups raw detections into tracks.
#[derive(Debug, Clone)]
pub struct DetectionAggregator<S: GroupingStrategy = GreedyGrouping> {
    config: AggregatorConfig,
    strategy: S,
}

impl DetectionAggregator<GreedyGrouping> {
    /// Create an aggregator using greedy grouping.
    pub fn new(config: AggregatorConfig) -> Self {
        let strategy = GreedyGrouping::from_config(&config);
        Self { config, strategy }
    }

    /// Create an aggregator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl<S: GroupingStrategy> DetectionAggregator<S> {
    /// Create an aggregator with a custom grouping strategy.
    pub fn with_strategy(config: AggregatorConfig, strategy: S) -> Self {
        Self { config, strategy }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Group `detections` into tracks sorted by first appearance.
    ///
    /// Single-detection groups are kept as single-observation tracks.
    pub fn aggregate(
        &self,
        detections: Vec<Detection>,
        sample_interval_secs: f64,
        heuristics: &TextHeuristics,
    ) -> (Vec<Track>, AggregationReport) {
        let mut report = AggregationReport {
            input: detections.len(),
            ..Default::default()
        };

        let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
        for detection in detections {
            if detection.confidence.is_nan() || detection.confidence < self.config.min_confidence {
                report.low_confidence += 1;
                continue;
            }
            if self.config.drop_noise && detection.has_text() && heuristics.is_noise(&detection.text)
            {
                report.noise += 1;
                continue;
            }
            kept.push(detection);
        }

        if report.low_confidence + report.noise > 0 {
            tracing::debug!(
                low_confidence = report.low_confidence,
                noise = report.noise,
                "Discarded detections before grouping"
            );
        }

        kept.sort_by(compare_detections);
        let kept = self.collapse_duplicates(kept, &mut report);

        let max_gap = self.config.max_gap_for(sample_interval_secs);
        let mut groups = self.strategy.group(kept, max_gap);
        groups.retain(|g| !g.is_empty());
        groups.sort_by(|a, b| a[0].time_secs.total_cmp(&b[0].time_secs));

        let tracks: Vec<Track> = groups
            .into_iter()
            .enumerate()
            .map(|(id, detections)| Track::new(id as u32, detections))
            .collect();
        report.tracks = tracks.len();

        tracing::info!(
            strategy = self.strategy.name(),
            detections = report.input,
            tracks = report.tracks,
            max_gap_secs = max_gap,
            "Aggregated detections into tracks"
        );

        (tracks, report)
    }

    /// Keep one detection per physical watermark within each sample.
    ///
    /// `detections` must be sorted by time. Order is preserved; a duplicate
    /// with higher confidence replaces the kept one in place.
    fn collapse_duplicates(
        &self,
        detections: Vec<Detection>,
        report: &mut AggregationReport,
    ) -> Vec<Detection> {
        let matcher = self.config.text_matcher();
        let mut out: Vec<Detection> = Vec::with_capacity(detections.len());
        let mut sample_start = 0;

        for detection in detections {
            let new_sample = out
                .get(sample_start)
                .map(|first| detection.time_secs - first.time_secs > SAME_SAMPLE_EPSILON_SECS)
                .unwrap_or(true);
            if new_sample {
                sample_start = out.len();
            }

            let duplicate = out[sample_start..].iter().position(|kept| {
                let same_content = match (kept.has_text(), detection.has_text()) {
                    (true, true) => matcher.score(&kept.text, &detection.text).is_some(),
                    (false, false) => true,
                    _ => false,
                };
                same_content && kept.bbox.iou(&detection.bbox) > self.config.iou_threshold
            });

            match duplicate {
                Some(offset) => {
                    report.duplicates += 1;
                    let kept = &mut out[sample_start + offset];
                    if detection.confidence > kept.confidence {
                        *kept = detection;
                    }
                }
                None => out.push(detection),
            }
        }

        if report.duplicates > 0 {
            tracing::debug!(
                duplicates = report.duplicates,
                "Collapsed duplicate detections within samples"
            );
        }
        out
    }
}

/// Total order: time, then top-left position, then text.
fn compare_detections(a: &Detection, b: &Detection) -> Ordering {
    a.time_secs
        .total_cmp(&b.time_secs)
        .then(a.bbox.y.cmp(&b.bbox.y))
        .then(a.bbox.x.cmp(&b.bbox.x))
        .then_with(|| a.text.cmp(&b.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::TextHeuristicsConfig;
    use clearmark_timeline_model::detection::BoundingBox;

    fn heuristics() -> TextHeuristics {
        TextHeuristics::compile(&TextHeuristicsConfig::default()).unwrap()
    }

    fn det(t: f64, x: i64, y: i64, text: &str, confidence: f64) -> Detection {
        Detection {
            time_secs: t,
            bbox: BoundingBox::new(x, y, 80, 20),
            text: text.to_string(),
            confidence,
            watermark_like: false,
        }
    }

    #[test]
    fn test_groups_by_text_across_samples() {
        let detections = vec![
            det(4.0, 300, 200, "www.site.tv", 0.9),
            det(0.0, 10, 10, "www.site.tv", 0.9),
            det(2.0, 150, 100, "WWW.SITE.TV", 0.8),
            det(0.0, 500, 400, "Subscribe", 0.9),
        ];
        let (tracks, report) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());

        assert_eq!(report.tracks, 2);
        let site = tracks.iter().find(|t| t.len() == 3).unwrap();
        let times: Vec<f64> = site.detections.iter().map(|d| d.time_secs).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_logo_only_detections_group_by_overlap() {
        let detections = vec![
            det(0.0, 100, 100, "", 0.9),
            det(2.0, 105, 102, "", 0.9),
            det(2.0, 400, 300, "", 0.9),
        ];
        let (tracks, _) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].len(), 2);
        assert_eq!(tracks[1].len(), 1);
    }

    #[test]
    fn test_gap_limit_splits_reappearance() {
        let detections = vec![det(0.0, 10, 10, "brand", 0.9), det(10.0, 10, 10, "brand", 0.9)];
        let (tracks, _) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].first_time(), Some(0.0));
        assert_eq!(tracks[1].first_time(), Some(10.0));
    }

    #[test]
    fn test_same_sample_never_merges() {
        let detections = vec![det(0.0, 10, 10, "brand", 0.9), det(0.0, 300, 10, "brand", 0.9)];
        let (tracks, report) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());
        assert_eq!(tracks.len(), 2);
        assert_eq!(report.duplicates, 0);
    }

    #[test]
    fn test_duplicates_within_a_sample_collapse_to_one_track() {
        let mut detections = Vec::new();
        for t in [0.0, 2.0, 4.0] {
            detections.push(det(t, 500, 20, "www.site.tv", 0.8));
            detections.push(det(t, 500, 20, "www.site.tv", 0.9));
        }
        let (tracks, report) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].len(), 3);
        assert_eq!(report.duplicates, 3);
        assert!(tracks[0].detections.iter().all(|d| d.confidence == 0.9));
    }

    #[test]
    fn test_overlapping_logos_in_one_sample_collapse() {
        let detections = vec![
            det(0.0, 100, 100, "", 0.7),
            det(0.0, 104, 100, "", 0.95),
            det(0.0, 100, 100, "other", 0.9),
        ];
        let (tracks, report) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());

        assert_eq!(report.duplicates, 1);
        assert_eq!(tracks.len(), 2);
        let logo = tracks.iter().find(|t| t.representative_text.is_empty()).unwrap();
        assert_eq!(logo.detections[0].bbox.x, 104);
    }

    #[test]
    fn test_filters_low_confidence_and_noise() {
        let detections = vec![
            det(0.0, 10, 10, "brand", 0.2),
            det(0.0, 10, 50, "00:15", 0.99),
            det(2.0, 10, 10, "brand", 0.9),
        ];
        let (tracks, report) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());
        assert_eq!(report.low_confidence, 1);
        assert_eq!(report.noise, 1);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].first_time(), Some(2.0));
    }

    #[test]
    fn test_text_and_logo_do_not_mix() {
        let detections = vec![det(0.0, 10, 10, "brand", 0.9), det(2.0, 10, 10, "", 0.9)];
        let (tracks, _) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_track_ids_follow_first_appearance() {
        let detections = vec![det(2.0, 10, 10, "late", 0.9), det(0.0, 10, 300, "early", 0.9)];
        let (tracks, _) =
            DetectionAggregator::with_defaults().aggregate(detections, 2.0, &heuristics());
        assert_eq!(tracks[0].id, 0);
        assert_eq!(tracks[0].representative_text, "early");
        assert_eq!(tracks[1].representative_text, "late");
    }
}
