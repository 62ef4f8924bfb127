/// A timestamped span of recognized speech. Times are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub confidence: Option<f32>,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
    pub text: String,
}

impl Transcript {
    pub const UNKNOWN_LANGUAGE: &'static str = "unknown";

    pub fn new(segments: Vec<TranscriptSegment>, language: Option<String>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        Self {
            segments,
            language: language.unwrap_or_else(|| Self::UNKNOWN_LANGUAGE.to_string()),
            text,
        }
    }
}

/// Puts raw engine output into transcript order.
///
/// Output segments have trimmed non-empty text, lie within `[0, duration]`,
/// have non-decreasing starts and never overlap their predecessor.
pub fn normalize_segments(mut raw: Vec<TranscriptSegment>, duration: f64) -> Vec<TranscriptSegment> {
    let duration = duration.max(0.0);
    raw.retain(|s| s.start.is_finite() && s.end.is_finite());
    raw.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut ordered: Vec<TranscriptSegment> = Vec::with_capacity(raw.len());
    for mut segment in raw {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        segment.text = text.to_string();

        let floor = ordered.last().map(|prev| prev.end).unwrap_or(0.0);
        segment.start = segment.start.clamp(floor, duration);
        segment.end = segment.end.clamp(segment.start, duration);
        ordered.push(segment);
    }

    ordered
}
