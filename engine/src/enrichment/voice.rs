//! Voice analysis
//!
//! Pure deterministic speech analysis: sentiment and intent classification
//! via compiled regex tables, language detection via Unicode script ranges,
//! and audio quality scoring from capture metrics. No network calls; these
//! functions cannot fail.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Detected sentiment of a transcription
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// Estimated speaking speed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechSpeed {
    Slow,
    Normal,
    Fast,
}

/// Estimated tone of voice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Positive,
    Negative,
    Uncertain,
}

/// Audio capture quality bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

/// Voice characteristics derived from capture metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceMetrics {
    /// Recognition confidence, 0.0..=1.0
    pub confidence: f64,

    /// Audio duration in seconds
    pub duration: f64,

    /// Estimated speaking speed
    pub speed: SpeechSpeed,

    /// Estimated tone
    pub tone: Tone,

    /// Capture quality bucket
    pub audio_quality: AudioQuality,
}

impl Default for VoiceMetrics {
    fn default() -> Self {
        Self {
            confidence: 0.95,
            duration: 0.0,
            speed: SpeechSpeed::Normal,
            tone: Tone::Neutral,
            audio_quality: AudioQuality::Good,
        }
    }
}

/// Raw audio capture metadata, as reported by the telephony layer
#[derive(Debug, Clone, Deserialize)]
pub struct AudioProbe {
    /// Total audio duration in seconds
    pub duration: f64,

    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Bit depth
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u32,

    /// Leading/trailing silence in seconds
    #[serde(default)]
    pub silence: f64,
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_bit_depth() -> u32 {
    16
}

/// Complete analysis of one transcribed utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechAnalysis {
    pub transcription: String,
    pub language: String,
    pub sentiment: Sentiment,
    pub intent: String,
    pub confidence: f64,
    pub metrics: VoiceMetrics,
}

/// Quality report over an analysis, for operator dashboards
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub overall_score: u32,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Recommended capture parameters for the telephony layer
#[derive(Debug, Clone, Serialize)]
pub struct CaptureParameters {
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub channels: u32,
    pub encoding: &'static str,
    pub vad: VadParameters,
}

/// Voice activity detection parameters
#[derive(Debug, Clone, Serialize)]
pub struct VadParameters {
    pub enabled: bool,
    pub threshold: f64,
}

static POSITIVE_PATTERN: OnceLock<Regex> = OnceLock::new();
static NEGATIVE_PATTERN: OnceLock<Regex> = OnceLock::new();
static INTENT_PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();

fn positive_pattern() -> &'static Regex {
    POSITIVE_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)great|excellent|wonderful|amazing|love|happy|thank|thanks|perfect|awesome")
            .expect("invalid positive sentiment pattern")
    })
}

fn negative_pattern() -> &'static Regex {
    NEGATIVE_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)bad|terrible|awful|hate|angry|upset|disappointed|frustrated|horrible")
            .expect("invalid negative sentiment pattern")
    })
}

/// Intent patterns in match priority order; the first hit wins.
fn intent_patterns() -> &'static Vec<(&'static str, Regex)> {
    INTENT_PATTERNS.get_or_init(|| {
        let table = [
            ("reservation", r"(?i)book|reserve|table|reservation|appointment"),
            ("inquiry", r"(?i)what|how|when|where|why|tell me|can you|information"),
            ("complaint", r"(?i)problem|issue|complaint|broken|not working|wrong|error"),
            ("cancellation", r"(?i)cancel|close|delete|remove|stop"),
            ("billing", r"(?i)cost|price|charge|fee|bill|payment|refund"),
            ("support", r"(?i)help|assist|support"),
            ("feedback", r"(?i)feedback|opinion|review|suggest|improve"),
        ];
        table
            .into_iter()
            .map(|(intent, pattern)| {
                (
                    intent,
                    Regex::new(pattern).expect("invalid intent pattern"),
                )
            })
            .collect()
    })
}

/// Classify the sentiment of a transcription.
///
/// Negative markers dominate: an utterance containing both reads as a
/// complaint, not praise.
pub fn detect_sentiment(transcription: &str) -> Sentiment {
    if negative_pattern().is_match(transcription) {
        Sentiment::Negative
    } else if positive_pattern().is_match(transcription) {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    }
}

/// Classify the caller's intent; "general" when nothing matches
pub fn detect_intent(transcription: &str) -> &'static str {
    for (intent, pattern) in intent_patterns() {
        if pattern.is_match(transcription) {
            return intent;
        }
    }
    "general"
}

/// Best-effort language detection from Unicode script ranges
pub fn detect_language(transcription: &str) -> &'static str {
    for ch in transcription.chars() {
        match ch {
            '\u{4E00}'..='\u{9FA5}' => return "Chinese",
            '\u{0600}'..='\u{06FF}' => return "Arabic",
            '\u{0E00}'..='\u{0E7F}' => return "Thai",
            '\u{0900}'..='\u{097F}' => return "Hindi",
            _ => {}
        }
    }
    "English"
}

/// Derive voice metrics from raw capture metadata
pub fn analyze_metrics(probe: &AudioProbe) -> VoiceMetrics {
    let speech_duration = (probe.duration - probe.silence).max(0.0);

    // ~2.5 words per second is average conversational pace
    let words_estimate = speech_duration * 2.5;
    let words_per_sec = if speech_duration > 0.0 {
        words_estimate / speech_duration
    } else {
        0.0
    };

    let speed = if words_per_sec < 2.5 {
        SpeechSpeed::Slow
    } else if words_per_sec > 3.5 {
        SpeechSpeed::Fast
    } else {
        SpeechSpeed::Normal
    };

    let audio_quality = if probe.sample_rate >= 16_000 && probe.bit_depth >= 16 {
        AudioQuality::Excellent
    } else if probe.sample_rate >= 8_000 && probe.bit_depth >= 8 {
        AudioQuality::Good
    } else {
        AudioQuality::Fair
    };

    let confidence =
        ((probe.sample_rate as f64 / 16_000.0) * (probe.bit_depth as f64 / 16.0)).min(1.0);

    VoiceMetrics {
        confidence,
        duration: probe.duration,
        speed,
        // Tone needs actual prosody analysis; the text-derived sentiment is
        // the emotional signal in this pipeline.
        tone: Tone::Neutral,
        audio_quality,
    }
}

/// Run the full analysis over a transcription, with optional capture metrics
pub fn analyze(transcription: &str, metrics: Option<VoiceMetrics>) -> SpeechAnalysis {
    let metrics = metrics.unwrap_or_default();

    SpeechAnalysis {
        transcription: transcription.to_string(),
        language: detect_language(transcription).to_string(),
        sentiment: detect_sentiment(transcription),
        intent: detect_intent(transcription).to_string(),
        confidence: metrics.confidence,
        metrics,
    }
}

/// Score an analysis and collect operator-facing issues and suggestions
pub fn quality_report(analysis: &SpeechAnalysis) -> QualityReport {
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    let mut score: i32 = 100;

    match analysis.metrics.audio_quality {
        AudioQuality::Poor => {
            issues.push("Poor audio quality".to_string());
            score -= 30;
        }
        AudioQuality::Fair => {
            score -= 10;
        }
        _ => {}
    }

    if analysis.confidence < 0.8 {
        issues.push(format!(
            "Low recognition confidence: {:.1}%",
            analysis.confidence * 100.0
        ));
        score -= 15;
    }

    if analysis.metrics.speed == SpeechSpeed::Slow {
        suggestions.push("Encourage caller to speak at normal pace".to_string());
    }

    if analysis.sentiment == Sentiment::Negative && analysis.intent == "complaint" {
        suggestions.push("Priority handling recommended - escalate if needed".to_string());
    }

    QualityReport {
        overall_score: score.max(0) as u32,
        issues,
        suggestions,
    }
}

/// Reason the input is unusable for processing, or `None` if usable
pub fn reject_reason(metrics: &VoiceMetrics) -> Option<&'static str> {
    if metrics.audio_quality == AudioQuality::Poor {
        return Some("Audio quality too poor for processing");
    }
    if metrics.confidence < 0.5 {
        return Some("Confidence score too low");
    }
    if metrics.duration > 0.0 && metrics.duration < 0.5 {
        return Some("Audio too short to process");
    }
    None
}

/// Recommended capture parameters for the telephony layer
pub fn recommended_capture() -> CaptureParameters {
    CaptureParameters {
        sample_rate: 16_000,
        bit_depth: 16,
        channels: 1,
        encoding: "linear16",
        vad: VadParameters {
            enabled: true,
            threshold: 0.5,
        },
    }
}
