use clap::ValueEnum;

use longscribe_core::transcription::domain::transcript::Transcription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Full result including segments, mode and timing.
    Json,
    /// SubRip subtitles.
    Srt,
    /// Plain text, one line per segment.
    Text,
}

impl OutputFormat {
    /// Picks a format from an output file extension (`.json`, `.srt`, `.txt`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "srt" => Some(OutputFormat::Srt),
            "txt" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

pub fn render(transcription: &Transcription, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(transcription).map(|s| s + "\n"),
        OutputFormat::Srt => Ok(to_srt(transcription)),
        OutputFormat::Text => Ok(to_text(transcription)),
    }
}

fn to_text(transcription: &Transcription) -> String {
    let mut out = String::new();
    for segment in &transcription.segments {
        let text = segment.text.trim();
        if !text.is_empty() {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

fn to_srt(transcription: &Transcription) -> String {
    let mut out = String::new();
    let cues = transcription
        .segments
        .iter()
        .filter(|s| !s.text.trim().is_empty());
    for (n, segment) in cues.enumerate() {
        if n > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n",
            n + 1,
            srt_timestamp(segment.start),
            srt_timestamp(segment.end),
            segment.text.trim()
        ));
    }
    out
}

/// `HH:MM:SS,mmm`
fn srt_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, millis) = (rest / 1000, rest % 1000);
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use longscribe_core::transcription::domain::transcript::{Segment, TranscriptionMode};
    use rstest::rstest;

    fn sample() -> Transcription {
        Transcription {
            language: Some("en".into()),
            segments: vec![
                Segment::new(" Hello there.", 0.5, 2.25),
                Segment::new("   ", 2.25, 3.0),
                Segment::new("General Kenobi.", 3661.0, 3663.5),
            ],
            chunk_count: 31,
            mode_used: TranscriptionMode::Parallel,
            partial: false,
            missing_chunks: vec![],
            chunk_processing_secs: vec![],
            elapsed_secs: 12.0,
        }
    }

    #[rstest]
    #[case::zero(0.0, "00:00:00,000")]
    #[case::fraction(2.25, "00:00:02,250")]
    #[case::hours(3661.5, "01:01:01,500")]
    #[case::rounding(59.9996, "00:01:00,000")]
    #[case::negative(-1.0, "00:00:00,000")]
    fn test_srt_timestamp(#[case] secs: f64, #[case] expected: &str) {
        assert_eq!(srt_timestamp(secs), expected);
    }

    #[test]
    fn test_srt_skips_blank_segments() {
        let srt = render(&sample(), OutputFormat::Srt).unwrap();
        assert_eq!(
            srt,
            "1\n00:00:00,500 --> 00:00:02,250\nHello there.\n\n\
             2\n01:01:01,000 --> 01:01:03,500\nGeneral Kenobi.\n"
        );
    }

    #[test]
    fn test_text_one_line_per_segment() {
        let text = render(&sample(), OutputFormat::Text).unwrap();
        assert_eq!(text, "Hello there.\nGeneral Kenobi.\n");
    }

    #[test]
    fn test_json_round_trips_mode() {
        let json = render(&sample(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode_used"], "parallel");
        assert_eq!(value["chunk_count"], 31);
    }

    #[rstest]
    #[case::json("json", Some(OutputFormat::Json))]
    #[case::upper("SRT", Some(OutputFormat::Srt))]
    #[case::txt("txt", Some(OutputFormat::Text))]
    #[case::unknown("docx", None)]
    fn test_from_extension(#[case] ext: &str, #[case] expected: Option<OutputFormat>) {
        assert_eq!(OutputFormat::from_extension(ext), expected);
    }
}
