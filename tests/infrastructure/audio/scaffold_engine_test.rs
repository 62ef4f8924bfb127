use std::time::{Duration, Instant};

use murmur::application::ports::TranscriptionEngine;
use murmur::domain::{AudioBuffer, TaskKind, TranscriptSegment, TranscriptionOptions};
use murmur::infrastructure::audio::ScaffoldEngine;

use crate::helpers::{SAMPLE_RATE, tone_buffer};

fn transcribe(
    engine: &ScaffoldEngine,
    audio: &AudioBuffer,
    options: &TranscriptionOptions,
) -> (murmur::domain::Transcript, Vec<TranscriptSegment>) {
    let mut streamed = Vec::new();
    let transcript = engine
        .transcribe(audio, options, &mut |s: &TranscriptSegment| {
            streamed.push(s.clone())
        })
        .unwrap();
    (transcript, streamed)
}

#[test]
fn given_silence_when_transcribing_then_no_segments() {
    let engine = ScaffoldEngine::new();
    let audio = AudioBuffer::new(vec![0.0; SAMPLE_RATE as usize * 3], SAMPLE_RATE);

    let (transcript, streamed) = transcribe(&engine, &audio, &TranscriptionOptions::default());

    assert!(transcript.segments.is_empty());
    assert!(streamed.is_empty());
}

#[test]
fn given_tone_when_transcribing_then_one_segment_per_window_in_bounds() {
    let engine = ScaffoldEngine::new().with_window_secs(1.0);
    let audio = tone_buffer(2.5);

    let (transcript, streamed) = transcribe(&engine, &audio, &TranscriptionOptions::default());

    assert_eq!(transcript.segments.len(), 3);
    assert_eq!(streamed, transcript.segments);
    assert_eq!(transcript.segments[2].end, 2.5);
    assert_eq!(transcript.text, "[speech 1] [speech 2] [speech 3]");
    assert_eq!(transcript.language, "en");
}

#[test]
fn given_translate_task_and_hint_when_transcribing_then_labels_and_keeps_language() {
    let engine = ScaffoldEngine::new();
    let options = TranscriptionOptions {
        language: Some("es".to_string()),
        task: TaskKind::Translate,
    };

    let (transcript, _) = transcribe(&engine, &tone_buffer(1.0), &options);

    assert_eq!(transcript.text, "[translated speech 1]");
    assert_eq!(transcript.language, "es");
}

#[test]
fn given_delay_when_transcribing_then_blocks_at_least_that_long() {
    let engine = ScaffoldEngine::new().with_delay(Duration::from_millis(30));
    let started = Instant::now();

    let _ = transcribe(&engine, &tone_buffer(0.5), &TranscriptionOptions::default());

    assert!(started.elapsed() >= Duration::from_millis(30));
}
