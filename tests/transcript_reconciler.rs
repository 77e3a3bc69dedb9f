use realtime_asr_relay::transcript::{RecognitionEvent, TranscriptReconciler};

fn interim(text: &str) -> RecognitionEvent {
    RecognitionEvent::interim(text)
}

fn final_result(text: &str) -> RecognitionEvent {
    RecognitionEvent::final_result(text)
}

#[test]
fn interim_interim_final_yields_single_final_line() {
    let mut reconciler = TranscriptReconciler::new();
    reconciler.apply(&interim("привет"));
    reconciler.apply(&interim("привет как"));
    reconciler.apply(&final_result("привет как дела"));

    let lines = reconciler.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].is_final);
    assert_eq!(lines[0].text, "привет как дела");
}

#[test]
fn at_most_one_nonfinal_line_at_every_prefix() {
    let events = [
        interim("a"),
        interim("ab"),
        final_result("abc"),
        final_result("abc"),
        interim("d"),
        interim(""),
        final_result("de"),
        interim("f"),
    ];

    let mut reconciler = TranscriptReconciler::new();
    for event in &events {
        reconciler.apply(event);

        let nonfinal = reconciler
            .lines()
            .iter()
            .filter(|line| !line.is_final)
            .count();
        assert!(nonfinal <= 1);
        if nonfinal == 1 {
            // 非確定行は常に末尾
            assert!(!reconciler.lines().last().unwrap().is_final);
        }
    }
}

#[test]
fn final_line_count_tracks_final_events() {
    let events = [
        interim("x"),
        final_result("one"),
        final_result("two"),
        interim("y"),
        final_result("three"),
    ];

    let mut reconciler = TranscriptReconciler::new();
    for event in &events {
        reconciler.apply(event);
    }

    assert_eq!(reconciler.final_count(), 3);
    let texts: Vec<&str> = reconciler
        .lines()
        .iter()
        .map(|line| line.text.as_str())
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[test]
fn interim_after_final_starts_a_new_line() {
    let mut reconciler = TranscriptReconciler::new();
    reconciler.apply(&final_result("done"));
    reconciler.apply(&interim("nex"));
    reconciler.apply(&interim("next"));

    let lines = reconciler.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].is_final);
    assert!(!lines[1].is_final);
    assert_eq!(lines[1].text, "next");
}

#[test]
fn empty_transcripts_never_produce_lines() {
    let mut reconciler = TranscriptReconciler::new();
    reconciler.apply(&interim(""));
    reconciler.apply(&final_result(""));
    assert!(reconciler.lines().is_empty());
}

#[test]
fn wire_event_roundtrips_camel_case_flag() {
    let parsed: RecognitionEvent =
        serde_json::from_str(r#"{"transcript":"привет","isFinal":false}"#).unwrap();
    assert_eq!(parsed, RecognitionEvent::interim("привет"));
}
