use std::time::Duration;

use realtime_asr_relay::reconnect::{ReconnectDecision, ReconnectPolicy};

#[test]
fn exactly_max_attempts_are_granted() {
    let max_attempts = 4;
    let policy = ReconnectPolicy::new(max_attempts, Duration::from_millis(100));

    let mut granted = 0;
    let mut attempt = 0;
    loop {
        match policy.decide(attempt, true) {
            ReconnectDecision::Retry { .. } => {
                granted += 1;
                attempt += 1;
            }
            ReconnectDecision::GiveUp => break,
        }
    }

    assert_eq!(granted, max_attempts);
}

#[test]
fn loss_while_not_recording_is_never_retried() {
    let policy = ReconnectPolicy::new(5, Duration::from_millis(100));
    assert_eq!(policy.decide(0, false), ReconnectDecision::GiveUp);
    assert_eq!(policy.decide(4, false), ReconnectDecision::GiveUp);
}

#[test]
fn delay_is_fixed_not_exponential() {
    let delay = Duration::from_millis(250);
    let policy = ReconnectPolicy::new(8, delay);

    for attempt in 0..8 {
        assert_eq!(
            policy.decide(attempt, true),
            ReconnectDecision::Retry { after: delay }
        );
    }
}

#[test]
fn zero_max_attempts_gives_up_immediately() {
    let policy = ReconnectPolicy::new(0, Duration::from_millis(100));
    assert_eq!(policy.decide(0, true), ReconnectDecision::GiveUp);
}
