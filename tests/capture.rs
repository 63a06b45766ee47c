//! Speech capture supervision tests

use std::time::{Duration, Instant};

use beacon_voice::platform::{CaptureErrorKind, RecognitionEvent, TranscriptSegment};
use beacon_voice::voice::{CaptureStatus, Utterance};

mod common;

use common::{RecognizerLog, capture, shared};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_restart_cooldown_allows_one_start() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);

    assert!(session.start(t0));
    session.handle_event(RecognitionEvent::Ended, t0 + ms(100));
    assert_eq!(session.status(), CaptureStatus::NotStarted);

    assert!(!session.start(t0 + ms(1999)));
    assert_eq!(log.lock().unwrap().starts, 1);

    assert!(session.start(t0 + ms(2000)));
    assert_eq!(log.lock().unwrap().starts, 2);
}

#[test]
fn test_only_one_session_starting() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);

    assert!(session.start(t0));
    assert!(!session.start(t0 + ms(5000)));
    assert_eq!(session.status(), CaptureStatus::Starting);
    assert_eq!(log.lock().unwrap().starts, 1);
}

#[test]
fn test_start_requires_desire() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);

    assert!(!session.start(Instant::now()));
    assert_eq!(log.lock().unwrap().starts, 0);
}

#[test]
fn test_overlapping_restarts_collapse() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);

    session.start(t0);
    session.handle_event(RecognitionEvent::Started, t0 + ms(50));
    session.handle_event(RecognitionEvent::Ended, t0 + ms(100));
    assert_eq!(session.scheduled_restart(), Some(t0 + ms(2600)));

    // Cooldown would allow t0 + 2000; the later ended-restart wins
    assert!(!session.request_start(t0 + ms(500)));
    assert_eq!(session.scheduled_restart(), Some(t0 + ms(2600)));

    session.poll(t0 + ms(2599));
    assert_eq!(log.lock().unwrap().starts, 1);

    session.poll(t0 + ms(2600));
    assert_eq!(log.lock().unwrap().starts, 2);
    assert_eq!(session.scheduled_restart(), None);
}

#[test]
fn test_error_backoff_by_kind() {
    let t0 = Instant::now();

    let cases = [
        (CaptureErrorKind::NoSpeech, Some(ms(0))),
        (CaptureErrorKind::AudioCapture, Some(ms(3000))),
        (CaptureErrorKind::Network, Some(ms(8000))),
        (CaptureErrorKind::Other("bad-grammar".to_string()), Some(ms(8000))),
        (CaptureErrorKind::Aborted, None),
        (CaptureErrorKind::NotAllowed, None),
    ];

    for (kind, backoff) in cases {
        let log = shared::<RecognizerLog>();
        let mut session = capture(&log);
        session.set_desired(true, t0);
        session.start(t0);
        session.handle_event(RecognitionEvent::Started, t0);

        session.handle_event(RecognitionEvent::Error(kind.clone()), t0 + ms(100));
        assert_eq!(
            session.scheduled_restart(),
            backoff.map(|b| t0 + ms(100) + b),
            "backoff for {kind}"
        );
    }
}

#[test]
fn test_permission_denied_disables_capture() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);

    session.handle_event(RecognitionEvent::Error(CaptureErrorKind::NotAllowed), t0);
    session.handle_event(RecognitionEvent::Ended, t0);

    assert!(session.permission_denied());
    assert_eq!(session.scheduled_restart(), None);
    assert!(!session.start(t0 + ms(60_000)));

    // Health checks do not resurrect it either
    for step in 1..=12 {
        session.poll(t0 + ms(5000 * step));
    }
    assert_eq!(log.lock().unwrap().starts, 1);
}

#[test]
fn test_synchronous_rejection_schedules_retry() {
    let log = shared::<RecognizerLog>();
    log.lock().unwrap().reject_next = Some(CaptureErrorKind::AudioCapture);
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);

    assert!(!session.start(t0));
    assert_eq!(session.status(), CaptureStatus::NotStarted);
    assert_eq!(session.scheduled_restart(), Some(t0 + ms(3000)));

    session.poll(t0 + ms(3000));
    assert_eq!(log.lock().unwrap().starts, 2);
    assert_eq!(session.status(), CaptureStatus::Starting);
}

#[test]
fn test_final_results_bypass_debounce() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);
    session.handle_event(RecognitionEvent::Started, t0);

    let utterance = session.handle_event(
        RecognitionEvent::Results(vec![
            TranscriptSegment::finalized("hello there"),
            TranscriptSegment::interim("how"),
        ]),
        t0 + ms(300),
    );

    assert_eq!(
        utterance,
        Some(Utterance {
            text: "hello there".to_string(),
            finalized: true,
        })
    );
    assert_eq!(session.session().finalized_text, "hello there");
    assert!(session.session().pending_interim.is_empty());
}

#[test]
fn test_interim_promoted_after_silence() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);
    session.handle_event(RecognitionEvent::Started, t0);

    let first = session.handle_event(
        RecognitionEvent::Results(vec![TranscriptSegment::interim("turn on")]),
        t0,
    );
    assert_eq!(first, None);

    // New interim text restarts the debounce
    session.handle_event(
        RecognitionEvent::Results(vec![TranscriptSegment::interim("turn on the lights")]),
        t0 + ms(1000),
    );
    assert_eq!(session.poll(t0 + ms(2199)), None);

    assert_eq!(
        session.poll(t0 + ms(2200)),
        Some(Utterance {
            text: "turn on the lights".to_string(),
            finalized: false,
        })
    );
    assert_eq!(session.poll(t0 + ms(4000)), None);
}

#[test]
fn test_late_start_is_stopped_when_unwanted() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);

    session.set_desired(false, t0 + ms(10));
    session.handle_event(RecognitionEvent::Started, t0 + ms(200));

    assert_eq!(session.status(), CaptureStatus::Stopping);
    assert_eq!(log.lock().unwrap().stops, 1);

    session.handle_event(RecognitionEvent::Ended, t0 + ms(300));
    assert_eq!(session.status(), CaptureStatus::NotStarted);
    assert_eq!(session.scheduled_restart(), None);
}

#[test]
fn test_stop_only_when_active() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);

    session.stop();
    session.start(t0);
    session.stop();
    assert_eq!(log.lock().unwrap().stops, 0);

    session.handle_event(RecognitionEvent::Started, t0);
    session.stop();
    assert_eq!(log.lock().unwrap().stops, 1);
    assert_eq!(session.status(), CaptureStatus::Stopping);
}

#[test]
fn test_suspension_refuses_start() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.set_suspended(true, t0);

    assert!(!session.start(t0));
    assert!(!session.request_start(t0));
    for step in 1..=6 {
        session.poll(t0 + ms(5000 * step));
    }
    assert_eq!(log.lock().unwrap().starts, 0);

    session.set_suspended(false, t0 + ms(31_000));
    assert!(session.start(t0 + ms(31_000)));
}

#[test]
fn test_suspension_stops_active_capture() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);
    session.handle_event(RecognitionEvent::Started, t0);

    session.set_suspended(true, t0 + ms(100));
    assert_eq!(session.status(), CaptureStatus::Stopping);

    session.handle_event(RecognitionEvent::Ended, t0 + ms(200));
    assert_eq!(session.scheduled_restart(), None);
}

#[test]
fn test_health_check_restarts_idle_capture() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);

    session.poll(t0 + ms(4999));
    assert_eq!(log.lock().unwrap().starts, 0);

    session.poll(t0 + ms(5000));
    assert_eq!(log.lock().unwrap().starts, 1);
    assert_eq!(session.status(), CaptureStatus::Starting);
}

#[test]
fn test_recovery_rebuilds_stuck_session() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);

    // Never reports started
    for step in 1..=5 {
        session.poll(t0 + ms(5000 * step));
    }
    assert_eq!(session.session().generation, 0);
    assert_eq!(log.lock().unwrap().starts, 1);

    session.poll(t0 + ms(30_000));
    assert_eq!(session.session().generation, 1);
    assert_eq!(session.status(), CaptureStatus::Starting);
    assert_eq!(log.lock().unwrap().stops, 1);
    assert_eq!(log.lock().unwrap().starts, 2);
}

#[test]
fn test_rebuilt_session_ignores_old_end() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);
    session.handle_event(RecognitionEvent::Started, t0 + ms(100));

    // Stop request the platform never answers
    session.stop();
    assert_eq!(session.status(), CaptureStatus::Stopping);

    session.poll(t0 + ms(40_000));
    assert_eq!(session.session().generation, 1);
    assert_eq!(log.lock().unwrap().starts, 2);
    session.handle_event(RecognitionEvent::Started, t0 + ms(40_100));

    // The abandoned session finally reports its end
    session.handle_event(RecognitionEvent::Ended, t0 + ms(40_200));
    assert_eq!(session.status(), CaptureStatus::Active);
    assert_eq!(session.scheduled_restart(), None);

    session.poll(t0 + ms(43_000));
    assert_eq!(log.lock().unwrap().starts, 2);
    assert_eq!(session.status(), CaptureStatus::Active);

    // The live session's own end is still honored
    session.handle_event(RecognitionEvent::Ended, t0 + ms(50_000));
    assert_eq!(session.status(), CaptureStatus::NotStarted);
    assert_eq!(session.scheduled_restart(), Some(t0 + ms(52_500)));
}

#[test]
fn test_active_session_is_not_recovered() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);
    session.handle_event(RecognitionEvent::Started, t0 + ms(100));

    for step in 1..=12 {
        session.poll(t0 + ms(5000 * step));
    }
    assert_eq!(session.session().generation, 0);
    assert_eq!(log.lock().unwrap().starts, 1);
}

#[test]
fn test_results_outside_active_dropped() {
    let log = shared::<RecognizerLog>();
    let mut session = capture(&log);
    let t0 = Instant::now();
    session.set_desired(true, t0);
    session.start(t0);

    let utterance = session.handle_event(
        RecognitionEvent::Results(vec![TranscriptSegment::finalized("too early")]),
        t0,
    );
    assert_eq!(utterance, None);
}
