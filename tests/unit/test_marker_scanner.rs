//! Unit Tests for Marker Generation and Scanning

use shellmux::channel::{transition, Action, ChannelState, Trigger};
use shellmux::marker::{FixedClock, FixedRandom, MarkerGenerator};
use shellmux::process::{MarkerScanner, Scan};

#[test]
fn test_marker_is_80_lowercase_hex_chars() {
    let marker = MarkerGenerator::default().generate("example.org");
    assert_eq!(marker.len(), 80);
    assert!(marker
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

#[test]
fn test_marker_is_deterministic_for_fixed_inputs() {
    let a = MarkerGenerator::deterministic(1_700_000_000, 5, 99).generate("host");
    let b = MarkerGenerator::new(
        Box::new(FixedClock::from_unix(1_700_000_000, 5)),
        Box::new(FixedRandom(99)),
    )
    .generate("host");
    assert_eq!(a, b);
}

#[test]
fn test_marker_depends_on_every_input() {
    let base = MarkerGenerator::deterministic(10, 20, 30).generate("host");
    assert_ne!(base, MarkerGenerator::deterministic(11, 20, 30).generate("host"));
    assert_ne!(base, MarkerGenerator::deterministic(10, 21, 30).generate("host"));
    assert_ne!(base, MarkerGenerator::deterministic(10, 20, 31).generate("host"));
    assert_ne!(base, MarkerGenerator::deterministic(10, 20, 30).generate("other"));
}

#[test]
fn test_scanner_with_generated_marker() {
    let marker = MarkerGenerator::deterministic(1, 2, 3).generate("host");
    let mut scanner = MarkerScanner::new(&marker, true).unwrap();

    let line = format!("total 0\n{} 0\n", marker);
    assert_eq!(
        scanner.feed(line.as_bytes()),
        Scan::Complete {
            output: "total 0\n".to_string(),
            status: Some(0)
        }
    );
}

#[test]
fn test_scanner_negative_status() {
    let mut scanner = MarkerScanner::new("feedbeef", true).unwrap();
    assert_eq!(
        scanner.feed(b"feedbeef -1\n"),
        Scan::Complete {
            output: String::new(),
            status: Some(-1)
        }
    );
}

#[test]
fn test_scanner_crlf_output() {
    let mut scanner = MarkerScanner::new("feedbeef", true).unwrap();
    assert_eq!(
        scanner.feed(b"line\r\nfeedbeef 0\r\n"),
        Scan::Complete {
            output: "line\r\n".to_string(),
            status: Some(0)
        }
    );
}

#[test]
fn test_scanner_text_resembling_marker_prefix() {
    let mut scanner = MarkerScanner::new("feedbeef", true).unwrap();
    assert_eq!(scanner.feed(b"feed the cat\n"), Scan::Output("feed the cat\n".to_string()));
}

#[test]
fn test_handshake_failure_resets_to_closed() {
    let (state, action) = transition(ChannelState::ShellRequested, &Trigger::RequestFailed);
    assert_eq!(state, ChannelState::Closed);
    assert!(matches!(action, Action::Fail { .. }));
}
