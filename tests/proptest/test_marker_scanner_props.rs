//! Property-based tests for completion marker scanning

use proptest::prelude::*;
use shellmux::process::{MarkerScanner, Scan};

const MARKER: &str = "3f786850e387550fdab836ed7e6dc881de23001b";

/// Feed `stream` split at `cuts`; return the joined output and the status
fn scan_in_chunks(stream: &[u8], cuts: &[usize]) -> (String, Option<Option<i32>>) {
    let mut scanner = MarkerScanner::new(MARKER, true).unwrap();
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (stream.len() + 1)).collect();
    points.push(0);
    points.push(stream.len());
    points.sort_unstable();
    points.dedup();

    let mut output = String::new();
    for window in points.windows(2) {
        match scanner.feed(&stream[window[0]..window[1]]) {
            Scan::Output(text) => output.push_str(&text),
            Scan::Complete { output: text, status } => {
                output.push_str(&text);
                return (output, Some(status));
            }
        }
    }
    (output, None)
}

proptest! {
    #[test]
    fn test_any_split_finds_the_marker(
        text in "[a-zA-Z0-9 .,:/_-]{0,200}(\n[a-zA-Z0-9 ]{0,40}){0,5}",
        status in 0i32..256,
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let stream = format!("{}{} {}\n", text, MARKER, status);
        let (output, completion) = scan_in_chunks(stream.as_bytes(), &cuts);

        prop_assert_eq!(output, text);
        prop_assert_eq!(completion, Some(Some(status)));
    }

    #[test]
    fn test_split_utf8_output_is_preserved(
        text in "\\PC{0,100}",
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        prop_assume!(!text.contains(MARKER));
        let stream = format!("{}{} 0\n", text, MARKER);
        let (output, completion) = scan_in_chunks(stream.as_bytes(), &cuts);

        prop_assert_eq!(output, text);
        prop_assert_eq!(completion, Some(Some(0)));
    }

    #[test]
    fn test_no_marker_means_no_completion(
        data in prop::collection::vec(any::<u8>(), 0..500),
    ) {
        let mut scanner = MarkerScanner::new(MARKER, true).unwrap();
        let completed = matches!(scanner.feed(&data), Scan::Complete { .. });
        prop_assert!(!completed);
        prop_assert!(scanner.pending_len() < MARKER.len().max(4));
    }
}
