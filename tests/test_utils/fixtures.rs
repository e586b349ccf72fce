//! Test Fixtures

use shellmux::{ChannelId, MarkerGenerator, Shell, ShellConfig};
use std::sync::{Arc, Mutex};

use super::MockTransport;

/// Output chunks gathered by a callback
pub type Collected = Arc<Mutex<Vec<String>>>;

/// A marker generator with fixed inputs
pub fn test_generator() -> MarkerGenerator {
    MarkerGenerator::deterministic(1_700_000_000, 123_456, 42)
}

/// A session over a fresh mock transport with a deterministic marker
pub fn quiet_shell(config: ShellConfig) -> Shell<MockTransport> {
    Shell::with_config(MockTransport::new(), config).with_marker_generator(test_generator())
}

/// A callback recording every chunk it receives, and the shared record
pub fn collector() -> (Collected, impl FnMut(ChannelId, &str) + Send + 'static) {
    let seen: Collected = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |_channel: ChannelId, text: &str| {
        sink.lock().unwrap().push(text.to_string())
    })
}
