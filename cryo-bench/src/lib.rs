//! Shared infrastructure for the measurement bench binaries.
//!
//! The bins wire instruments from the `hardware` crate into the `sweep`
//! controller; this crate carries what they share - result sinks and the
//! startup/shutdown procedures every experiment runs.

pub mod procedure;
pub mod sink;

use std::io::BufRead;
use std::thread;

use sweep::StopFlag;

/// Trip `flag` when the operator sends a line on stdin.
///
/// The bench bins run headless; pressing Enter is the stop button. The
/// watcher thread parks on a blocking read and is abandoned at process
/// exit.
pub fn stop_on_enter(flag: StopFlag) {
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        flag.request_stop();
    });
}
