use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use log::{debug, info};
use std::io;
use std::time::Duration;

use crate::capture::session::StopHandle;

/// Source of single key presses
pub trait KeySource {
    /// Wait up to `timeout` for a key; `None` when nothing was pressed
    fn poll_key(&mut self, timeout: Duration) -> io::Result<Option<char>>;
}

/// Keyboard input through crossterm (expects the terminal in raw mode)
#[derive(Debug, Default)]
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn poll_key(&mut self, timeout: Duration) -> io::Result<Option<char>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                // Raw mode swallows SIGINT, so Ctrl+C arrives as a key
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Ok(Some('\u{3}')),
                KeyCode::Char(c) => Ok(Some(c)),
                KeyCode::Esc => Ok(Some('\u{1b}')),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

/// Whether the watcher has fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    Watching,
    Cancelled,
}

/// Polls for the operator's cancel key on the main thread
///
/// The poll timeout doubles as the loop's sleep. On the first cancel key
/// the watcher stops the session exactly once and then stops watching.
pub struct InputWatcher {
    cancel_key: char,
    interval: Duration,
    status: WatchStatus,
}

impl InputWatcher {
    pub fn new(cancel_key: char, interval: Duration) -> Self {
        Self {
            cancel_key,
            interval,
            status: WatchStatus::Watching,
        }
    }

    pub fn status(&self) -> WatchStatus {
        self.status
    }

    fn is_cancel(&self, key: char) -> bool {
        key.eq_ignore_ascii_case(&self.cancel_key) || key == '\u{3}'
    }

    /// One poll tick
    pub fn poll<K: KeySource>(&mut self, keys: &mut K, stop: &StopHandle) -> io::Result<WatchStatus> {
        if self.status == WatchStatus::Cancelled {
            return Ok(self.status);
        }

        match keys.poll_key(self.interval)? {
            Some(key) if self.is_cancel(key) => {
                info!("Cancel key pressed, stopping capture");
                stop.stop();
                self.status = WatchStatus::Cancelled;
            }
            Some(key) => debug!("Ignoring key {:?}", key),
            None => {}
        }
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::session::CaptureSession;
    use crate::capture::source::PcapSource;
    use std::collections::VecDeque;

    fn idle_stop_handle() -> StopHandle {
        CaptureSession::<PcapSource>::new(None).stop_handle()
    }

    struct ScriptedKeys {
        keys: VecDeque<Option<char>>,
        polls: usize,
    }

    impl ScriptedKeys {
        fn new(keys: &[Option<char>]) -> Self {
            Self {
                keys: keys.iter().copied().collect(),
                polls: 0,
            }
        }
    }

    impl KeySource for ScriptedKeys {
        fn poll_key(&mut self, _timeout: Duration) -> io::Result<Option<char>> {
            self.polls += 1;
            Ok(self.keys.pop_front().flatten())
        }
    }

    #[test]
    fn other_keys_keep_watching() {
        let mut watcher = InputWatcher::new('q', Duration::from_millis(1));
        let mut keys = ScriptedKeys::new(&[None, Some('x'), Some('w')]);
        let stop = idle_stop_handle();

        for _ in 0..3 {
            assert_eq!(watcher.poll(&mut keys, &stop).unwrap(), WatchStatus::Watching);
        }
        assert!(!stop.is_stopped());
    }

    #[test]
    fn cancel_key_matches_case_insensitively_and_fires_once() {
        let mut watcher = InputWatcher::new('q', Duration::from_millis(1));
        let mut keys = ScriptedKeys::new(&[Some('Q'), Some('q')]);
        let stop = idle_stop_handle();

        assert_eq!(watcher.poll(&mut keys, &stop).unwrap(), WatchStatus::Cancelled);
        assert_eq!(watcher.poll(&mut keys, &stop).unwrap(), WatchStatus::Cancelled);
        // The second tick no longer reads input
        assert_eq!(keys.polls, 1);
    }
}
