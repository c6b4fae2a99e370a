//! Non-blocking command transport fed by a reader thread.
//!
//! The reader owns the blocking `BufRead` and forwards complete lines over a
//! channel; the control loop only ever calls `try_recv`.
use crossbeam_channel as xch;
use puller_traits::LineSource;
use std::io::BufRead;

pub struct ChannelLines {
    rx: xch::Receiver<String>,
    closed: bool,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ChannelLines {
    /// Spawn a thread that reads `input` line by line until EOF or a read error.
    pub fn spawn_reader<R: BufRead + Send + 'static>(input: R) -> Self {
        let (tx, rx) = xch::unbounded();
        let join_handle = std::thread::spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            tracing::debug!("line consumer disconnected, exiting reader");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "command input read failed");
                        break;
                    }
                }
            }
            tracing::trace!("line reader exiting");
        });
        Self {
            rx,
            closed: false,
            join_handle: Some(join_handle),
        }
    }

    /// Wrap an existing receiver (no reader thread).
    pub fn from_receiver(rx: xch::Receiver<String>) -> Self {
        Self {
            rx,
            closed: false,
            join_handle: None,
        }
    }
}

impl LineSource for ChannelLines {
    fn poll_line(&mut self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(line) => Some(line),
            Err(xch::TryRecvError::Empty) => None,
            Err(xch::TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ChannelLines {
    fn drop(&mut self) {
        // A reader blocked on stdin cannot be interrupted; only join finished threads.
        if let Some(h) = self.join_handle.take()
            && h.is_finished()
        {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_forwards_lines_then_closes() {
        let mut lines = ChannelLines::spawn_reader(std::io::Cursor::new("open\nstop\n"));
        let mut got = Vec::new();
        while !lines.is_closed() {
            if let Some(l) = lines.poll_line() {
                got.push(l);
            } else {
                std::thread::yield_now();
            }
        }
        assert_eq!(got, vec!["open".to_string(), "stop".to_string()]);
    }

    #[test]
    fn receiver_backed_source_reports_disconnect() {
        let (tx, rx) = xch::unbounded();
        let mut lines = ChannelLines::from_receiver(rx);
        tx.send("home".to_string()).unwrap();
        drop(tx);
        assert_eq!(lines.poll_line().as_deref(), Some("home"));
        assert_eq!(lines.poll_line(), None);
        assert!(lines.is_closed());
    }
}
