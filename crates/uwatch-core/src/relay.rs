//! Terminal relay
//!
//! The inner instance leads a new process group, so it must never touch the
//! controlling terminal itself: a background group that reads or writes the
//! terminal is stopped by the kernel. For every standard stream attached to a
//! terminal the outer instance hands the child a pipe instead, and pumps bytes
//! between that pipe and the terminal.

use futures::future::join_all;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::unistd;
use std::io::{self, IsTerminal};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{WatchError, WatchResult};

/// How long output relays may keep draining after the child is gone
pub const RELAY_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Standard streams handed to a spawned child
#[derive(Debug)]
pub struct ChildStdio {
    pub stdin: Stdio,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

impl ChildStdio {
    /// Pass all three streams through unchanged
    pub fn inherit() -> Self {
        Self {
            stdin: Stdio::inherit(),
            stdout: Stdio::inherit(),
            stderr: Stdio::inherit(),
        }
    }
}

/// One of the three standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

/// Which way bytes flow through a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Terminal to child
    In,
    /// Child to terminal
    Out,
}

impl StdStream {
    /// Direction of the relay for this stream
    pub fn direction(self) -> Direction {
        match self {
            Self::Stdin => Direction::In,
            Self::Stdout | Self::Stderr => Direction::Out,
        }
    }

    /// Whether this process's copy of the stream is a terminal
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Stdin => io::stdin().is_terminal(),
            Self::Stdout => io::stdout().is_terminal(),
            Self::Stderr => io::stderr().is_terminal(),
        }
    }
}

#[derive(Debug)]
struct RelayPump {
    stream: StdStream,
    handle: JoinHandle<()>,
}

/// Background pumps between the terminal and the child's pipes
#[derive(Debug)]
pub struct TerminalRelay {
    pumps: Vec<RelayPump>,
    cancel: CancellationToken,
}

impl TerminalRelay {
    /// Relay every terminal-attached standard stream.
    ///
    /// Returns the relay and the streams to hand to the child. Streams that are
    /// not terminals are inherited as they are. Must be called from within a
    /// tokio runtime.
    pub fn attach() -> WatchResult<(Self, ChildStdio)> {
        let mut relay = Self {
            pumps: Vec::new(),
            cancel: CancellationToken::new(),
        };
        let stdio = ChildStdio {
            stdin: relay.relay_if_terminal(StdStream::Stdin)?,
            stdout: relay.relay_if_terminal(StdStream::Stdout)?,
            stderr: relay.relay_if_terminal(StdStream::Stderr)?,
        };
        Ok((relay, stdio))
    }

    fn relay_if_terminal(&mut self, stream: StdStream) -> WatchResult<Stdio> {
        if !stream.is_terminal() {
            return Ok(Stdio::inherit());
        }

        let (read_end, write_end) = cloexec_pipe()?;
        let cancel = self.cancel.clone();
        let (child_end, handle) = match stream {
            StdStream::Stdin => {
                let writer = pipe_file(write_end);
                let handle = spawn_pump(stream, tokio::io::stdin(), writer, cancel);
                (read_end, handle)
            }
            StdStream::Stdout => {
                let reader = pipe_file(read_end);
                let handle = spawn_pump(stream, reader, tokio::io::stdout(), cancel);
                (write_end, handle)
            }
            StdStream::Stderr => {
                let reader = pipe_file(read_end);
                let handle = spawn_pump(stream, reader, tokio::io::stderr(), cancel);
                (write_end, handle)
            }
        };

        debug!(?stream, "relaying terminal through pipe");
        self.pumps.push(RelayPump { stream, handle });
        Ok(Stdio::from(child_end))
    }

    /// Stop relaying.
    ///
    /// Output relays get up to `grace` to drain what the child left in the
    /// pipes; everything still running afterwards is cancelled and abandoned.
    pub async fn finish(self, grace: Duration) {
        let (mut outputs, inputs): (Vec<_>, Vec<_>) = self
            .pumps
            .into_iter()
            .partition(|pump| pump.stream.direction() == Direction::Out);

        for pump in &inputs {
            pump.handle.abort();
        }

        let draining = join_all(outputs.iter_mut().map(|pump| &mut pump.handle));
        if tokio::time::timeout(grace, draining).await.is_err() {
            debug!("output relay still busy, abandoning");
        }

        self.cancel.cancel();
        for pump in &outputs {
            pump.handle.abort();
        }
    }
}

/// Copy bytes from `reader` to `writer` until end of input, then shut the
/// writer down and drop it, closing a pipe's write end.
///
/// Returns the number of bytes copied, or `Interrupted` when cancelled first.
pub async fn pump<R, W>(mut reader: R, mut writer: W, cancel: CancellationToken) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::select! {
        copied = tokio::io::copy(&mut reader, &mut writer) => copied?,
        _ = cancel.cancelled() => {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "relay cancelled"));
        }
    };
    writer.shutdown().await?;
    Ok(copied)
}

fn spawn_pump<R, W>(stream: StdStream, reader: R, writer: W, cancel: CancellationToken) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match pump(reader, writer, cancel).await {
            Ok(bytes) => debug!(?stream, bytes, "relay reached end of input"),
            Err(e) => debug!(?stream, "relay stopped: {}", e),
        }
    })
}

/// Allocate a pipe whose ends are both close-on-exec.
///
/// The end handed to a child is installed on a standard descriptor during
/// spawn, which clears the flag for that copy only.
pub fn cloexec_pipe() -> WatchResult<(OwnedFd, OwnedFd)> {
    let (read_end, write_end) = unistd::pipe().map_err(WatchError::Pipe)?;
    for fd in [&read_end, &write_end] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(WatchError::Pipe)?;
    }
    Ok((read_end, write_end))
}

fn pipe_file(fd: OwnedFd) -> tokio::fs::File {
    tokio::fs::File::from_std(std::fs::File::from(fd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_pump_copies_until_eof() {
        let input: &[u8] = b"hello from the terminal\n";
        let mut output = Vec::new();
        let copied = pump(input, &mut output, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(copied, input.len() as u64);
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_pump_closes_pipe_write_end() {
        let (read_end, write_end) = cloexec_pipe().unwrap();
        let input: &[u8] = b"line one\nline two\n";

        pump(input, pipe_file(write_end), CancellationToken::new())
            .await
            .unwrap();

        // read_to_end only returns once every write end is closed
        let mut reader = pipe_file(read_end);
        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, input);
    }

    #[tokio::test]
    async fn test_pump_stops_when_cancelled() {
        let (_keep_open, idle_reader) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(idle_reader, Vec::new(), cancel.clone()));

        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_pipe_ends_are_cloexec() {
        let (read_end, write_end) = cloexec_pipe().unwrap();
        for fd in [&read_end, &write_end] {
            let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
            assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn test_stream_directions() {
        assert_eq!(StdStream::Stdin.direction(), Direction::In);
        assert_eq!(StdStream::Stdout.direction(), Direction::Out);
        assert_eq!(StdStream::Stderr.direction(), Direction::Out);
    }

    #[tokio::test]
    async fn test_finish_without_pumps_returns() {
        let relay = TerminalRelay {
            pumps: Vec::new(),
            cancel: CancellationToken::new(),
        };
        relay.finish(RELAY_DRAIN_GRACE).await;
    }
}
