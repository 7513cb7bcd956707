//! Per-viewer writer task
//!
//! Each attached viewer gets one task that races its packet queue against
//! the playback gate's deadline and writes admitted packets to the transport.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::media::Packet;
use crate::registry::{StreamId, ViewerId};

use super::gate::PlaybackGate;
use super::session::{CloseReason, ViewerLink, ViewerSession};

/// Error returned by a transport writer
pub type WriteError = Box<dyn std::error::Error + Send + Sync>;

/// Transport-side sink for a viewer's packets (e.g. a WebRTC muxer)
pub trait PacketWriter: Send + 'static {
    /// Write one packet; an error ends the viewer session
    fn write_packet(
        &mut self,
        packet: &Packet,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Release transport resources
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// How a viewer task ended
#[derive(Debug)]
pub enum ViewerExit {
    /// No qualifying packet within the idle timeout
    TimedOut,
    /// Transport write failed
    WriteFailed(WriteError),
    /// Session was closed from the registry side
    Closed(CloseReason),
    /// Task panicked or was aborted
    Aborted,
}

impl ViewerExit {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ViewerExit::TimedOut)
    }
}

impl fmt::Display for ViewerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerExit::TimedOut => write!(f, "playback timed out"),
            ViewerExit::WriteFailed(e) => write!(f, "write failed: {}", e),
            ViewerExit::Closed(reason) => write!(f, "closed: {}", reason),
            ViewerExit::Aborted => write!(f, "aborted"),
        }
    }
}

/// Pump packets from `session` through a playback gate into `writer`
///
/// Returns when the gate times out, the writer fails or the session closes.
/// The writer is closed in every case.
pub async fn run_viewer<W: PacketWriter>(
    session: &mut ViewerSession,
    writer: &mut W,
    idle_timeout: Duration,
) -> ViewerExit {
    let mut gate = PlaybackGate::new(session.audio_only(), idle_timeout);

    let exit = loop {
        tokio::select! {
            biased;
            _ = time::sleep_until(gate.deadline()) => {
                gate.expire();
                tracing::info!(
                    stream = %session.stream(),
                    viewer = %session.id(),
                    started = gate.is_started(),
                    "No keyframe within idle timeout, closing viewer"
                );
                break ViewerExit::TimedOut;
            }
            packet = session.recv() => match packet {
                Some(packet) => {
                    if gate.admit(&packet, Instant::now()) {
                        if let Err(e) = writer.write_packet(&packet).await {
                            tracing::warn!(
                                stream = %session.stream(),
                                viewer = %session.id(),
                                error = %e,
                                "Write packet failed"
                            );
                            break ViewerExit::WriteFailed(e);
                        }
                    }
                }
                None => {
                    let reason = session.close_reason().unwrap_or(CloseReason::StreamEnded);
                    break ViewerExit::Closed(reason);
                }
            },
        }
    };

    writer.close().await;

    tracing::debug!(
        stream = %session.stream(),
        viewer = %session.id(),
        forwarded = gate.forwarded(),
        discarded = gate.discarded(),
        exit = %exit,
        "Viewer task finished"
    );

    exit
}

/// Handle to an attached viewer's task
pub struct ViewerHandle {
    id: ViewerId,
    stream: StreamId,
    link: Arc<ViewerLink>,
    task: JoinHandle<ViewerExit>,
}

impl ViewerHandle {
    pub(crate) fn new(
        id: ViewerId,
        stream: StreamId,
        link: Arc<ViewerLink>,
        task: JoinHandle<ViewerExit>,
    ) -> Self {
        Self {
            id,
            stream,
            link,
            task,
        }
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Stop the viewer; its task deregisters it on the way out
    pub fn close(&self) {
        self.link.close(CloseReason::Deregistered);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the viewer task to end
    pub async fn join(self) -> ViewerExit {
        self.task.await.unwrap_or(ViewerExit::Aborted)
    }
}

impl fmt::Debug for ViewerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerHandle")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;

    /// Writer that forwards written packets to a channel
    pub(crate) struct ChannelWriter {
        pub(crate) tx: mpsc::UnboundedSender<Packet>,
        pub(crate) fail_after: Option<usize>,
        pub(crate) closed: Arc<std::sync::atomic::AtomicBool>,
    }

    impl ChannelWriter {
        pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Packet>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let writer = Self {
                tx,
                fail_after: None,
                closed: Arc::default(),
            };
            (writer, rx)
        }
    }

    impl PacketWriter for ChannelWriter {
        async fn write_packet(&mut self, packet: &Packet) -> Result<(), WriteError> {
            if let Some(n) = self.fail_after {
                if n == 0 {
                    return Err("peer connection closed".into());
                }
                self.fail_after = Some(n - 1);
            }
            self.tx.send(packet.clone()).map_err(|e| e.to_string())?;
            Ok(())
        }

        async fn close(&mut self) {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn session(audio_only: bool) -> (mpsc::Sender<Packet>, ViewerSession) {
        let (tx, rx) = mpsc::channel(16);
        let session = ViewerSession::new(
            ViewerId(1),
            StreamId::from("cam1"),
            audio_only,
            rx,
            ViewerLink::new(),
        );
        (tx, session)
    }

    fn packet(n: u64, keyframe: bool) -> Packet {
        let ts = Duration::from_millis(n);
        if keyframe {
            Packet::keyframe(0, ts, Bytes::new())
        } else {
            Packet::new(0, ts, Bytes::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_from_first_keyframe() {
        let (tx, mut session) = session(false);
        let (mut writer, mut written) = ChannelWriter::new();

        for n in 0..5 {
            tx.send(packet(n, false)).await.unwrap();
        }
        tx.send(packet(5, true)).await.unwrap();
        for n in 6..9 {
            tx.send(packet(n, false)).await.unwrap();
        }
        session.link().finish(CloseReason::StreamEnded);
        drop(tx);

        let exit = run_viewer(&mut session, &mut writer, Duration::from_secs(10)).await;
        assert!(matches!(exit, ViewerExit::Closed(CloseReason::StreamEnded)));

        let mut got = Vec::new();
        while let Ok(p) = written.try_recv() {
            got.push(p.timestamp.as_millis() as u64);
        }
        assert_eq!(got, vec![5, 6, 7, 8]);
        assert!(writer.closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_keyframe() {
        let (tx, mut session) = session(false);
        let (mut writer, mut written) = ChannelWriter::new();
        tx.send(packet(0, false)).await.unwrap();

        let started = Instant::now();
        let exit = run_viewer(&mut session, &mut writer, Duration::from_secs(10)).await;

        assert!(exit.is_timeout());
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(written.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_ends_session() {
        let (tx, mut session) = session(true);
        let (mut writer, _written) = ChannelWriter::new();
        writer.fail_after = Some(1);

        tx.send(packet(0, false)).await.unwrap();
        tx.send(packet(1, false)).await.unwrap();

        let exit = run_viewer(&mut session, &mut writer, Duration::from_secs(10)).await;
        assert!(matches!(exit, ViewerExit::WriteFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_task() {
        let (_tx, mut session) = session(false);
        let (mut writer, _written) = ChannelWriter::new();
        let link = session.link();

        let task = tokio::spawn(async move {
            run_viewer(&mut session, &mut writer, Duration::from_secs(10)).await
        });
        link.close(CloseReason::Deregistered);

        let exit = task.await.unwrap();
        assert!(matches!(exit, ViewerExit::Closed(CloseReason::Deregistered)));
    }
}
