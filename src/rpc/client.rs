//! Backend communication client.
//!
//! Sits between the state machine and the session manager. It turns sealed
//! windows into `status` / `get-mode` frames, decodes replies, and collects
//! remote commands from the command channel. It never touches device state:
//! everything it learns is queued for the state machine to pick up.
//!
//! ## Backpressure
//!
//! Uploads are drop-and-replace. When the outbound path is busy the framed
//! upload waits in a single pending slot; a newer window overwrites it.
//! When the session is down the window is dropped outright.

use heapless::Deque;
use log::{debug, info, warn};

use super::codec::{FrameDecoder, frame_to_vec};
use super::messages::{
    BackendEvent, BackendRequest, UploadAck, ack_for, decode_reply, encode_request, parse_command,
};
use super::transport::CommandPort;
use crate::app::commands::{InferenceReply, RemoteCommand};
use crate::app::ports::{BackendPort, ConnectivityStatus, InferenceTicket, SessionPort, UploadOutcome};
use crate::error::CommsError;
use crate::fsm::Mode;
use crate::sensors::window::SensorWindow;

const REPLY_DEPTH: usize = 4;
const COMMAND_DEPTH: usize = 4;
const RX_BUF: usize = 256;

/// Counters surfaced on the status page and in logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub uploads_sent: u32,
    pub uploads_replaced: u32,
    pub uploads_dropped: u32,
    /// Last `count` the backend reported for its training set.
    pub backend_count: Option<u32>,
    pub inferences: u32,
    pub commands_rejected: u32,
}

pub struct BackendClient<S: SessionPort, C: CommandPort> {
    session: S,
    commands: C,
    decoder: FrameDecoder,
    pending_upload: Option<Vec<u8>>,
    next_request: u32,
    outstanding: Option<u32>,
    replies: Deque<InferenceReply, REPLY_DEPTH>,
    remote: Deque<RemoteCommand, COMMAND_DEPTH>,
    stats: ClientStats,
}

impl<S: SessionPort, C: CommandPort> BackendClient<S, C> {
    pub fn new(session: S, commands: C) -> Self {
        Self {
            session,
            commands,
            decoder: FrameDecoder::new(),
            pending_upload: None,
            next_request: 1,
            outstanding: None,
            replies: Deque::new(),
            remote: Deque::new(),
            stats: ClientStats::default(),
        }
    }

    /// Keep a standing command listener open whenever the link is up. The
    /// socket task reopens it by itself after a reconnect.
    pub fn listen_for_commands(&mut self) {
        self.commands.set_listening(true);
    }

    /// Network tick: advance the session, flush the pending upload, and
    /// drain whatever arrived. Returns the new connectivity status when it
    /// changed.
    pub fn poll(&mut self, now_ms: u64) -> Option<ConnectivityStatus> {
        let change = self.session.poll(now_ms);
        if let Some(status) = change {
            if status.is_connected() {
                self.decoder.reset();
            } else {
                if self.pending_upload.take().is_some() {
                    self.stats.uploads_dropped += 1;
                    debug!("BACKEND: pending upload dropped, link down");
                }
                self.outstanding = None;
            }
        }

        self.flush_pending();
        self.drain_replies();
        self.drain_commands();
        change
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Id of the inference request still waiting for its reply.
    pub fn awaiting_inference(&self) -> Option<u32> {
        self.outstanding
    }

    pub fn has_pending_upload(&self) -> bool {
        self.pending_upload.is_some()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    fn flush_pending(&mut self) {
        let Some(frame) = self.pending_upload.take() else {
            return;
        };
        match self.session.send(&frame) {
            Ok(()) => self.stats.uploads_sent += 1,
            Err(CommsError::Busy) => self.pending_upload = Some(frame),
            Err(e) => {
                self.stats.uploads_dropped += 1;
                debug!("BACKEND: pending upload dropped: {}", e);
            }
        }
    }

    fn drain_replies(&mut self) {
        let mut buf = [0u8; RX_BUF];
        loop {
            let n = match self.session.receive(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let mut data = &buf[..n];
            while !data.is_empty() {
                let (used, frame) = self.decoder.feed(data);
                data = &data[used..];
                if let Some(payload) = frame {
                    let event = decode_reply(payload);
                    self.on_reply(event);
                }
            }
        }
    }

    fn on_reply(&mut self, event: Result<BackendEvent, CommsError>) {
        match event {
            Ok(BackendEvent::Upload(UploadAck::Accepted { count })) => {
                self.stats.backend_count = count.or(self.stats.backend_count);
            }
            Ok(BackendEvent::Upload(UploadAck::Rejected(reason))) => {
                warn!("BACKEND: upload rejected: {}", reason);
            }
            Ok(BackendEvent::Inference(reply)) => {
                if self.outstanding == Some(reply.request) {
                    self.outstanding = None;
                }
                if self.replies.is_full() {
                    self.replies.pop_front();
                }
                let _ = self.replies.push_back(reply);
            }
            Err(e) => warn!("BACKEND: undecodable reply: {}", e),
        }
    }

    /// Lines stay in the command channel while the queue is full, so
    /// nothing is acked that will not reach the state machine.
    fn drain_commands(&mut self) {
        while !self.remote.is_full() {
            let Some(inbound) = self.commands.next_line() else {
                break;
            };
            let parsed = parse_command(&inbound.line);
            let ack = ack_for(&parsed);
            if let Err(e) = self.commands.reply(inbound.conn, &ack) {
                warn!("CMD[{}]: ack not sent: {}", inbound.conn, e);
            }
            match parsed {
                Ok(cmd) => {
                    info!("CMD[{}]: {} seq={}", inbound.conn, cmd.mode, cmd.sequence);
                    let _ = self.remote.push_back(cmd);
                }
                Err(e) => {
                    self.stats.commands_rejected += 1;
                    debug!("CMD[{}]: rejected: {}", inbound.conn, e);
                }
            }
        }
    }

    fn allocate_request(&mut self) -> u32 {
        let id = self.next_request;
        self.next_request = self.next_request.wrapping_add(1).max(1);
        id
    }
}

impl<S: SessionPort, C: CommandPort> BackendPort for BackendClient<S, C> {
    fn status(&self) -> ConnectivityStatus {
        self.session.status()
    }

    fn upload(&mut self, window: &SensorWindow, mode: Mode) -> UploadOutcome {
        if !self.session.status().is_connected() {
            self.stats.uploads_dropped += 1;
            return UploadOutcome::Dropped;
        }
        let req = BackendRequest::Status {
            mode: mode.label(),
            data: window.rows(),
        };
        let Some(frame) = encode_request(&req).ok().and_then(|body| frame_to_vec(&body)) else {
            warn!("BACKEND: window {} does not fit a frame", window.sequence());
            self.stats.uploads_dropped += 1;
            return UploadOutcome::Dropped;
        };

        let replaced = self.pending_upload.take().is_some();
        if replaced {
            self.stats.uploads_replaced += 1;
        }
        match self.session.send(&frame) {
            Ok(()) => {
                self.stats.uploads_sent += 1;
                UploadOutcome::Sent
            }
            Err(CommsError::Busy) => {
                self.pending_upload = Some(frame);
                UploadOutcome::Pending { replaced }
            }
            Err(_) => {
                self.stats.uploads_dropped += 1;
                UploadOutcome::Dropped
            }
        }
    }

    fn infer(&mut self, window: &SensorWindow) -> InferenceTicket {
        if !self.session.status().is_connected() {
            return InferenceTicket::NoModel;
        }
        let id = self.allocate_request();
        let req = BackendRequest::GetMode {
            id,
            data: window.rows(),
        };
        let Some(frame) = encode_request(&req).ok().and_then(|body| frame_to_vec(&body)) else {
            return InferenceTicket::NoModel;
        };
        match self.session.send(&frame) {
            Ok(()) => {
                self.stats.inferences += 1;
                self.outstanding = Some(id);
                InferenceTicket::Pending(id)
            }
            Err(e) => {
                debug!("BACKEND: inference not sent: {}", e);
                InferenceTicket::NoModel
            }
        }
    }

    fn poll_inference(&mut self) -> Option<InferenceReply> {
        self.replies.pop_front()
    }

    fn poll_command(&mut self) -> Option<RemoteCommand> {
        self.remote.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::commands::InferenceResult;
    use crate::rpc::channels::InboundCommand;
    use crate::rpc::codec::encode_frame;
    use crate::sensors::window::{CHANNELS, WINDOW_LEN};
    use std::collections::VecDeque;

    struct FakeSession {
        status: ConnectivityStatus,
        busy: bool,
        sent: Vec<Vec<u8>>,
        rx: VecDeque<u8>,
        next: Option<ConnectivityStatus>,
    }

    impl FakeSession {
        fn up() -> Self {
            Self {
                status: ConnectivityStatus::Connected,
                busy: false,
                sent: Vec::new(),
                rx: VecDeque::new(),
                next: None,
            }
        }

        fn push_reply(&mut self, json: &str) {
            let mut buf = [0u8; 512];
            let n = encode_frame(json.as_bytes(), &mut buf).unwrap();
            self.rx.extend(&buf[..n]);
        }
    }

    impl SessionPort for FakeSession {
        fn status(&self) -> ConnectivityStatus {
            self.status
        }

        fn poll(&mut self, _now_ms: u64) -> Option<ConnectivityStatus> {
            let next = self.next.take()?;
            self.status = next;
            Some(next)
        }

        fn send(&mut self, bytes: &[u8]) -> Result<(), CommsError> {
            if !self.status.is_connected() {
                return Err(CommsError::Unavailable);
            }
            if self.busy {
                return Err(CommsError::Busy);
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, CommsError> {
            let n = buf.len().min(self.rx.len()).min(7);
            for b in buf.iter_mut().take(n) {
                *b = self.rx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    #[derive(Default)]
    struct FakeCommands {
        listening: bool,
        lines: VecDeque<InboundCommand>,
        acks: Vec<(u32, String)>,
    }

    impl FakeCommands {
        fn push(&mut self, conn: u32, line: &str) {
            self.lines.push_back(InboundCommand {
                conn,
                line: heapless::Vec::from_slice(line.as_bytes()).unwrap(),
            });
        }
    }

    impl CommandPort for FakeCommands {
        fn set_listening(&mut self, on: bool) {
            self.listening = on;
        }

        fn next_line(&mut self) -> Option<InboundCommand> {
            self.lines.pop_front()
        }

        fn reply(&mut self, conn: u32, text: &str) -> Result<(), CommsError> {
            self.acks.push((conn, text.to_string()));
            Ok(())
        }
    }

    fn window() -> SensorWindow {
        SensorWindow::from_rows(1, [[0.5; CHANNELS]; WINDOW_LEN])
    }

    fn client(session: FakeSession) -> BackendClient<FakeSession, FakeCommands> {
        BackendClient::new(session, FakeCommands::default())
    }

    #[test]
    fn upload_while_down_is_dropped() {
        let mut s = FakeSession::up();
        s.status = ConnectivityStatus::Degraded(2);
        let mut c = client(s);
        assert_eq!(c.upload(&window(), Mode::Study), UploadOutcome::Dropped);
        assert!(!c.has_pending_upload());
        assert_eq!(c.stats().uploads_dropped, 1);
    }

    #[test]
    fn busy_upload_is_replaced_by_newer_window() {
        let mut s = FakeSession::up();
        s.busy = true;
        let mut c = client(s);
        assert_eq!(
            c.upload(&window(), Mode::Study),
            UploadOutcome::Pending { replaced: false }
        );
        assert_eq!(
            c.upload(&window(), Mode::Relax),
            UploadOutcome::Pending { replaced: true }
        );
        c.session_mut().busy = false;
        c.poll(0);
        assert!(!c.has_pending_upload());
        let sent = &c.session().sent;
        assert_eq!(sent.len(), 1);
        let body = core::str::from_utf8(&sent[0][4..]).unwrap();
        assert!(body.contains("\"RELAX\""));
    }

    #[test]
    fn pending_upload_dropped_on_link_loss() {
        let mut s = FakeSession::up();
        s.busy = true;
        let mut c = client(s);
        c.upload(&window(), Mode::Study);
        c.session_mut().next = Some(ConnectivityStatus::Degraded(0));
        c.poll(0);
        assert!(!c.has_pending_upload());
        assert_eq!(c.stats().uploads_dropped, 1);
    }

    #[test]
    fn infer_without_link_is_no_model() {
        let mut s = FakeSession::up();
        s.status = ConnectivityStatus::AwaitingCredentials;
        let mut c = client(s);
        assert_eq!(c.infer(&window()), InferenceTicket::NoModel);
    }

    #[test]
    fn inference_reply_is_matched_by_id() {
        let mut c = client(FakeSession::up());
        let InferenceTicket::Pending(id) = c.infer(&window()) else {
            panic!("expected pending ticket");
        };
        c.session_mut()
            .push_reply(&format!(r#"{{"route":"get-mode","id":{id},"mode":"sleep"}}"#));
        c.poll(0);
        assert_eq!(
            c.poll_inference(),
            Some(InferenceReply {
                request: id,
                result: InferenceResult::Mode(Mode::Sleep)
            })
        );
        assert_eq!(c.poll_inference(), None);
    }

    #[test]
    fn upload_reply_updates_count() {
        let mut c = client(FakeSession::up());
        c.session_mut()
            .push_reply(r#"{"route":"status","message":"ok","count":12}"#);
        c.poll(0);
        assert_eq!(c.stats().backend_count, Some(12));
    }

    #[test]
    fn commands_are_acked_and_queued() {
        let mut c = client(FakeSession::up());
        c.listen_for_commands();
        c.commands.push(1, r#"{"mode":"relax","transcription":"wind down","sequence":3}"#);
        c.commands.push(2, r#"{"mode":"party"}"#);
        c.poll(0);
        assert!(c.commands.listening);
        assert_eq!(
            c.commands.acks,
            vec![(1, "received:RELAX".to_string()), (2, "error".to_string())]
        );
        let cmd = c.poll_command().unwrap();
        assert_eq!(cmd.mode, Mode::Relax);
        assert_eq!(cmd.sequence, 3);
        assert_eq!(c.poll_command(), None);
        assert_eq!(c.stats().commands_rejected, 1);
    }

    #[test]
    fn full_command_queue_leaves_lines_unacked() {
        let mut c = client(FakeSession::up());
        for seq in 1..=6 {
            c.commands.push(
                seq,
                &format!(r#"{{"mode":"study","transcription":"","sequence":{seq}}}"#),
            );
        }
        c.poll(0);
        assert_eq!(c.commands.acks.len(), COMMAND_DEPTH);
        assert_eq!(c.commands.lines.len(), 6 - COMMAND_DEPTH);

        let first = c.poll_command().unwrap();
        assert_eq!(first.sequence, 1);
        while c.poll_command().is_some() {}

        c.poll(0);
        assert_eq!(c.commands.acks.len(), 6);
        assert!(c.commands.lines.is_empty());
        let seqs: Vec<u64> = core::iter::from_fn(|| c.poll_command())
            .map(|cmd| cmd.sequence)
            .collect();
        assert_eq!(seqs, vec![5, 6]);
    }
}
