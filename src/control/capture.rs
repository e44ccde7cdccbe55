//! Remote Capture
//!
//! Asks the camera board to take a picture and waits for it to confirm.
//!
//! # Handshake
//! 1. Robot sends `TakePicture` with the current sequence number as payload
//! 2. Camera answers with `Done`
//! 3. The radio receive task hands every inbound frame to [`CaptureAck::on_frame`],
//!    which releases the waiting requester on `Done`
//!
//! The acknowledgement carries no sequence number, so any `Done` releases the
//! current wait. A `Done` that arrives while nobody waits is discarded at the
//! start of the next request.
//!
//! # Timeouts
//! With `ack_timeout` at zero the requester waits forever on a single send. A
//! nonzero timeout bounds each attempt and re-sends up to `max_attempts` times.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

use crate::driver::radio::{Frame, FrameSink, LinkError, Opcode, PeerAddress};
use crate::system::event::{self, Events};

/// Acknowledgement shared between the radio receive task and the requester
pub static CAPTURE_ACK: CaptureAck = CaptureAck::new();

/// Radio addressing and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureConfig {
    /// Camera board address
    pub peer_address: PeerAddress,
    /// Our own address, frames for anyone else are dropped
    pub local_address: PeerAddress,
    /// Wait per attempt, zero waits forever
    pub ack_timeout: Duration,
    /// Sends per request when `ack_timeout` is nonzero
    pub max_attempts: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            peer_address: [0x02, 0x00, 0x00, 0x00, 0x00, 0x02],
            local_address: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            ack_timeout: Duration::from_ticks(0),
            max_attempts: 3,
        }
    }
}

impl CaptureConfig {
    /// Is the acknowledgement wait bounded?
    pub fn is_bounded(&self) -> bool {
        self.ack_timeout.as_ticks() > 0
    }
}

/// Why a capture request gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureError {
    /// No `Done` within any of the attempts
    AckTimeout { sequence: u32, attempts: u8 },
}

/// Binary acknowledgement signal
pub struct CaptureAck {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl CaptureAck {
    pub const fn new() -> Self {
        Self { signal: Signal::new() }
    }

    /// Feeds one received frame in. Returns true if it released the signal.
    pub fn on_frame(&self, frame: &Frame) -> bool {
        match frame.opcode {
            Opcode::Done => {
                debug!("Capture done, payload {}", frame.payload);
                self.signal.signal(());
                true
            }
            other => {
                debug!("Ignoring radio opcode {:?}", other);
                false
            }
        }
    }

    /// Is an acknowledgement pending?
    pub fn is_signaled(&self) -> bool {
        self.signal.signaled()
    }

    fn discard_stale(&self) {
        self.signal.reset();
    }

    async fn wait(&self) {
        self.signal.wait().await;
    }
}

impl Default for CaptureAck {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can run the capture round-trip
#[allow(async_fn_in_trait)]
pub trait CaptureTrigger {
    /// Runs one handshake, returning the sequence number that was acknowledged
    async fn request_capture(&mut self) -> Result<u32, CaptureError>;
}

/// Sends capture requests over a frame sink and waits for the acknowledgement
pub struct CaptureRequester<'a, S> {
    sink: S,
    ack: &'a CaptureAck,
    config: CaptureConfig,
    sequence: u32,
}

impl<'a, S: FrameSink> CaptureRequester<'a, S> {
    pub fn new(sink: S, ack: &'a CaptureAck, config: CaptureConfig) -> Self {
        Self {
            sink,
            ack,
            config,
            sequence: 0,
        }
    }

    /// Sequence number the next request will carry
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    async fn send(&mut self, frame: &Frame) {
        match self.sink.send(frame).await {
            Ok(()) => {}
            Err(LinkError::Closed) => warn!("Radio link closed, capture {} not sent", frame.payload),
            Err(LinkError::Io(_)) => warn!("Radio write failed, capture {} not sent", frame.payload),
        }
    }
}

impl<S: FrameSink> CaptureTrigger for CaptureRequester<'_, S> {
    async fn request_capture(&mut self) -> Result<u32, CaptureError> {
        let sequence = self.sequence;
        let frame = Frame::new(self.config.peer_address, Opcode::TakePicture, sequence);

        self.ack.discard_stale();
        info!("Requesting capture {}", sequence);
        event::send(Events::CaptureRequested(sequence));

        if self.config.is_bounded() {
            let attempts = self.config.max_attempts.max(1);
            let mut acknowledged = false;
            for attempt in 1..=attempts {
                self.send(&frame).await;
                if with_timeout(self.config.ack_timeout, self.ack.wait()).await.is_ok() {
                    acknowledged = true;
                    break;
                }
                warn!("Capture {} attempt {}/{} timed out", sequence, attempt, attempts);
            }
            if !acknowledged {
                event::send(Events::CaptureTimedOut(sequence));
                return Err(CaptureError::AckTimeout { sequence, attempts });
            }
        } else {
            self.send(&frame).await;
            self.ack.wait().await;
        }

        self.sequence = sequence.wrapping_add(1);
        info!("Capture {} acknowledged", sequence);
        event::send(Events::CaptureAcknowledged(sequence));
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::radio::tests::Pipe;
    use crate::driver::radio::{FrameWriter, FRAME_LEN};
    use embassy_futures::block_on;
    use embassy_futures::join::join;

    const CAMERA: PeerAddress = [0x02, 0, 0, 0, 0, 0x02];
    const ROBOT: PeerAddress = [0x02, 0, 0, 0, 0, 0x01];

    fn done() -> Frame {
        Frame::new(ROBOT, Opcode::Done, 0)
    }

    fn sent_frames(pipe: &Pipe) -> Vec<Frame> {
        pipe.tx
            .chunks_exact(FRAME_LEN)
            .map(|chunk| {
                let mut bytes = [0u8; FRAME_LEN];
                bytes.copy_from_slice(chunk);
                Frame::decode(&bytes).unwrap()
            })
            .collect()
    }

    fn bounded(timeout_ms: u64, max_attempts: u8) -> CaptureConfig {
        CaptureConfig {
            ack_timeout: Duration::from_millis(timeout_ms),
            max_attempts,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn only_done_releases_the_wait() {
        let ack = CaptureAck::new();

        assert!(!ack.on_frame(&Frame::new(ROBOT, Opcode::TakePicture, 0)));
        assert!(!ack.on_frame(&Frame::new(ROBOT, Opcode::Unknown(0x33), 0)));
        assert!(!ack.is_signaled());

        assert!(ack.on_frame(&done()));
        assert!(ack.is_signaled());
    }

    #[test]
    fn request_sends_one_frame_and_waits_for_done() {
        let ack = CaptureAck::new();
        let mut requester = CaptureRequester::new(FrameWriter::new(Pipe::default()), &ack, CaptureConfig::default());

        let (result, _) = block_on(join(requester.request_capture(), async {
            ack.on_frame(&done());
        }));

        assert_eq!(result, Ok(0));
        assert_eq!(requester.sequence(), 1);
        assert!(!ack.is_signaled());
    }

    #[test]
    fn sequence_counts_up_per_acknowledged_request() {
        let ack = CaptureAck::new();
        let mut pipe = Pipe::default();
        {
            let mut requester = CaptureRequester::new(FrameWriter::new(&mut pipe), &ack, CaptureConfig::default());
            for expected in 0..3 {
                let (result, _) = block_on(join(requester.request_capture(), async {
                    ack.on_frame(&done());
                }));
                assert_eq!(result, Ok(expected));
            }
        }

        let frames = sent_frames(&pipe);
        assert_eq!(frames.len(), 3);
        for (sequence, frame) in frames.iter().enumerate() {
            assert_eq!(frame.dest, CAMERA);
            assert_eq!(frame.opcode, Opcode::TakePicture);
            assert_eq!(frame.payload, sequence as u32);
        }
    }

    #[test]
    fn stale_done_is_discarded() {
        let ack = CaptureAck::new();
        ack.on_frame(&done());
        let mut requester = CaptureRequester::new(FrameWriter::new(Pipe::default()), &ack, bounded(5, 1));

        let result = block_on(requester.request_capture());

        assert_eq!(result, Err(CaptureError::AckTimeout { sequence: 0, attempts: 1 }));
    }

    #[test]
    fn bounded_wait_retries_then_gives_up() {
        let ack = CaptureAck::new();
        let mut pipe = Pipe::default();
        {
            let mut requester = CaptureRequester::new(FrameWriter::new(&mut pipe), &ack, bounded(5, 3));

            let result = block_on(requester.request_capture());

            assert_eq!(result, Err(CaptureError::AckTimeout { sequence: 0, attempts: 3 }));
            assert_eq!(requester.sequence(), 0);
        }

        let frames = sent_frames(&pipe);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|frame| frame.payload == 0));
    }

    #[test]
    fn bounded_wait_accepts_timely_done() {
        let ack = CaptureAck::new();
        let mut requester = CaptureRequester::new(FrameWriter::new(Pipe::default()), &ack, bounded(1_000, 3));

        let (result, _) = block_on(join(requester.request_capture(), async {
            ack.on_frame(&done());
        }));

        assert_eq!(result, Ok(0));
        assert_eq!(requester.sequence(), 1);
    }
}
