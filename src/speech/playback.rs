//! Single-slot playback controller.
//!
//! At most one playback is live. Every request takes a [`Ticket`] from
//! [`PlaybackController::issue`], which also stops whatever is playing. A
//! ticket that is no longer the latest when its audio is ready gets
//! discarded, so a slow fetch can never talk over a newer request.
//!
//! Completion callbacks fire at most once, and never for playback that was
//! superseded or explicitly stopped.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::mixer::Mixer;
use rodio::{OutputStreamBuilder, Sink};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pcm::DecodedAudio;
use crate::error::SpeechError;

pub type OnComplete = Box<dyn FnOnce() + Send + 'static>;

/// Audio device seam.
pub trait AudioOutput: Send + Sync {
    /// Begin playing `audio` immediately.
    fn play(&self, audio: &DecodedAudio) -> Result<Box<dyn ActivePlayback>, SpeechError>;
}

/// One in-flight playback as seen by the device.
pub trait ActivePlayback: Send + Sync {
    fn is_finished(&self) -> bool;
    fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Playing,
    /// A newer request (or an explicit stop) came in first. Callback dropped.
    Superseded,
    /// The device refused the buffer. Callback already fired.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(Ticket),
}

struct ActiveSlot {
    ticket: Ticket,
    handle: Arc<dyn ActivePlayback>,
    on_complete: Option<OnComplete>,
    watcher: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    latest: u64,
    active: Option<ActiveSlot>,
}

pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    shared: Arc<Mutex<Shared>>,
    poll_interval: Duration,
}

impl PlaybackController {
    pub fn new(output: Arc<dyn AudioOutput>, poll_interval: Duration) -> Self {
        Self {
            output,
            shared: Arc::new(Mutex::new(Shared::default())),
            poll_interval,
        }
    }

    /// Stop the current playback and hand out the next ticket.
    pub fn issue(&self) -> Ticket {
        let mut shared = self.shared.lock().unwrap();
        release(shared.active.take(), "superseded");
        shared.latest += 1;
        Ticket(shared.latest)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.shared.lock().unwrap().latest == ticket.0
    }

    /// Play `audio` for `ticket` if it is still the latest.
    ///
    /// Must be called from within a tokio runtime (completion is watched by a
    /// spawned task).
    pub fn start(
        &self,
        ticket: Ticket,
        audio: &DecodedAudio,
        on_complete: Option<OnComplete>,
    ) -> StartOutcome {
        let mut shared = self.shared.lock().unwrap();
        if shared.latest != ticket.0 {
            debug!("Discarding stale playback {ticket:?} (latest is {})", shared.latest);
            return StartOutcome::Superseded;
        }
        release(shared.active.take(), "replaced");

        let handle: Arc<dyn ActivePlayback> = match self.output.play(audio) {
            Ok(h) => Arc::from(h),
            Err(e) => {
                drop(shared);
                warn!("Could not start playback: {e}");
                fire(on_complete);
                return StartOutcome::Failed;
            }
        };

        let watcher = tokio::spawn(watch_completion(
            self.shared.clone(),
            ticket,
            handle.clone(),
            self.poll_interval,
        ));

        debug!(
            "Playing {ticket:?}: {:.2}s of audio",
            audio.duration().as_secs_f64()
        );
        shared.active = Some(ActiveSlot {
            ticket,
            handle,
            on_complete,
            watcher,
        });
        StartOutcome::Playing
    }

    /// `issue` + `start` in one step, for callers that already hold the audio.
    pub fn play(&self, audio: &DecodedAudio, on_complete: Option<OnComplete>) -> StartOutcome {
        let ticket = self.issue();
        self.start(ticket, audio, on_complete)
    }

    /// Complete a request that produced no audio. Fires the callback only if
    /// the ticket is still current.
    pub fn finish_silent(&self, ticket: Ticket, on_complete: Option<OnComplete>) -> bool {
        if self.is_current(ticket) {
            fire(on_complete);
            true
        } else {
            false
        }
    }

    /// Stop playback without firing its callback. Requests still resolving
    /// stay silent too.
    pub fn stop(&self) {
        let mut shared = self.shared.lock().unwrap();
        release(shared.active.take(), "stopped");
        shared.latest += 1;
    }

    pub fn state(&self) -> PlaybackState {
        match &self.shared.lock().unwrap().active {
            Some(slot) => PlaybackState::Playing(slot.ticket),
            None => PlaybackState::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state(), PlaybackState::Playing(_))
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.lock() {
            release(shared.active.take(), "controller dropped");
        }
    }
}

fn fire(on_complete: Option<OnComplete>) {
    if let Some(callback) = on_complete {
        callback();
    }
}

/// Stop a slot's audio and watcher. Its callback is dropped unfired.
fn release(slot: Option<ActiveSlot>, reason: &str) {
    if let Some(slot) = slot {
        slot.handle.stop();
        slot.watcher.abort();
        debug!("Playback {:?} {reason}", slot.ticket);
    }
}

async fn watch_completion(
    shared: Arc<Mutex<Shared>>,
    ticket: Ticket,
    handle: Arc<dyn ActivePlayback>,
    poll_interval: Duration,
) {
    loop {
        tokio::time::sleep(poll_interval).await;
        if !handle.is_finished() {
            continue;
        }

        let callback = {
            let mut guard = shared.lock().unwrap();
            match guard.active.as_ref() {
                Some(slot) if slot.ticket == ticket => {}
                // Superseded or stopped while we slept.
                _ => return,
            }
            guard.active.take().and_then(|slot| slot.on_complete)
        };

        debug!("Playback {ticket:?} finished");
        fire(callback);
        return;
    }
}

// --- rodio backend ---

/// Default output device via rodio.
///
/// The `OutputStream` lives on its own thread for the lifetime of this value;
/// playback goes through a cloned mixer handle.
pub struct RodioOutput {
    mixer: Mixer,
    _keepalive: std_mpsc::Sender<()>,
}

impl RodioOutput {
    pub fn open() -> Result<Self, SpeechError> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<Mixer, String>>();
        let (keep_tx, keep_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || match OutputStreamBuilder::open_default_stream() {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(stream.mixer().clone()));
                    // Blocks until the RodioOutput (and its sender) is dropped.
                    let _ = keep_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| SpeechError::Playback(format!("failed to spawn audio thread: {e}")))?;

        let mixer = ready_rx
            .recv()
            .map_err(|_| SpeechError::Playback("audio thread exited early".into()))?
            .map_err(|e| SpeechError::Playback(format!("failed to open audio output: {e}")))?;

        info!("Audio output ready");
        Ok(Self {
            mixer,
            _keepalive: keep_tx,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, audio: &DecodedAudio) -> Result<Box<dyn ActivePlayback>, SpeechError> {
        if audio.frames() == 0 {
            return Err(SpeechError::Playback("empty buffer".into()));
        }
        let sink = Sink::connect_new(&self.mixer);
        sink.append(SamplesBuffer::new(
            audio.num_channels(),
            audio.sample_rate(),
            audio.interleaved(),
        ));
        Ok(Box::new(RodioPlayback {
            sink: Mutex::new(sink),
        }))
    }
}

struct RodioPlayback {
    sink: Mutex<Sink>,
}

impl ActivePlayback for RodioPlayback {
    fn is_finished(&self) -> bool {
        self.sink.lock().unwrap().empty()
    }

    fn stop(&self) {
        self.sink.lock().unwrap().stop();
    }
}
