use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::capture::observer::{AudioCaptureObserver, CaptureSettings};
use crate::models::config::TalkServerConfig;
use crate::models::error::TalkError;
use crate::models::state::{SessionState, TalkStatus};
use crate::models::stats::{TalkParams, TalkStats};
use crate::processing::pending_queue::PendingQueue;
use crate::session::task::TaskHandle;
use crate::traits::host_output::HostOutput;
use crate::traits::talk_interface::TalkInterface;

/// One synthesis request: what to say, how, and where to stream it.
pub struct TalkRequest {
    pub params: TalkParams,
    pub text: String,
    pub destination: Box<dyn Write + Send>,
}

impl TalkRequest {
    pub fn new(params: TalkParams, text: impl Into<String>, destination: Box<dyn Write + Send>) -> Self {
        Self {
            params,
            text: text.into(),
            destination,
        }
    }
}

/// What the drain task wrote, excluding the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainSummary {
    pub chunks: usize,
    pub bytes: u64,
}

/// Result of [`TalkServer::on_talk`].
///
/// `task` completes once the sentinel has been written to the destination.
#[derive(Debug)]
pub struct TalkOutcome {
    pub status: TalkStatus,
    pub task: Option<TaskHandle<DrainSummary>>,
}

impl TalkOutcome {
    fn failed() -> Self {
        Self {
            status: TalkStatus::Failed,
            task: None,
        }
    }
}

struct ActiveRequest {
    engine_wait: TaskHandle<()>,
    drain: TaskHandle<DrainSummary>,
}

/// Streams a voice engine's synthesized audio to a byte sink while it plays.
///
/// Data flow:
/// ```text
/// [host buffer unlock] → [AudioCaptureObserver] → [PendingQueue] → [talk-drain] → destination
///                                                       ↑
///                        [talk-engine-wait] ── sentinel ┘
/// ```
///
/// At most one request is in flight: [`on_talk`](Self::on_talk) blocks until
/// the previous request's engine-wait and drain tasks have both finished.
pub struct TalkServer {
    engine: Arc<dyn TalkInterface>,
    output: Arc<dyn HostOutput>,
    queue: Arc<PendingQueue>,
    capture: Arc<AudioCaptureObserver>,
    config: TalkServerConfig,
    talk_lock: Mutex<()>,
    active: Mutex<Option<ActiveRequest>>,
}

impl TalkServer {
    pub fn new(
        engine: Arc<dyn TalkInterface>,
        output: Arc<dyn HostOutput>,
        config: TalkServerConfig,
    ) -> Result<Self, TalkError> {
        config.validate().map_err(TalkError::Configuration)?;

        // closed until the first request; nothing is captured while idle
        let queue = Arc::new(PendingQueue::closed());
        let capture = Arc::new(AudioCaptureObserver::new(Arc::clone(&queue)));

        Ok(Self {
            engine,
            output,
            queue,
            capture,
            config,
            talk_lock: Mutex::new(()),
            active: Mutex::new(None),
        })
    }

    /// The observer to register on the host's buffer unlock call.
    pub fn capture_observer(&self) -> Arc<AudioCaptureObserver> {
        Arc::clone(&self.capture)
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub fn config(&self) -> &TalkServerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        match self.active.lock().as_ref() {
            Some(active) if !active.engine_wait.is_finished() => SessionState::Synthesizing,
            Some(active) if !active.drain.is_finished() => SessionState::Draining,
            _ => SessionState::Idle,
        }
    }

    pub fn is_talking(&self) -> bool {
        !self.state().is_idle()
    }

    /// Block until the current request, if any, has fully finished.
    pub fn join(&self) {
        let handles = self
            .active
            .lock()
            .as_ref()
            .map(|a| (a.engine_wait.clone(), a.drain.clone()));
        let Some((engine_wait, drain)) = handles else {
            return;
        };

        if let Err(e) = engine_wait.wait() {
            log::warn!("engine-wait task failed: {}", e);
        }
        match drain.wait() {
            Ok(summary) => log::debug!(
                "previous request drained: {} chunks, {} bytes",
                summary.chunks,
                summary.bytes
            ),
            Err(e) => log::warn!("previous request did not drain: {}", e),
        }
    }

    /// Start synthesis of `request` and stream its audio to the request's
    /// destination.
    ///
    /// Returns as soon as both background tasks are running. Completion is
    /// observed through the returned drain task.
    pub fn on_talk(&self, request: TalkRequest) -> TalkOutcome {
        let _serial = self.talk_lock.lock();
        self.join();

        let TalkRequest {
            params,
            text,
            destination,
        } = request;
        let mute = params.mute;

        self.capture.set_settings(CaptureSettings {
            force_mono: params.force_mono,
        });
        self.queue.reopen();
        if mute {
            self.output.set_muted(true);
        }

        if params.has_voice_fields() {
            let mut merged = self.engine.params();
            merged.apply(&params);
            if !self.engine.set_params(&merged) {
                log::warn!("voice engine did not accept all parameters");
            }
        }
        if !self.engine.set_text(&text) {
            log::warn!("voice engine did not accept text ({} chars)", text.chars().count());
        }
        if !self.engine.talk() {
            log::error!("{}", TalkError::EngineRejected("talk"));
            self.abandon(mute);
            return TalkOutcome::failed();
        }
        log::info!("talk started ({} chars, mute={}, force_mono={})", text.chars().count(), mute, params.force_mono);

        let engine_wait = {
            let engine = Arc::clone(&self.engine);
            let output = Arc::clone(&self.output);
            let queue = Arc::clone(&self.queue);
            TaskHandle::spawn("talk-engine-wait", move || {
                engine.wait();
                if mute {
                    output.set_muted(false);
                }
                if queue.close_with_sentinel() {
                    log::debug!("synthesis finished; sentinel queued");
                } else {
                    log::debug!("synthesis finished after stream was already terminated");
                }
                Ok(())
            })
        };
        let engine_wait = match engine_wait {
            Ok(task) => task,
            Err(e) => {
                log::error!("{}", e);
                self.engine.stop();
                self.abandon(mute);
                return TalkOutcome::failed();
            }
        };

        let drain = {
            let queue = Arc::clone(&self.queue);
            let interval = self.config.drain_interval;
            let mut destination = destination;
            TaskHandle::spawn("talk-drain", move || {
                drain_to(&queue, destination.as_mut(), interval).map_err(|e| {
                    log::error!("streaming aborted: {}", e);
                    e
                })
            })
        };
        let drain = match drain {
            Ok(task) => task,
            Err(e) => {
                log::error!("{}", e);
                self.engine.stop();
                self.queue.close();
                engine_wait.join();
                return TalkOutcome::failed();
            }
        };

        *self.active.lock() = Some(ActiveRequest {
            engine_wait,
            drain: drain.clone(),
        });

        TalkOutcome {
            status: TalkStatus::Succeeded,
            task: Some(drain),
        }
    }

    /// Ask the engine to stop the current synthesis.
    pub fn on_stop(&self) -> TalkStatus {
        let acknowledged = self.engine.stop();
        if !acknowledged {
            log::warn!("{}", TalkError::EngineRejected("stop"));
        } else if self.config.sentinel_on_stop && self.queue.close_with_sentinel() {
            log::debug!("stop acknowledged; sentinel queued");
        }
        TalkStatus::from_ack(acknowledged)
    }

    pub fn on_stats(&self) -> TalkStats {
        TalkStats {
            params: self.engine.params(),
            casts: self.engine.casts(),
            host: self.engine.client_name(),
            plugin_version: self.engine.plugin_version(),
            protocol_version: self.engine.protocol_version(),
        }
    }

    fn abandon(&self, muted: bool) {
        if muted {
            self.output.set_muted(false);
        }
        self.queue.close();
    }
}

/// Write queued chunks to `destination` in order until the sentinel has been
/// written.
fn drain_to(queue: &PendingQueue, destination: &mut dyn Write, interval: Duration) -> Result<DrainSummary, TalkError> {
    let mut summary = DrainSummary::default();
    loop {
        let batch = queue.wait_take_all(interval);
        for chunk in &batch {
            chunk.serialize(destination)?;
            if chunk.is_sentinel() {
                destination.flush()?;
                log::debug!("stream complete: {} chunks, {} bytes", summary.chunks, summary.bytes);
                return Ok(summary);
            }
            summary.chunks += 1;
            summary.bytes += chunk.byte_len() as u64;
        }
        if !batch.is_empty() {
            destination.flush()?;
        }
    }
}
