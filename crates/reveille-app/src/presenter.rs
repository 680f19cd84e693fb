//! Console presenter: the stand-in for the platform ring screen.
//!
//! Consumes delivery events, keeps at most one active playback session and
//! writes every event as a JSON line. A new `Ringing` event replaces the
//! session that is currently playing.

use reveille_core::config::PresentationConfig;
use reveille_core::events::AlarmEvent;
use reveille_core::types::AlarmId;
use serde::Serialize;
use std::io::{self, Write};
use tokio::sync::mpsc::UnboundedReceiver;

/// Vibration requested for a ringing alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VibrationPattern {
    pub timings_ms: Vec<u64>,
    pub repeat: bool,
}

/// What is on screen (and playing) for the ringing alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackSession {
    pub id: AlarmId,
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibration: Option<VibrationPattern>,
}

#[derive(Serialize)]
struct EventLine<'a> {
    #[serde(flatten)]
    event: &'a AlarmEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a PlaybackSession>,
}

pub struct ConsolePresenter<W: Write> {
    out: W,
    config: PresentationConfig,
    active: Option<PlaybackSession>,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, config: PresentationConfig) -> Self {
        Self {
            out,
            config,
            active: None,
        }
    }

    /// The session currently ringing, if any.
    pub fn active(&self) -> Option<&PlaybackSession> {
        self.active.as_ref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Apply one event and write it out.
    pub fn present(&mut self, event: &AlarmEvent) -> io::Result<()> {
        match event {
            AlarmEvent::Ringing {
                id,
                vibration_enabled,
            } => {
                if let Some(previous) = self.active.take() {
                    tracing::info!(
                        previous = %previous.id,
                        alarm_id = %id,
                        "Replacing active ring session"
                    );
                }
                self.active = Some(self.session_for(*id, *vibration_enabled));
            }
            AlarmEvent::Stopped { id } | AlarmEvent::SnoozeScheduled { id, .. } => {
                if self.active.as_ref().is_some_and(|s| s.id == *id) {
                    self.active = None;
                    tracing::debug!(alarm_id = %id, "Ring session released");
                }
            }
        }

        let session = match event {
            AlarmEvent::Ringing { .. } => self.active.as_ref(),
            _ => None,
        };
        // One write per line so result lines from stdio never land mid-event.
        let mut line = serde_json::to_vec(&EventLine { event, session })?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.out.flush()
    }

    /// Present events until the channel closes.
    pub async fn run(mut self, mut events: UnboundedReceiver<AlarmEvent>) -> W {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.present(&event) {
                tracing::warn!(alarm_id = %event.id(), error = %e, "Failed to present event");
            }
        }
        if let Some(session) = self.active.take() {
            tracing::info!(alarm_id = %session.id, "Event stream closed, ring session dropped");
        }
        self.out
    }

    fn session_for(&self, id: AlarmId, vibration_enabled: bool) -> PlaybackSession {
        let vibration = vibration_enabled.then(|| VibrationPattern {
            timings_ms: self.config.vibration_pattern_ms.clone(),
            repeat: self.config.vibration_repeat,
        });
        PlaybackSession {
            id,
            title: self.config.ring_title.clone(),
            text: self.config.ring_text.clone(),
            vibration,
        }
    }
}
