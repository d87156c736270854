//! Alarm tone playback.
//!
//! The [`SoundPlayer`] is the single audio channel of the process. It is
//! owned by [`crate::lifecycle::AlarmLifecycle`] and only the lifecycle can
//! start or stop it; everything else gets read-only queries.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Available alarm tones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundId {
    #[default]
    Classic,
    Digital,
    Chimes,
    Birds,
    Radar,
    Siren,
}

impl SoundId {
    pub const ALL: [SoundId; 6] = [
        SoundId::Classic,
        SoundId::Digital,
        SoundId::Chimes,
        SoundId::Birds,
        SoundId::Radar,
        SoundId::Siren,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoundId::Classic => "classic",
            SoundId::Digital => "digital",
            SoundId::Chimes => "chimes",
            SoundId::Birds => "birds",
            SoundId::Radar => "radar",
            SoundId::Siren => "siren",
        }
    }

    /// Bundled resource file the platform backend should load.
    pub fn resource(&self) -> &'static str {
        match self {
            SoundId::Classic => "sounds/classic.mp3",
            SoundId::Digital => "sounds/digital.mp3",
            SoundId::Chimes => "sounds/chimes.mp3",
            SoundId::Birds => "sounds/birds.mp3",
            SoundId::Radar => "sounds/radar.mp3",
            SoundId::Siren => "sounds/siren.mp3",
        }
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SoundId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| format!("unknown sound '{s}'"))
    }
}

/// Playback failures. Reported and logged, never fatal to a transition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoundError {
    #[error("Sound resource missing: {0}")]
    MissingResource(String),

    #[error("Audio device unavailable: {0}")]
    Device(String),
}

/// Platform audio seam.
pub trait AudioBackend: Send {
    /// Begin looping `sound` at `volume` (0.0..=1.0).
    fn play(&mut self, sound: SoundId, volume: f32) -> Result<(), SoundError>;

    /// Silence whatever is playing. Must tolerate nothing playing.
    fn stop(&mut self);
}

/// What a call to [`SoundPlayer::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NowPlaying {
    sound: SoundId,
    volume: f32,
}

/// Owns at most one playing tone.
pub struct SoundPlayer<B: AudioBackend> {
    backend: B,
    playing: Option<NowPlaying>,
}

impl<B: AudioBackend> SoundPlayer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            playing: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    pub fn now_playing(&self) -> Option<(SoundId, f32)> {
        self.playing.map(|p| (p.sound, p.volume))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Idempotent: a second start while playing is a no-op, so two screens
    /// racing to start the alarm never produce overlapping tones.
    pub(crate) fn start(&mut self, sound: SoundId, volume: f32) -> Result<StartOutcome, SoundError> {
        if self.playing.is_some() {
            return Ok(StartOutcome::AlreadyPlaying);
        }
        let volume = volume.clamp(0.0, 1.0);
        self.backend.play(sound, volume)?;
        self.playing = Some(NowPlaying { sound, volume });
        Ok(StartOutcome::Started)
    }

    /// Returns whether something was playing.
    pub(crate) fn stop(&mut self) -> bool {
        match self.playing.take() {
            Some(_) => {
                self.backend.stop();
                true
            }
            None => false,
        }
    }
}

impl<B: AudioBackend + fmt::Debug> fmt::Debug for SoundPlayer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundPlayer")
            .field("backend", &self.backend)
            .field("playing", &self.playing)
            .finish()
    }
}

/// Backend that plays nothing and logs what it would have played.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBackend;

impl AudioBackend for SilentBackend {
    fn play(&mut self, sound: SoundId, volume: f32) -> Result<(), SoundError> {
        tracing::info!(sound = %sound, resource = sound.resource(), volume, "alarm tone on");
        Ok(())
    }

    fn stop(&mut self) {
        tracing::info!("alarm tone off");
    }
}

/// Audio calls observed by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    Play(SoundId, f32),
    Stop,
}

/// Backend that records every call into a shared log.
///
/// The log handle stays usable after the backend has been moved into a
/// lifecycle, which is what embedding tests need.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<Vec<AudioCall>>>,
    missing: Arc<Mutex<bool>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AudioCall> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn play_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, AudioCall::Play(..)))
            .count()
    }

    /// Make subsequent `play` calls fail as if the resource were missing.
    pub fn set_missing_resource(&self, missing: bool) {
        if let Ok(mut m) = self.missing.lock() {
            *m = missing;
        }
    }
}

impl AudioBackend for RecordingBackend {
    fn play(&mut self, sound: SoundId, volume: f32) -> Result<(), SoundError> {
        if self.missing.lock().map(|m| *m).unwrap_or(false) {
            return Err(SoundError::MissingResource(sound.resource().to_string()));
        }
        if let Ok(mut log) = self.log.lock() {
            log.push(AudioCall::Play(sound, volume));
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.push(AudioCall::Stop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_idempotent() {
        let backend = RecordingBackend::new();
        let mut player = SoundPlayer::new(backend.clone());

        assert_eq!(player.start(SoundId::Birds, 0.5), Ok(StartOutcome::Started));
        assert_eq!(player.start(SoundId::Siren, 1.0), Ok(StartOutcome::AlreadyPlaying));

        assert_eq!(backend.play_count(), 1);
        assert_eq!(player.now_playing(), Some((SoundId::Birds, 0.5)));
    }

    #[test]
    fn stop_tolerates_silence() {
        let backend = RecordingBackend::new();
        let mut player = SoundPlayer::new(backend.clone());

        assert!(!player.stop());
        assert!(backend.calls().is_empty());

        player.start(SoundId::Classic, 0.8).unwrap();
        assert!(player.stop());
        assert!(!player.is_playing());
        assert_eq!(backend.calls().last(), Some(&AudioCall::Stop));
    }

    #[test]
    fn missing_resource_leaves_player_silent() {
        let backend = RecordingBackend::new();
        backend.set_missing_resource(true);
        let mut player = SoundPlayer::new(backend);

        let err = player.start(SoundId::Radar, 0.5).unwrap_err();
        assert_eq!(err, SoundError::MissingResource("sounds/radar.mp3".into()));
        assert!(!player.is_playing());
    }

    #[test]
    fn volume_is_clamped() {
        let mut player = SoundPlayer::new(RecordingBackend::new());
        player.start(SoundId::Classic, 3.0).unwrap();
        assert_eq!(player.now_playing(), Some((SoundId::Classic, 1.0)));
    }

    #[test]
    fn sound_id_parses_names() {
        assert_eq!("Chimes".parse::<SoundId>(), Ok(SoundId::Chimes));
        assert!("kazoo".parse::<SoundId>().is_err());
        assert_eq!(SoundId::default(), SoundId::Classic);
    }
}
