//! Simulation audio player
//!
//! Tracks play/fade/stop calls and answers position queries off the
//! injected clock. No sound comes out; the coordinator can't tell.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use choreo_core::adapters::{AudioPlayer, PlayHandle};
use choreo_core::core::Clock;
use choreo_core::error::{ChoreoError, ChoreoResult};

struct Playing {
    clip_id: String,
    volume: f64,
    started: Instant,
    fading_ms: Option<u64>,
}

/// Simulated audio backend
pub struct SimulationAudioPlayer {
    clock: Arc<dyn Clock>,
    next_handle: u64,
    playing: HashMap<PlayHandle, Playing>,
    /// Every (clip, volume) ever started, oldest first
    history: Vec<(String, f64)>,
}

impl SimulationAudioPlayer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_handle: 0,
            playing: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Clips currently playing (not faded, not stopped)
    pub fn active_clips(&self) -> Vec<String> {
        self.playing
            .values()
            .filter(|p| p.fading_ms.is_none())
            .map(|p| p.clip_id.clone())
            .collect()
    }

    pub fn history(&self) -> &[(String, f64)] {
        &self.history
    }

    pub fn volume_of(&self, handle: PlayHandle) -> Option<f64> {
        self.playing.get(&handle).map(|p| p.volume)
    }
}

impl AudioPlayer for SimulationAudioPlayer {
    fn play(&mut self, clip_id: &str, volume: f64) -> ChoreoResult<PlayHandle> {
        self.next_handle += 1;
        let handle = PlayHandle(self.next_handle);
        self.playing.insert(
            handle,
            Playing {
                clip_id: clip_id.to_string(),
                volume: volume.clamp(0.0, 1.0),
                started: self.clock.now(),
                fading_ms: None,
            },
        );
        self.history.push((clip_id.to_string(), volume));
        Ok(handle)
    }

    fn fade(&mut self, handle: PlayHandle, ms: u64) -> ChoreoResult<()> {
        match self.playing.get_mut(&handle) {
            Some(playing) => {
                playing.fading_ms = Some(ms);
                Ok(())
            }
            None => Err(ChoreoError::Audio(format!("unknown handle {:?}", handle))),
        }
    }

    fn stop_all(&mut self) -> ChoreoResult<()> {
        self.playing.clear();
        Ok(())
    }

    fn position_ms(&mut self, handle: PlayHandle) -> ChoreoResult<u64> {
        let playing = self
            .playing
            .get(&handle)
            .ok_or_else(|| ChoreoError::Audio(format!("unknown handle {:?}", handle)))?;
        Ok(self
            .clock
            .now()
            .saturating_duration_since(playing.started)
            .as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_core::core::VirtualClock;
    use std::time::Duration;

    #[test]
    fn test_play_and_position_tracks_clock() {
        let clock = VirtualClock::new();
        let mut player = SimulationAudioPlayer::new(Arc::new(clock.clone()));
        let handle = player.play("fanfare", 0.8).unwrap();
        assert_eq!(player.position_ms(handle).unwrap(), 0);

        clock.advance(Duration::from_millis(350));
        assert_eq!(player.position_ms(handle).unwrap(), 350);
        assert_eq!(player.active_clips(), vec!["fanfare".to_string()]);
    }

    #[test]
    fn test_fade_and_stop_all() {
        let clock = VirtualClock::new();
        let mut player = SimulationAudioPlayer::new(Arc::new(clock));
        let handle = player.play("loop", 1.0).unwrap();
        player.fade(handle, 50).unwrap();
        assert!(player.active_clips().is_empty());

        player.stop_all().unwrap();
        assert!(player.position_ms(handle).is_err());
    }

    #[test]
    fn test_unknown_handle_errors() {
        let clock = VirtualClock::new();
        let mut player = SimulationAudioPlayer::new(Arc::new(clock));
        assert!(player.fade(PlayHandle(99), 10).is_err());
    }
}
