//! Metronome tick hook
//!
//! The session only depends on *when* a tick fires. What the tick sounds like
//! (procedural click, sample playback, terminal bell) belongs to the host.

/// Host-supplied audible tick, invoked once per beat pulse
pub trait TickPlayer {
    /// Play one tick for beat `index` of `total` (1-based, per phase)
    fn play_tick(&mut self, index: u32, total: u32);
}

/// Any `FnMut(index, total)` closure can act as a tick player
impl<F> TickPlayer for F
where
    F: FnMut(u32, u32),
{
    fn play_tick(&mut self, index: u32, total: u32) {
        self(index, total)
    }
}

/// Tick player that makes no sound
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentTick;

impl TickPlayer for SilentTick {
    fn play_tick(&mut self, _index: u32, _total: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_tick_player() {
        let mut calls = Vec::new();
        {
            let mut player = |index: u32, total: u32| calls.push((index, total));
            player.play_tick(1, 4);
            player.play_tick(2, 4);
        }
        assert_eq!(calls, vec![(1, 4), (2, 4)]);
    }

    #[test]
    fn test_silent_tick_is_noop() {
        let mut player = SilentTick;
        player.play_tick(1, 1);
    }
}
