// Audio module - metronome tick side-channel
//
// The calibration core never produces sound itself. Hosts plug a TickPlayer
// into the session and it is invoked once per scheduled beat.

pub mod tick;

pub use tick::{SilentTick, TickPlayer};
