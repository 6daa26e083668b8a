//! PC speaker: PIT channel 2 square-wave tones and the note sequencer.

use core::sync::atomic::{AtomicBool, Ordering};

use log::trace;

use crate::internal::clk;
use crate::internal::clk::pit::PIT_BASE_HZ;
use crate::internal::cpu;

const GATE_PORT: u16 = 0x61;
const CHANNEL2_PORT: u16 = 0x42;
const CMD_PORT: u16 = 0x43;
/// Command: channel 2, lobyte/hibyte, mode 3 (square wave), binary.
const CMD_CH2_SQUARE: u8 = 0xB6;

/// Silence between notes so repeated notes stay distinguishable.
const NOTE_GAP_MS: u32 = 20;

/// One playable note. Frequency 0 is a rest: silence for the duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// Tone frequency in Hz, or 0 for a rest.
    pub frequency: u32,
    /// How long to hold the note.
    pub duration_ms: u32,
}

/// A borrowed sequence of notes. Song tables are static read-only data;
/// the sequencer never mutates them.
#[derive(Debug, Clone, Copy)]
pub struct Song<'a> {
    /// The notes, in playback order.
    pub notes: &'a [Note],
}

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

fn gate_enable() {
    unsafe {
        let value = cpu::in_u8(GATE_PORT);
        cpu::out_u8(GATE_PORT, value | 0x03);
    }
}

fn gate_disable() {
    unsafe {
        let value = cpu::in_u8(GATE_PORT);
        cpu::out_u8(GATE_PORT, value & !0x03);
    }
}

/// Divisor channel 2 needs for a tone of `hz`, clamped to the counter's
/// 16-bit range.
pub fn divisor_for(hz: u32) -> u16 {
    (PIT_BASE_HZ / hz).clamp(1, 0xFFFF) as u16
}

/// Start a square wave of `hz` on the speaker. Frequency 0 silences it.
pub fn start_tone(hz: u32) {
    if hz == 0 {
        gate_disable();
        return;
    }
    let divisor = divisor_for(hz);

    // drop the gate so the reprogrammed counter latches cleanly
    gate_disable();
    unsafe {
        cpu::out_u8(CMD_PORT, CMD_CH2_SQUARE);
        cpu::out_u8(CHANNEL2_PORT, (divisor & 0xFF) as u8);
        cpu::out_u8(CHANNEL2_PORT, (divisor >> 8) as u8);
    }
    gate_enable();
}

/// Silence the speaker.
pub fn stop_tone() {
    gate_disable();
}

/// Ask a running `play` to stop after the current note.
pub fn request_stop() {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Play a song to completion or until `request_stop`. The speaker is
/// always left disabled, whichever way playback ends.
pub fn play(song: &Song) {
    STOP_REQUESTED.store(false, Ordering::SeqCst);

    for note in song.notes {
        if STOP_REQUESTED.load(Ordering::SeqCst) {
            break;
        }
        if note.frequency == 0 {
            trace!("rest {} ms", note.duration_ms);
            stop_tone();
        } else {
            trace!("note {} Hz for {} ms", note.frequency, note.duration_ms);
            start_tone(note.frequency);
        }
        clk::sleep_interrupt(note.duration_ms);
        stop_tone();
        clk::sleep_interrupt(NOTE_GAP_MS);
    }

    stop_tone();
}

#[test_case]
fn test_divisor_clamps_to_counter_range() {
    assert_eq!(divisor_for(440), (PIT_BASE_HZ / 440) as u16);
    assert_eq!(divisor_for(2_000_000), 1);
    assert_eq!(divisor_for(1), 0xFFFF);
}

#[test_case]
fn test_play_resets_stale_stop_flag() {
    use crate::internal::tunes;

    request_stop();
    play(&Song {
        notes: &tunes::SCALE[..1],
    });
    assert!(!STOP_REQUESTED.load(Ordering::SeqCst));
}
