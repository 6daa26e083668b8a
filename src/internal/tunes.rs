//! Built-in song tables for the speaker sequencer.

use crate::internal::speaker::Note;

#[allow(missing_docs)]
pub const C4: u32 = 262;
#[allow(missing_docs)]
pub const D4: u32 = 294;
#[allow(missing_docs)]
pub const E4: u32 = 330;
#[allow(missing_docs)]
pub const F4: u32 = 349;
#[allow(missing_docs)]
pub const G4: u32 = 392;
#[allow(missing_docs)]
pub const A4: u32 = 440;
#[allow(missing_docs)]
pub const B4: u32 = 494;
#[allow(missing_docs)]
pub const C5: u32 = 523;
#[allow(missing_docs)]
pub const E5: u32 = 659;
#[allow(missing_docs)]
pub const G5: u32 = 784;
/// Rest "frequency".
pub const R: u32 = 0;

const fn note(frequency: u32, duration_ms: u32) -> Note {
    Note {
        frequency,
        duration_ms,
    }
}

/// One octave up the C major scale.
pub static SCALE: [Note; 8] = [
    note(C4, 200),
    note(D4, 200),
    note(E4, 200),
    note(F4, 200),
    note(G4, 200),
    note(A4, 200),
    note(B4, 200),
    note(C5, 200),
];

/// Short boot chime with a breath before the final chord tone.
pub static BOOT_CHIME: [Note; 6] = [
    note(C4, 150),
    note(E4, 150),
    note(G4, 150),
    note(R, 100),
    note(C5, 300),
    note(G5, 300),
];
