//! Note and syllable grouping of a full label.
//!
//! Notes are maximal runs of consecutive lines sharing the same `E`
//! (current note) group; syllables are runs sharing the same `B` group
//! inside a note. Tempo, pitch and length live in `E`, so every line of a
//! note reports the same note-scoped values.

use std::ops::Range;

use super::{is_rest, FullLabel, LabelLine, Slot};

/// `E` slot holding the absolute pitch (`C4`, `xx` for rests).
pub const NOTE_PITCH_SLOT: usize = 0;
/// `E` slot holding the tempo.
pub const NOTE_TEMPO_SLOT: usize = 4;
/// `E` slot holding the note length in 10 ms units.
pub const NOTE_LENGTH_SLOT: usize = 6;

/// A note, as index ranges into the label it was grouped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub lines: Range<usize>,
    pub syllables: Vec<Range<usize>>,
}

impl Note {
    /// Whether every line of the note is a rest phoneme.
    pub fn is_rest(&self, label: &FullLabel) -> bool {
        label[self.lines.clone()].iter().all(|line| is_rest(line.symbol()))
    }

    pub fn symbols<'a>(&self, label: &'a FullLabel) -> Vec<&'a str> {
        label[self.lines.clone()]
            .iter()
            .map(|line| line.symbol())
            .collect()
    }

    pub fn pitch<'a>(&self, label: &'a FullLabel) -> Option<&'a Slot> {
        label[self.lines.start].contexts.e.get(NOTE_PITCH_SLOT)
    }

    pub fn tempo(&self, label: &FullLabel) -> Option<i64> {
        label[self.lines.start]
            .contexts
            .e
            .get(NOTE_TEMPO_SLOT)
            .and_then(Slot::as_int)
    }

    pub fn length(&self, label: &FullLabel) -> Option<i64> {
        label[self.lines.start]
            .contexts
            .e
            .get(NOTE_LENGTH_SLOT)
            .and_then(Slot::as_int)
    }
}

impl FullLabel {
    /// Group the label into notes and syllables.
    pub fn notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = Vec::new();
        for (index, line) in self.iter().enumerate() {
            let continues_note = index > 0 && self[index - 1].contexts.e == line.contexts.e;
            if !continues_note {
                notes.push(Note {
                    lines: index..index + 1,
                    syllables: vec![index..index + 1],
                });
                continue;
            }
            let Some(note) = notes.last_mut() else {
                continue;
            };
            note.lines.end = index + 1;
            let continues_syllable = self[index - 1].contexts.b == line.contexts.b;
            match note.syllables.last_mut() {
                Some(syllable) if continues_syllable => syllable.end = index + 1,
                _ => note.syllables.push(index..index + 1),
            }
        }
        notes
    }

    /// Whether `index` is the first line of a note.
    pub fn is_note_boundary(&self, index: usize) -> bool {
        index == 0
            || index >= self.len()
            || self[index - 1].contexts.e != self[index].contexts.e
    }
}
