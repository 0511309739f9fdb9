//! Full-context slot model.
//!
//! A context string looks like
//! `xx@xx^sil-k+a=...]xx/A:xx-xx-xx@xx~xx/B:1_1_1@xx|xx/.../J:5~5@1`.
//! The leading group (`p`) carries the phoneme identity, the `/A:` ..
//! `/J:` groups carry syllable, note and phrase level features. Inside a
//! group, slots are separated by single delimiter characters, which are
//! kept so that serialization reproduces the parsed text byte for byte.

use std::fmt;

use crate::error::PipelineError;

/// Token used in label files for a slot without a value.
pub const UNSET_TOKEN: &str = "xx";

/// Characters that separate slots inside one context group.
pub const SLOT_DELIMITERS: &[char] = &[
    '=', '+', '-', '~', '∼', '!', '@', '#', '$', '%', '^', 'ˆ', '&', ';', '_', '|', '[', ']',
];

/// Index of the phoneme identity (`p4`) inside the `p` group.
pub const IDENTITY_SLOT: usize = 3;

/// Group letters following the `p` group, in file order.
const GROUP_LETTERS: [char; 10] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J'];

/// One slot value of a context group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Written as `xx` in label files.
    Unset,
    Int(i64),
    Text(String),
}

impl Slot {
    /// Interpret one raw slot token.
    ///
    /// Only canonically written integers become [`Slot::Int`]; `01` or `+1`
    /// stay text so they are written back unchanged.
    pub fn parse(raw: &str) -> Self {
        if raw == UNSET_TOKEN {
            return Slot::Unset;
        }
        match raw.parse::<i64>() {
            Ok(value) if value.to_string() == raw => Slot::Int(value),
            _ => Slot::Text(raw.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Slot::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Slot::Unset)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Unset => f.write_str(UNSET_TOKEN),
            Slot::Int(value) => write!(f, "{value}"),
            Slot::Text(text) => f.write_str(text),
        }
    }
}

/// Slots of one context group together with the delimiters between them.
///
/// `delimiters.len() + 1 == slots.len()` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextGroup {
    slots: Vec<Slot>,
    delimiters: Vec<char>,
}

impl ContextGroup {
    pub fn parse(raw: &str) -> Self {
        let mut slots = Vec::new();
        let mut delimiters = Vec::new();
        let mut current = String::new();

        for ch in raw.chars() {
            if SLOT_DELIMITERS.contains(&ch) {
                slots.push(Slot::parse(&current));
                delimiters.push(ch);
                current.clear();
            } else {
                current.push(ch);
            }
        }
        slots.push(Slot::parse(&current));

        Self { slots, delimiters }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Replace one slot. Returns `false` when the group has no such slot.
    pub fn set(&mut self, index: usize, value: Slot) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Display for ContextGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.slots.iter().enumerate() {
            write!(f, "{slot}")?;
            if let Some(delimiter) = self.delimiters.get(i) {
                write!(f, "{delimiter}")?;
            }
        }
        Ok(())
    }
}

/// The fixed set of context groups of one full-label line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contexts {
    /// Phoneme level: previous/current/next phoneme identities.
    pub p: ContextGroup,
    pub a: ContextGroup,
    /// Current syllable.
    pub b: ContextGroup,
    pub c: ContextGroup,
    pub d: ContextGroup,
    /// Current note: pitch, key, tempo, length.
    pub e: ContextGroup,
    pub f: ContextGroup,
    pub g: ContextGroup,
    pub h: ContextGroup,
    pub i: ContextGroup,
    /// Song level group; absent in 10-group labels.
    pub j: Option<ContextGroup>,
}

impl Contexts {
    /// Parse a context string. `line` is only used for error reporting.
    pub fn parse(raw: &str, line: usize) -> Result<Self, PipelineError> {
        let (head, rest) = split_groups(raw);
        let group_count = rest.len() + 1;
        if !(10..=11).contains(&group_count) {
            return Err(PipelineError::format(
                line,
                format!("expected 10 or 11 context groups, found {group_count}"),
            ));
        }
        for (position, (letter, _)) in rest.iter().enumerate() {
            if *letter != GROUP_LETTERS[position] {
                return Err(PipelineError::format(
                    line,
                    format!(
                        "context group /{}: found where /{}: was expected",
                        letter, GROUP_LETTERS[position]
                    ),
                ));
            }
        }

        let mut p = ContextGroup::parse(head);
        let identity = match p.get(IDENTITY_SLOT) {
            Some(slot) => slot.to_string(),
            None => {
                return Err(PipelineError::format(
                    line,
                    format!("phoneme group `{head}` has no identity slot"),
                ))
            }
        };
        if identity.is_empty() {
            return Err(PipelineError::format(line, "empty phoneme identity"));
        }
        // The identity is categorical even when it looks numeric.
        p.set(IDENTITY_SLOT, Slot::Text(identity));

        let mut groups = rest.into_iter().map(|(_, body)| ContextGroup::parse(body));
        let mut next = || groups.next().unwrap_or_else(|| ContextGroup::parse(""));
        Ok(Self {
            p,
            a: next(),
            b: next(),
            c: next(),
            d: next(),
            e: next(),
            f: next(),
            g: next(),
            h: next(),
            i: next(),
            j: if group_count == 11 { Some(next()) } else { None },
        })
    }

    /// The phoneme symbol of this line (`p4`).
    pub fn identity(&self) -> &str {
        match self.p.get(IDENTITY_SLOT) {
            Some(Slot::Text(text)) => text,
            _ => UNSET_TOKEN,
        }
    }

    pub fn set_identity(&mut self, symbol: &str) {
        self.p.set(IDENTITY_SLOT, Slot::Text(symbol.to_string()));
    }

    /// Lettered groups in file order, paired with their letter.
    pub fn lettered(&self) -> Vec<(char, &ContextGroup)> {
        let mut groups = vec![
            ('a', &self.a),
            ('b', &self.b),
            ('c', &self.c),
            ('d', &self.d),
            ('e', &self.e),
            ('f', &self.f),
            ('g', &self.g),
            ('h', &self.h),
            ('i', &self.i),
        ];
        if let Some(j) = &self.j {
            groups.push(('j', j));
        }
        groups
    }
}

impl fmt::Display for Contexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.p)?;
        for (letter, group) in self.lettered() {
            write!(f, "/{}:{}", letter.to_ascii_uppercase(), group)?;
        }
        Ok(())
    }
}

/// Split `raw` at every `/X:` marker (X an ASCII uppercase letter).
fn split_groups(raw: &str) -> (&str, Vec<(char, &str)>) {
    let bytes = raw.as_bytes();
    let mut markers = Vec::new();
    let mut i = 0;
    while i + 2 < bytes.len() {
        if bytes[i] == b'/' && bytes[i + 1].is_ascii_uppercase() && bytes[i + 2] == b':' {
            markers.push(i);
            i += 3;
        } else {
            i += 1;
        }
    }

    let head_end = markers.first().copied().unwrap_or(raw.len());
    let mut groups = Vec::with_capacity(markers.len());
    for (n, &at) in markers.iter().enumerate() {
        let body_end = markers.get(n + 1).copied().unwrap_or(raw.len());
        groups.push((bytes[at + 1] as char, &raw[at + 3..body_end]));
    }
    (&raw[..head_end], groups)
}
