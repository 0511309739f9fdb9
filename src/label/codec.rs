use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use super::{FullLabel, Label, LabelLine, MonoLabel, Oneline, Phoneme};
use crate::error::PipelineError;

/// Parse label text into lines of type `T`.
///
/// Blank lines are skipped and runs of whitespace between fields are
/// accepted, so writing the label back drops both. Line numbers in errors
/// are 1-based and count every physical line.
pub fn parse<T: LabelLine>(text: &str) -> Result<Label<T>, PipelineError> {
    let mut lines = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        lines.push(parse_line::<T>(raw, line_no)?);
    }
    Label::new(lines)
}

pub fn parse_mono(text: &str) -> Result<MonoLabel, PipelineError> {
    parse(text)
}

pub fn parse_full(text: &str) -> Result<FullLabel, PipelineError> {
    parse(text)
}

fn parse_line<T: LabelLine>(raw: &str, line_no: usize) -> Result<T, PipelineError> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(PipelineError::format(
            line_no,
            format!("expected `<start> <end> <context>`, got {:?}", raw.trim()),
        ));
    }
    if fields.len() > 3 {
        return Err(PipelineError::format(
            line_no,
            format!("unexpected extra fields after the context: {:?}", &fields[3..]),
        ));
    }
    let start = parse_time(fields[0], "start", line_no)?;
    let end = parse_time(fields[1], "end", line_no)?;
    T::from_fields(start, end, fields[2], line_no)
}

/// Times must be written canonically (`5`, not `+5` or `05`) so they
/// serialize back unchanged.
fn parse_time(token: &str, name: &str, line_no: usize) -> Result<i64, PipelineError> {
    let time = token.parse::<i64>().map_err(|e| {
        PipelineError::format(line_no, format!("{name} time {token:?} is not an integer: {e}"))
    })?;
    if time.to_string() != token {
        return Err(PipelineError::format(
            line_no,
            format!("{name} time {token:?} is not written canonically"),
        ));
    }
    Ok(time)
}

/// Serialize a label, one `\n`-terminated line per phoneme.
pub fn serialize<T: LabelLine>(label: &Label<T>) -> String {
    let mut out = String::new();
    for line in label.iter() {
        out.push_str(&line.start().to_string());
        out.push(' ');
        out.push_str(&line.end().to_string());
        out.push(' ');
        out.push_str(&line.context_string());
        out.push('\n');
    }
    out
}

/// Project a full label onto its mono label.
pub fn to_mono(full: &FullLabel) -> MonoLabel {
    let phonemes = full
        .iter()
        .map(|line: &Oneline| Phoneme::new(line.symbol(), line.start, line.end))
        .collect();
    // A full label is never empty, so neither is its projection.
    Label { lines: phonemes }
}

impl<T: LabelLine> Label<T> {
    /// Read and parse a label file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path)?;
        parse(&text)
    }

    /// Serialize and write the label to `path`, replacing its content.
    pub fn write(&self, path: &Path) -> Result<(), PipelineError> {
        fs::write(path, serialize(self))?;
        Ok(())
    }
}

impl<T: LabelLine> fmt::Display for Label<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize(self))
    }
}

impl<T: LabelLine> FromStr for Label<T> {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_full, parse_mono, serialize, to_mono};
    use crate::error::PipelineError;
    use crate::label::fixtures::{full_text, mono_text};
    use crate::label::{LabelLine, Phoneme};

    #[test]
    fn mono_round_trip_is_byte_identical() {
        let text = mono_text(&[(0, 500, "pau"), (500, 1200, "k"), (1200, 1800, "a")]);
        let mono = parse_mono(&text).unwrap();
        assert_eq!(serialize(&mono), text);
        assert_eq!(parse_mono(&serialize(&mono)).unwrap(), mono);
    }

    #[test]
    fn missing_trailing_newline_is_normalized() {
        let mono = parse_mono("0 10 pau\n10 20 a").unwrap();
        assert_eq!(serialize(&mono), "0 10 pau\n10 20 a\n");
    }

    #[test]
    fn full_round_trip_keeps_unset_slots() {
        let text = full_text(&[(0, 500, "pau", 0), (500, 1200, "k", 1), (1200, 1800, "a", 1)]);
        let full = parse_full(&text).unwrap();
        assert_eq!(full.len(), 3);
        assert_eq!(full[1].symbol(), "k");
        assert_eq!(serialize(&full), text);
    }

    #[test]
    fn large_times_are_written_without_exponent() {
        let mono = parse_mono("0 98765432100 pau\n").unwrap();
        assert_eq!(serialize(&mono), "0 98765432100 pau\n");
    }

    #[test]
    fn too_few_fields_is_a_format_error() {
        let err = parse_mono("0 10 pau\n10 20\n").unwrap_err();
        assert!(matches!(err, PipelineError::Format { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn non_integer_time_is_a_format_error() {
        let err = parse_mono("0 1e5 pau\n").unwrap_err();
        assert!(matches!(err, PipelineError::Format { line: 1, .. }));
    }

    #[test]
    fn non_canonical_times_are_rejected() {
        for text in ["+5 10 pau\n", "0 0050 pau\n", "-0 10 pau\n"] {
            let err = parse_mono(text).unwrap_err();
            assert!(matches!(err, PipelineError::Format { line: 1, .. }), "{text:?}");
        }
        assert_eq!(parse_mono("-5 10 pau\n").unwrap()[0].start, -5);
    }

    #[test]
    fn mono_text_is_not_a_full_label() {
        assert!(parse_full("0 10 pau\n").is_err());
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(parse_mono("\n\n").is_err());
    }

    #[test]
    fn projection_keeps_symbols_and_times() {
        let text = full_text(&[(0, 500, "pau", 0), (500, 1200, "k", 1)]);
        let mono = to_mono(&parse_full(&text).unwrap());
        assert_eq!(
            mono.to_vec(),
            vec![Phoneme::new("pau", 0, 500), Phoneme::new("k", 500, 1200)]
        );
    }
}
