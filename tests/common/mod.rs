#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// A full-context line; lines of the same `note` share their `E` group.
pub fn full_line(start: i64, end: i64, prev: &str, current: &str, next: &str, note: usize) -> String {
    let pitch = if current == "pau" || current == "sil" { "xx" } else { "D4" };
    format!(
        "{start} {end} xx@xx^{prev}-{current}+{next}=xx_xx%xx^xx_xx~xx-xx!xx[xx$xx]xx\
/A:xx-xx-xx@xx~xx/B:1_1_1@xx|xx/C:xx+xx+xx@xx&xx/D:xx!xx#xx$xx%xx|xx&xx;xx-xx\
/E:{pitch}]xx^0=4/4~100!1@{note}#60|xx]xx$xx|xx&xx%xx[xx|xx]xx-xx^xx+xx~xx=xx@xx$xx!xx%xx#xx|xx|xx-xx&xx&xx+xx[xx;xx]xx;xx~xx~xx^xx^xx@xx[xx#xx=xx!xx~xx+xx!xx^xx\
/F:xx#xx#xx-xx$xx$xx+xx%xx;xx/G:xx_xx/H:xx_xx/I:xx_xx/J:2~2@1"
    )
}

/// Full label text from `(start, end, symbol, note)` rows.
pub fn full_text(rows: &[(i64, i64, &str, usize)]) -> String {
    let mut text = String::new();
    for (i, &(start, end, symbol, note)) in rows.iter().enumerate() {
        let prev = if i == 0 { "xx" } else { rows[i - 1].2 };
        let next = rows.get(i + 1).map(|row| row.2).unwrap_or("xx");
        text.push_str(&full_line(start, end, prev, symbol, next, note));
        text.push('\n');
    }
    text
}

/// `pau k a pau s a pau`, two notes between three rests.
pub fn song_rows() -> Vec<(i64, i64, &'static str, usize)> {
    vec![
        (0, 1000, "pau", 0),
        (1000, 1500, "k", 1),
        (1500, 3000, "a", 1),
        (3000, 4000, "pau", 2),
        (4000, 4500, "s", 3),
        (4500, 6000, "a", 3),
        (6000, 7000, "pau", 4),
    ]
}

pub const SONG_MONO: &str = "0 1000 pau\n1000 1500 k\n1500 3000 a\n3000 4000 pau\n\
4000 4500 s\n4500 6000 a\n6000 7000 pau\n";

/// Write the score of [`song_rows`] to `<dir>/song.full`.
pub fn write_score(dir: &Path) -> PathBuf {
    let path = dir.join("song.full");
    std::fs::write(&path, full_text(&song_rows())).unwrap();
    path
}

/// Shell prelude that stores every `--key value` pair in `$key`.
pub const PARSE_ARGS: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  key="${1#--}"
  eval "$key=\"\$2\""
  shift 2
done
"#;

/// Write an executable `/bin/sh` script made of [`PARSE_ARGS`] and `body`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("{PARSE_ARGS}{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}
