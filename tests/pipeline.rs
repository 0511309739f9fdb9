#![cfg(unix)]

mod common;

use std::fs;
use std::path::Path;

use common::{write_score, write_script, SONG_MONO};
use svs_label::label::{FullLabel, LabelLine};
use svs_label::pipeline::{ArtifactKey, PipelineConfig, RunContext, RunReport, StageDriver};
use svs_label::PipelineError;

fn run(dir: &Path, config_json: &str) -> Result<RunReport, PipelineError> {
    let mut config = PipelineConfig::from_json(config_json, dir).unwrap();
    config.working_root = Some(dir.join("work"));
    let mut driver = StageDriver::new(config).unwrap();

    let mut context = RunContext::new("song");
    context.score = Some(write_score(dir));
    context.out_dir = Some(dir.join("out"));
    driver.run(&context)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn mono_timing_edit_is_merged_into_full() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "shorten_k.sh",
        r#"sed 's/^1000 1500 k$/1000 1200 k/;s/^1500 3000 a$/1200 3000 a/' "$mono_timing" > "$mono_timing.tmp"
mv "$mono_timing.tmp" "$mono_timing""#,
    );

    let report = run(
        dir.path(),
        r#"{"extensions": {"timing_editor": "%v/shorten_k.sh"}}"#,
    )
    .unwrap();

    assert!(report.warnings.is_empty());
    let mono = read(report.artifacts.get(ArtifactKey::MonoTiming).unwrap());
    assert!(mono.contains("1000 1200 k\n1200 3000 a\n"), "{mono}");
    let full = FullLabel::load(report.artifacts.get(ArtifactKey::FullTiming).unwrap()).unwrap();
    assert_eq!((full[1].start(), full[1].end()), (1000, 1200));
    assert_eq!(full[2].start(), 1200);
    assert_eq!(full[1].symbol(), "k");
}

#[test]
fn editing_both_labels_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "both.sh",
        r#"sed 's/^1000 1500 k$/1000 1200 k/' "$mono_timing" > "$mono_timing.tmp"
mv "$mono_timing.tmp" "$mono_timing"
sed 's/^1000 1500 /1000 1400 /' "$full_timing" > "$full_timing.tmp"
mv "$full_timing.tmp" "$full_timing""#,
    );

    let report = run(dir.path(), r#"{"extensions": {"timing_editor": "%v/both.sh"}}"#).unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        report.warnings[0].root(),
        PipelineError::AmbiguousEdit { .. }
    ));
    // Both files stay as the extension left them.
    let mono = read(report.artifacts.get(ArtifactKey::MonoTiming).unwrap());
    assert!(mono.contains("1000 1200 k\n"), "{mono}");
    let full = FullLabel::load(report.artifacts.get(ArtifactKey::FullTiming).unwrap()).unwrap();
    assert_eq!(full[1].end(), 1400);
}

#[test]
fn editor_without_effect_leaves_labels_alone() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "noop.sh", "true");

    let report = run(dir.path(), r#"{"extensions": {"timing_editor": ["%v/noop.sh"]}}"#).unwrap();

    assert!(report.warnings.is_empty());
    assert_eq!(read(report.artifacts.get(ArtifactKey::MonoTiming).unwrap()), SONG_MONO);
}

#[test]
fn score_editor_can_fix_lyrics() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "lyrics.sh",
        r#"sed 's/^4000 4500 s$/4000 4500 t/' "$mono_score" > "$mono_score.tmp"
mv "$mono_score.tmp" "$mono_score""#,
    );

    let report = run(dir.path(), r#"{"extensions": {"score_editor": "%v/lyrics.sh"}}"#).unwrap();

    let timing = read(report.artifacts.get(ArtifactKey::MonoTiming).unwrap());
    assert!(timing.contains("4000 4500 t\n"), "{timing}");
    let full = FullLabel::load(report.artifacts.get(ArtifactKey::FullTiming).unwrap()).unwrap();
    assert_eq!(full[4].symbol(), "t");
}

#[test]
fn editors_run_in_list_order() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "first.sh", r#"echo first >> "$(dirname "$mono_timing")/order""#);
    write_script(dir.path(), "second.sh", r#"echo second >> "$(dirname "$mono_timing")/order""#);
    let mut config = PipelineConfig::from_json(
        r#"{"extensions": {"timing_editor": ["%v/first.sh", "%v/second.sh"]},
            "keep_working_directory": true}"#,
        dir.path(),
    )
    .unwrap();
    config.working_root = Some(dir.path().join("work"));
    let mut context = RunContext::new("song");
    context.score = Some(write_score(dir.path()));

    let report = StageDriver::new(config).unwrap().run(&context).unwrap();
    let kept = report.working_dir.unwrap();
    assert_eq!(read(&kept.join("order")), "first\nsecond\n");
}

#[test]
fn process_calculator_sees_earlier_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "timelag.sh",
        r#"[ -f "$full_score" ] && [ -f "$mono_score" ] || exit 1
cp "$full_score" "$full_timelag""#,
    );

    let report = run(
        dir.path(),
        r#"{"extensions": {"timelag_calculator": "%v/timelag.sh"}}"#,
    )
    .unwrap();

    assert_eq!(read(report.artifacts.get(ArtifactKey::MonoTimelag).unwrap()), SONG_MONO);
}

#[test]
fn acoustic_extension_outputs_are_collected() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "acoustic.sh",
        r#"[ -f "$full_timing" ] || exit 1
echo 0 > "$acoustic"
echo 220 > "$f0""#,
    );

    let report = run(
        dir.path(),
        r#"{"extensions": {"acoustic_calculator": "%v/acoustic.sh"}}"#,
    )
    .unwrap();

    let f0 = report.artifacts.get(ArtifactKey::F0).unwrap();
    assert!(f0.starts_with(dir.path().join("out")));
    assert_eq!(read(f0), "220\n");
    assert!(report.artifacts.contains(ArtifactKey::Acoustic));
    assert!(!report.artifacts.contains(ArtifactKey::Wav));
}

#[test]
fn failing_calculator_is_fatal_and_keeps_the_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "broken.sh", "echo 'model missing' >&2\nexit 3");

    let err = run(
        dir.path(),
        r#"{"extensions": {"timing_calculator": "%v/broken.sh"}}"#,
    )
    .unwrap_err();

    assert!(err.is_fatal());
    let message = err.to_string();
    assert!(message.contains("[timing]"), "{message}");
    match err.root() {
        PipelineError::ExtensionInvocation { reason, cwd, .. } => {
            assert!(reason.contains("model missing"), "{reason}");
            assert_eq!(cwd, dir.path());
        }
        other => panic!("unexpected {other:?}"),
    }

    let kept: Vec<_> = fs::read_dir(dir.path().join("work"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(kept.len(), 1);
    assert!(kept[0].join("song_score.full").is_file());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn missing_extension_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = run(dir.path(), r#"{"extensions": {"duration_editor": "%v/nope.sh"}}"#).unwrap_err();
    assert!(matches!(err.root(), PipelineError::ExtensionInvocation { .. }));
    assert!(err.to_string().contains("[duration]"), "{err}");
}

#[test]
fn editors_of_a_skipped_stage_do_not_run() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "marker.sh", r#"touch "$0.ran""#);

    let report = run(
        dir.path(),
        r#"{"extensions": {"timing_calculator": "skip", "timing_editor": "%v/marker.sh"}}"#,
    )
    .unwrap();

    assert!(!report.artifacts.contains(ArtifactKey::FullTiming));
    assert!(report.artifacts.contains(ArtifactKey::FullDuration));
    assert!(!dir.path().join("marker.sh.ran").exists());
}

#[test]
fn timing_is_repaired_and_segmented() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(
        dir.path(),
        r#"{"timing_repair": {"min_duration": 600}, "segmentation": {"policy": "short"}}"#,
    )
    .unwrap();

    let timing = read(report.artifacts.get(ArtifactKey::MonoTiming).unwrap());
    assert!(timing.starts_with("0 900 pau\n900 1500 k\n"), "{timing}");
    assert!(timing.contains("3000 3900 pau\n3900 4500 s\n"), "{timing}");

    assert_eq!(report.segments.len(), 2);
    let (first_full, first_mono) = &report.segments[0];
    assert!(first_mono.ends_with("song_timing_seg0.lab"));
    assert_eq!(read(first_mono), "0 900 pau\n900 1500 k\n1500 3000 a\n");
    assert_eq!(FullLabel::load(first_full).unwrap().len(), 3);
    let (_, second_mono) = &report.segments[1];
    assert!(read(second_mono).starts_with("3000 3900 pau\n"));
}

#[test]
fn timing_editor_output_is_repaired() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "squash_k.sh",
        r#"sed 's/^1000 1500 k$/1000 1010 k/;s/^1500 3000 a$/1010 3000 a/' "$mono_timing" > "$mono_timing.tmp"
mv "$mono_timing.tmp" "$mono_timing""#,
    );

    let report = run(
        dir.path(),
        r#"{"extensions": {"timing_editor": "%v/squash_k.sh"},
            "timing_repair": {"min_duration": 300}}"#,
    )
    .unwrap();

    assert!(report.warnings.is_empty());
    let mono = read(report.artifacts.get(ArtifactKey::MonoTiming).unwrap());
    assert!(mono.starts_with("0 720 pau\n720 1010 k\n1010 3000 a\n"), "{mono}");
    let full = FullLabel::load(report.artifacts.get(ArtifactKey::FullTiming).unwrap()).unwrap();
    assert!(full.iter().all(|line| line.duration() >= 300));
    assert_eq!((full[1].start(), full[1].end()), (720, 1010));
}

#[test]
fn missing_ust_names_stage_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::from_json("{}", dir.path()).unwrap();
    config.working_root = Some(dir.path().join("work"));
    let mut context = RunContext::new("song");
    context.score = Some(write_score(dir.path()));
    context.ust = Some(dir.path().join("missing.ust"));

    let err = StageDriver::new(config).unwrap().run(&context).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("[score]"), "{message}");
    assert!(message.contains("missing.ust"), "{message}");
    assert!(matches!(err.root(), PipelineError::Io(_)));
}
