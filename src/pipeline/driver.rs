use std::fs;
use std::path::{Path, PathBuf};

use super::config::{Disposition, PipelineConfig};
use super::extension::{Extension, ExtensionAliases};
use super::workdir::WorkDir;
use super::{ArtifactKey, Artifacts, Stage};
use crate::error::PipelineError;
use crate::label::{FullLabel, LabelLine};
use crate::segment::segment_pair;
use crate::sync::{reconcile_files, validate, LabelPair, LabelSnapshot};
use crate::{StageCalculator, StageRequest};

/// Inputs of one synthesis run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Song name; prefixes every artifact file name.
    pub song: String,
    /// Full score label, consumed by the built-in score stage.
    pub score: Option<PathBuf>,
    /// Source score for an external `ust_converter`, copied into the run.
    pub ust: Option<PathBuf>,
    /// Phoneme table passed through to extensions.
    pub table: Option<PathBuf>,
    /// Where the produced artifacts are copied at the end of the run.
    pub out_dir: Option<PathBuf>,
}

impl RunContext {
    pub fn new(song: impl Into<String>) -> Self {
        Self {
            song: song.into(),
            ..Default::default()
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Final artifact locations: the output directory if one was given,
    /// otherwise the working directory.
    pub artifacts: Artifacts,
    /// `(full, mono)` paths of the exported timing segments.
    pub segments: Vec<(PathBuf, PathBuf)>,
    /// Non-fatal problems met on the way.
    pub warnings: Vec<PipelineError>,
    /// Set when the working directory was kept.
    pub working_dir: Option<PathBuf>,
}

/// Built-in calculator that derives every label stage from the score.
///
/// Timelag and duration reproduce the score timings; timing places each
/// note at its timelag start and spreads it over its phonemes in proportion
/// to the duration label. Acoustic features and waveforms need a model and
/// are left to extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreTimingCalculator;

impl StageCalculator for ScoreTimingCalculator {
    fn calculate(&mut self, request: &StageRequest<'_>) -> Result<(), PipelineError> {
        let Some((full_key, _)) = request.stage.label_keys() else {
            log::info!(
                "[{}] No built-in {} calculator; the stage produces no output",
                request.song,
                request.stage
            );
            return Ok(());
        };

        let label = match request.stage {
            Stage::Score => {
                let score = request.score.ok_or_else(|| {
                    PipelineError::Config(
                        "no score label given and `ust_converter` is built-in".to_string(),
                    )
                })?;
                Some(FullLabel::load(score)?)
            }
            Stage::Timelag | Stage::Duration => load_input(request.inputs, ArtifactKey::FullScore)?,
            Stage::Timing => {
                let fallback = load_input(request.inputs, ArtifactKey::FullScore)?;
                let timelag = load_input(request.inputs, ArtifactKey::FullTimelag)?;
                let duration = load_input(request.inputs, ArtifactKey::FullDuration)?;
                match (timelag.or_else(|| fallback.clone()), duration.or(fallback)) {
                    (Some(timelag), Some(duration)) => Some(merge_timing(&timelag, &duration)?),
                    _ => None,
                }
            }
            Stage::Acoustic | Stage::Wav => None,
        };

        match (label, request.outputs.get(full_key)) {
            (Some(label), Some(path)) => label.write(path),
            _ => {
                log::warn!(
                    "[{}] No input for the built-in {} calculator",
                    request.song,
                    request.stage
                );
                Ok(())
            }
        }
    }
}

fn load_input(inputs: &Artifacts, key: ArtifactKey) -> Result<Option<FullLabel>, PipelineError> {
    match inputs.get(key) {
        Some(path) => Ok(Some(FullLabel::load(path)?)),
        None => Ok(None),
    }
}

/// Place every note at the timelag label's start of its first phoneme and
/// split it over its phonemes in proportion to `duration`.
///
/// A note ends where the next one starts; the last note ends at the end of
/// the timelag label. Boundaries are rounded cumulatively so the phonemes
/// of a note tile it exactly.
pub fn merge_timing(timelag: &FullLabel, duration: &FullLabel) -> Result<FullLabel, PipelineError> {
    validate(timelag, &crate::label::to_mono(duration))?;

    let mut merged = duration.clone();
    let notes = duration.notes();
    for (index, note) in notes.iter().enumerate() {
        let note_start = timelag[note.lines.start].start();
        let note_end = notes
            .get(index + 1)
            .map(|next| timelag[next.lines.start].start())
            .unwrap_or_else(|| timelag.end_time())
            .max(note_start);

        let weights: Vec<i64> = duration[note.lines.clone()]
            .iter()
            .map(|line| line.duration().max(0))
            .collect();
        let total: i64 = weights.iter().sum();
        let (weights, total) = if total == 0 {
            (vec![1; weights.len()], weights.len() as i64)
        } else {
            (weights, total)
        };

        let span = i128::from(note_end - note_start);
        let mut cumulative = 0i64;
        let mut start = note_start;
        for (offset, weight) in weights.iter().enumerate() {
            cumulative += weight;
            let end = note_start + (span * i128::from(cumulative) / i128::from(total)) as i64;
            let line = &mut merged[note.lines.start + offset];
            line.set_start(start);
            line.set_end(end);
            start = end;
        }
    }
    Ok(merged)
}

/// Bookkeeping of one run.
struct Run<'a> {
    context: &'a RunContext,
    workdir: &'a WorkDir,
    produced: Artifacts,
    segments: Vec<(PathBuf, PathBuf)>,
    warnings: Vec<PipelineError>,
}

impl Run<'_> {
    fn song(&self) -> &str {
        &self.context.song
    }

    fn planned_outputs(&self, stage: Stage) -> Artifacts {
        let mut outputs = Artifacts::new();
        for &key in stage.outputs() {
            outputs.insert(key, self.workdir.join(key.file_name(self.song())));
        }
        outputs
    }
}

/// Runs the stage sequence for one song at a time.
pub struct StageDriver<C = ScoreTimingCalculator> {
    config: PipelineConfig,
    aliases: ExtensionAliases,
    calculator: C,
}

impl StageDriver<ScoreTimingCalculator> {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_calculator(config, ScoreTimingCalculator)
    }
}

impl<C: StageCalculator> StageDriver<C> {
    pub fn with_calculator(config: PipelineConfig, calculator: C) -> Result<Self, PipelineError> {
        let aliases = ExtensionAliases::from_config(&config)?;
        Ok(Self {
            config,
            aliases,
            calculator,
        })
    }

    /// Replace the alias targets derived from the configuration.
    pub fn with_aliases(mut self, aliases: ExtensionAliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for `context.song` in a fresh working directory.
    ///
    /// On a fatal error the working directory is kept for inspection and
    /// its path is logged.
    pub fn run(&mut self, context: &RunContext) -> Result<RunReport, PipelineError> {
        let root = self.config.working_root.as_deref();
        let workdir = WorkDir::create(root, &context.song, self.config.keep_working_directory)
            .map_err(|e| {
                let root = root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
                e.at(Stage::Score, root)
            })?;
        log::info!(
            "[{}] Starting run in {}",
            context.song,
            workdir.path().display()
        );

        let mut run = Run {
            context,
            workdir: &workdir,
            produced: Artifacts::new(),
            segments: Vec::new(),
            warnings: Vec::new(),
        };

        let outcome = self
            .run_stages(&mut run)
            .and_then(|()| collect_outputs(&mut run));
        match outcome {
            Ok(()) => {
                let Run {
                    produced,
                    segments,
                    warnings,
                    ..
                } = run;
                let working_dir = match workdir.close() {
                    Ok(kept) => kept,
                    Err(err) => {
                        log::warn!(
                            "[{}] Could not remove the working directory: {err}",
                            context.song
                        );
                        None
                    }
                };
                log::info!(
                    "[{}] Finished with {} warning(s)",
                    context.song,
                    warnings.len()
                );
                Ok(RunReport {
                    artifacts: produced,
                    segments,
                    warnings,
                    working_dir,
                })
            }
            Err(err) => {
                drop(run);
                let kept = workdir.preserve();
                log::error!(
                    "[{}] Run failed; working directory kept at {}",
                    context.song,
                    kept.display()
                );
                Err(err)
            }
        }
    }

    fn run_stages(&mut self, run: &mut Run<'_>) -> Result<(), PipelineError> {
        if let Some(ust) = &run.context.ust {
            let target = run.workdir.join(ArtifactKey::Ust.file_name(run.song()));
            fs::copy(ust, &target).map_err(|e| PipelineError::from(e).at(Stage::Score, ust))?;
            run.produced.insert(ArtifactKey::Ust, target);
        }
        if let Some(table) = &run.context.table {
            let table = table
                .canonicalize()
                .map_err(|e| PipelineError::from(e).at(Stage::Score, table))?;
            run.produced.insert(ArtifactKey::Table, table);
        }

        for stage in Stage::ALL {
            self.run_stage(stage, run)?;
            if stage == Stage::Timing {
                self.export_segments(run)?;
            }
        }
        Ok(())
    }

    fn run_stage(&mut self, stage: Stage, run: &mut Run<'_>) -> Result<(), PipelineError> {
        let outputs = run.planned_outputs(stage);
        match self.config.calculator(stage).clone() {
            Disposition::Skip => {
                log::info!("[{}] Skipping {stage} stage", run.song());
                return Ok(());
            }
            Disposition::BuiltIn => {
                log::info!("[{}] Running built-in {stage} stage", run.song());
                let request = StageRequest {
                    stage,
                    song: run.song(),
                    score: run.context.score.as_deref(),
                    inputs: &run.produced,
                    outputs: &outputs,
                };
                self.calculator
                    .calculate(&request)
                    .map_err(|e| e.at(stage, first_output(&outputs)))?;
            }
            Disposition::Process(raw) => {
                let extension = self.resolve(&raw).map_err(|e| e.at(stage, &raw))?;
                log::info!(
                    "[{}] Running {stage} stage with {}",
                    run.song(),
                    extension.path().display()
                );
                extension
                    .run(&run.produced.merged(&outputs))
                    .map_err(|e| e.at(stage, extension.path()))?;
            }
        }

        self.register_outputs(stage, run, &outputs)?;
        self.run_editors(stage, run, &outputs)
    }

    /// Record what the stage wrote. Label stages get their timing repaired
    /// (timing only) and their mono projection derived here.
    fn register_outputs(
        &self,
        stage: Stage,
        run: &mut Run<'_>,
        outputs: &Artifacts,
    ) -> Result<(), PipelineError> {
        let Some((full_key, mono_key)) = stage.label_keys() else {
            for (key, path) in outputs.iter() {
                if path.is_file() {
                    run.produced.insert(key, path);
                }
            }
            return Ok(());
        };
        let (Some(full_path), Some(mono_path)) = (outputs.get(full_key), outputs.get(mono_key))
        else {
            return Ok(());
        };
        if !full_path.is_file() {
            log::warn!(
                "[{}] The {stage} stage produced no label at {}",
                run.song(),
                full_path.display()
            );
            return Ok(());
        }

        let mut full = FullLabel::load(full_path).map_err(|e| e.at(stage, full_path))?;
        if stage == Stage::Timing {
            if let Some(repair) = &self.config.timing_repair {
                repair.apply(&mut full).map_err(|e| e.at(stage, full_path))?;
            }
        }
        LabelPair::from_full(full)
            .write(full_path, mono_path)
            .map_err(|e| e.at(stage, full_path))?;
        run.produced.insert(full_key, full_path);
        run.produced.insert(mono_key, mono_path);
        Ok(())
    }

    fn run_editors(
        &self,
        stage: Stage,
        run: &mut Run<'_>,
        outputs: &Artifacts,
    ) -> Result<(), PipelineError> {
        let editors = self.config.editors(stage);
        if editors.is_empty() {
            return Ok(());
        }

        let labels = match stage.label_keys() {
            Some((full_key, mono_key)) => {
                match (run.produced.get(full_key), run.produced.get(mono_key)) {
                    (Some(full), Some(mono)) => Some((full.to_path_buf(), mono.to_path_buf())),
                    _ => {
                        log::warn!(
                            "[{}] No {stage} labels to edit; skipping {} editor(s)",
                            run.song(),
                            editors.len()
                        );
                        return Ok(());
                    }
                }
            }
            None => None,
        };

        for raw in editors {
            let extension = self.resolve(raw).map_err(|e| e.at(stage, raw))?;
            log::info!(
                "[{}] Editing {stage} with {}",
                run.song(),
                extension.path().display()
            );

            let Some((full_path, mono_path)) = &labels else {
                extension
                    .run(&run.produced.merged(outputs))
                    .map_err(|e| e.at(stage, extension.path()))?;
                self.register_outputs(stage, run, outputs)?;
                continue;
            };

            let before =
                LabelSnapshot::capture(full_path, mono_path).map_err(|e| e.at(stage, full_path))?;
            extension
                .run(&run.produced)
                .map_err(|e| e.at(stage, extension.path()))?;
            let merged =
                match reconcile_files(full_path, mono_path, &before, stage.merge_granularity()) {
                    Ok(_) => true,
                    Err(err) if !err.is_fatal() => {
                        log::warn!("[{}] {err}", run.song());
                        run.warnings.push(err.at(stage, mono_path));
                        false
                    }
                    Err(err) => return Err(err.at(stage, mono_path)),
                };
            if stage == Stage::Timing {
                // An unmerged mono label is left as the editor wrote it.
                let mono_path = merged.then_some(mono_path.as_path());
                self.repair_timing(full_path, mono_path)
                    .map_err(|e| e.at(stage, full_path))?;
            }
        }
        Ok(())
    }

    /// Re-run the configured timing repair on an edited timing label.
    fn repair_timing(&self, full_path: &Path, mono_path: Option<&Path>) -> Result<(), PipelineError> {
        let Some(repair) = &self.config.timing_repair else {
            return Ok(());
        };
        let mut full = FullLabel::load(full_path)?;
        repair.apply(&mut full)?;
        match mono_path {
            Some(mono_path) => LabelPair::from_full(full).write(full_path, mono_path),
            None => full.write(full_path),
        }
    }

    /// Write `<song>_timing_seg<i>.full` / `.lab` pairs for the timing label.
    fn export_segments(&self, run: &mut Run<'_>) -> Result<(), PipelineError> {
        let Some(policy) = self.config.segmentation else {
            return Ok(());
        };
        let Some(full_path) = run.produced.get(ArtifactKey::FullTiming).map(Path::to_path_buf)
        else {
            log::warn!("[{}] No timing label to segment", run.song());
            return Ok(());
        };

        let pair = LabelPair::load_full(&full_path).map_err(|e| e.at(Stage::Timing, &full_path))?;
        let segments = segment_pair(pair.full(), pair.mono(), policy)
            .map_err(|e| e.at(Stage::Timing, &full_path))?;
        for (index, segment) in segments.iter().enumerate() {
            let stem = format!("{}_timing_seg{index}", run.song());
            let full = run.workdir.join(format!("{stem}.full"));
            let mono = run.workdir.join(format!("{stem}.lab"));
            segment
                .write(&full, &mono)
                .map_err(|e| e.at(Stage::Timing, &full))?;
            run.segments.push((full, mono));
        }
        log::info!(
            "[{}] Exported {} timing segment(s) ({policy:?})",
            run.song(),
            segments.len()
        );
        Ok(())
    }

    fn resolve(&self, raw: &str) -> Result<Extension, PipelineError> {
        Extension::resolve(raw, &self.aliases, &self.config.interpreters)
    }
}

fn first_output(outputs: &Artifacts) -> PathBuf {
    outputs
        .iter()
        .next()
        .map(|(_, path)| path.to_path_buf())
        .unwrap_or_default()
}

/// Copy everything the run produced inside its working directory to the
/// output directory and point the report at the copies.
fn collect_outputs(run: &mut Run<'_>) -> Result<(), PipelineError> {
    let Some(out_dir) = &run.context.out_dir else {
        return Ok(());
    };
    // Collection happens after the last stage and is reported under it.
    fs::create_dir_all(out_dir).map_err(|e| PipelineError::from(e).at(Stage::Wav, out_dir))?;

    let copy = |stage: Stage, path: &Path| -> Result<PathBuf, PipelineError> {
        let name = path.file_name().unwrap_or(path.as_os_str());
        let target = out_dir.join(name);
        fs::copy(path, &target).map_err(|e| PipelineError::from(e).at(stage, path))?;
        Ok(target)
    };

    let mut copied = Artifacts::new();
    for (key, path) in run.produced.iter() {
        if path.starts_with(run.workdir.path()) {
            copied.insert(key, copy(key.stage(), path)?);
        } else {
            copied.insert(key, path);
        }
    }
    let mut segments = Vec::with_capacity(run.segments.len());
    for (full, mono) in &run.segments {
        segments.push((copy(Stage::Timing, full)?, copy(Stage::Timing, mono)?));
    }

    run.produced = copied;
    run.segments = segments;
    log::info!(
        "[{}] Copied artifacts to {}",
        run.song(),
        out_dir.display()
    );
    Ok(())
}
