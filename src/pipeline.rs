//! Ordered operation pipelines.
//!
//! A [`Pipeline`] holds a source dimension and an ordered list of
//! [`Stage`]s. A stage's priority is its insertion index; the pipeline
//! assigns it, operations never choose their own.
//!
//! ## Execution
//!
//! [`Pipeline::run`] is a left fold over the stages:
//!
//! ```text
//! session₀ = ExportSession::new(source)
//! sessionₙ₊₁ = stageₙ.can_execute() ? stageₙ.execute(sessionₙ) : sessionₙ
//! ```
//!
//! A stage that cannot execute is skipped and logged at `debug`; it never
//! aborts the run. No stage can see another stage or stop the chain. Runs
//! are deterministic: the same pipeline always yields an identical plan.
//!
//! ## Errors
//!
//! Construction errors (invalid operation parameters, unknown profile keys,
//! an empty source) surface before any stage runs. Collaborator failures
//! (an unreadable watermark asset found by [`Pipeline::validate_assets`],
//! an encoder error in [`Pipeline::commit`]) abort only this pipeline.
//!
//! ## Parallel planning
//!
//! [`plan_profiles`] builds one pipeline per profile key and runs them on the
//! rayon pool. Each run owns its session, so nothing is shared or locked.

use crate::dimension::Dimension;
use crate::encoder::{Encoder, EncoderError};
use crate::format::VideoFormat;
use crate::operation::{Operation, OperationError};
use crate::presets::ProfileRegistry;
use crate::profile::{ConversionProfile, ProfileError, Resolution};
use crate::session::{EncodeRequest, ExportSession};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source dimension {0} has a zero axis")]
    EmptySource(Dimension),
    #[error("invalid operation: {0}")]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("watermark asset {} is unreadable: {source}", .path.display())]
    AssetUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder failed: {0}")]
    Encoder(#[from] EncoderError),
}

/// An operation with its position in the pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
    priority: usize,
    operation: Operation,
}

impl Stage {
    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    pub fn can_execute(&self) -> bool {
        self.operation.can_execute()
    }

    /// `{name, priority, can_execute}` merged with the operation's parameters.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.name()));
        map.insert("priority".into(), Value::from(self.priority));
        map.insert("can_execute".into(), Value::from(self.can_execute()));
        for (key, value) in self.operation.metadata() {
            map.entry(key).or_insert(value);
        }
        map
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    source: Dimension,
    initial_format: VideoFormat,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Empty pipeline for a source of the given dimension.
    pub fn new(source: Dimension) -> Result<Self, PipelineError> {
        check_source(source)?;
        Ok(Self {
            source,
            initial_format: VideoFormat::default(),
            stages: Vec::new(),
        })
    }

    /// Pipeline with a single stage applying `profile`.
    pub fn from_profile(source: Dimension, profile: ConversionProfile) -> Result<Self, PipelineError> {
        profile.validate()?;
        Self::new(source)?.try_then(Operation::apply_profile(profile))
    }

    /// Pipeline applying the registered profile `key`.
    ///
    /// Unknown keys are rejected here, before anything runs.
    pub fn from_profile_key(
        source: Dimension,
        key: &str,
        registry: &ProfileRegistry,
    ) -> Result<Self, PipelineError> {
        Self::from_profile(source, registry.build(key)?)
    }

    /// Format of the session before any stage runs.
    pub fn with_initial_format(mut self, format: VideoFormat) -> Self {
        self.initial_format = format;
        self
    }

    /// Append `operation`; returns the priority it was assigned.
    pub fn push(&mut self, operation: Operation) -> usize {
        let priority = self.stages.len();
        self.stages.push(Stage {
            priority,
            operation,
        });
        priority
    }

    /// Builder form of [`push`](Self::push).
    pub fn then(mut self, operation: Operation) -> Self {
        self.push(operation);
        self
    }

    /// Append an operation whose construction may have failed.
    pub fn try_then(self, operation: Result<Operation, OperationError>) -> Result<Self, PipelineError> {
        Ok(self.then(operation?))
    }

    pub fn source(&self) -> Dimension {
        self.source
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Diagnostic description of every stage, in execution order.
    pub fn describe(&self) -> Vec<Map<String, Value>> {
        self.stages.iter().map(Stage::metadata).collect()
    }

    /// Open every watermark asset ahead of execution.
    ///
    /// Running a pipeline with a missing asset silently skips the watermark;
    /// callers that need it call this first to get a hard error instead.
    pub fn validate_assets(&self) -> Result<(), PipelineError> {
        for asset in self.stages.iter().filter_map(|s| s.operation.asset()) {
            let unreadable = |source| PipelineError::AssetUnreadable {
                path: asset.to_path_buf(),
                source,
            };
            let file = File::open(asset).map_err(unreadable)?;
            // Directories open fine on some platforms; reading a byte does not.
            std::io::copy(&mut file.take(1), &mut std::io::sink()).map_err(unreadable)?;
        }
        Ok(())
    }

    /// Fold every stage over a fresh session.
    pub fn run(&self) -> ExportSession {
        let initial = ExportSession::with_format(self.source, self.initial_format);
        let session = self.stages.iter().fold(initial, |session, stage| {
            if !stage.can_execute() {
                log::debug!(
                    "stage {} ({}) skipped: not applicable",
                    stage.priority,
                    stage.name()
                );
                return session;
            }
            log::debug!("stage {} ({}) on {}", stage.priority, stage.name(), session.dimension());
            stage.operation.execute(session)
        });
        log::info!(
            "planned {} → {} as {} ({} stages, {} filters)",
            self.source,
            session.dimension(),
            session.format(),
            self.stages.len(),
            session.filters().len()
        );
        session
    }

    /// Run and freeze the result.
    pub fn plan(&self) -> EncodeRequest {
        self.run().commit()
    }

    /// Run, then hand the committed plan to `encoder`.
    pub fn commit(&self, encoder: &impl Encoder) -> Result<EncodeRequest, PipelineError> {
        let request = self.plan();
        encoder.encode(&request)?;
        Ok(request)
    }
}

/// Reject a probed source with a zero axis.
pub fn check_source(source: Dimension) -> Result<(), PipelineError> {
    if source.is_empty() {
        return Err(PipelineError::EmptySource(source));
    }
    Ok(())
}

/// Resolve `profile` against `source` without building a pipeline.
pub fn resolve_source(
    source: Dimension,
    profile: &ConversionProfile,
) -> Result<Resolution, PipelineError> {
    check_source(source)?;
    Ok(profile.resolve(source))
}

/// Outcome of planning one profile in [`plan_profiles`].
#[derive(Debug)]
pub struct ProfilePlan {
    pub key: String,
    pub result: Result<EncodeRequest, PipelineError>,
}

/// Plan `source` against each profile key in parallel.
///
/// Results come back in the order of `keys`. A failing key (unknown
/// profile, for instance) does not affect the others.
pub fn plan_profiles(source: Dimension, keys: &[String], registry: &ProfileRegistry) -> Vec<ProfilePlan> {
    keys.par_iter()
        .map(|key| ProfilePlan {
            key: key.clone(),
            result: Pipeline::from_profile_key(source, key, registry).map(|p| p.plan()),
        })
        .collect()
}
