//! Build orchestration.
//!
//! A [`Pipeline`] runs one build: fetch the base image, compose the new
//! image, push it. It moves through [`Stage`]s strictly in order and stops at
//! the first failure, which is wrapped with the name of the stage it
//! happened in. Progress is reported to an [`Observer`].

use crate::digest::Digest;
use crate::error::{LayupError, Result};
use crate::image::Image;
use crate::mutate::{self, ConfigOverrides};
use crate::reference::Repository;
use crate::registry::{PushReport, Registry};
use chrono::{DateTime, Utc};
use log::info;
use std::fmt;
use std::path::PathBuf;


/// Where a build currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Mutating,
    Pushing,
    Done,
    Failed,
}

impl Stage {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Mutating => "mutating",
            Stage::Pushing => "pushing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress notifications emitted during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StageEntered(Stage),
    BlobSkipped { digest: Digest },
    BlobMounted { digest: Digest, from: Repository },
    BlobUploaded { digest: Digest, size: u64 },
    ManifestPushed { digest: Digest },
}

/// Receives build progress.
pub trait Observer {
    fn on_event(&self, event: &Event);
}

impl<F: Fn(&Event)> Observer for F {
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Observer for Silent {
    fn on_event(&self, _event: &Event) {}
}

/// Everything one build needs.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Base image reference, parsed when fetching starts.
    pub base: String,
    /// Destination reference, parsed when pushing starts.
    pub target: String,
    pub files: Vec<PathBuf>,
    pub overrides: ConfigOverrides,
    /// Creation time stamped into the config. `None` uses the current time.
    pub created: Option<DateTime<Utc>>,
}

impl BuildRequest {
    /// Builds a request from command-line values.
    ///
    /// `env` entries must be `KEY=VALUE`.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::pipeline::BuildRequest;
    ///
    /// let request = BuildRequest::from_cli(
    ///     "alpine:3.20",
    ///     "localhost:5000/app:v1",
    ///     vec!["./app".into()],
    ///     &["PORT=8080"],
    ///     "/app --serve",
    /// )
    /// .unwrap();
    /// assert_eq!(request.overrides.env_list(), vec!["PORT=8080"]);
    /// ```
    pub fn from_cli<S: AsRef<str>>(
        base: &str,
        target: &str,
        files: Vec<PathBuf>,
        env: &[S],
        cmd: &str,
    ) -> Result<Self> {
        Ok(Self {
            base: base.to_string(),
            target: target.to_string(),
            files,
            overrides: ConfigOverrides::from_pairs(env, cmd)?,
            created: None,
        })
    }

    /// Pins the creation time, making the resulting digest reproducible.
    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// Runs builds against a registry.
pub struct Pipeline<'a> {
    registry: &'a Registry,
    observer: &'a dyn Observer,
    state: Stage,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a Registry, observer: &'a dyn Observer) -> Self {
        Self {
            registry,
            observer,
            state: Stage::Idle,
        }
    }

    pub fn state(&self) -> Stage {
        self.state
    }

    /// Fetches, composes and pushes one image.
    ///
    /// A pipeline runs once; a second call fails without touching the
    /// registry.
    pub fn run(&mut self, request: &BuildRequest) -> Result<PushReport> {
        if self.state != Stage::Idle {
            return Err(LayupError::validation(format!(
                "Pipeline already ran (state: {})",
                self.state
            )));
        }

        self.enter(Stage::Fetching);
        let (base, source) = self.fetch(request).map_err(|e| self.fail(e))?;

        self.enter(Stage::Mutating);
        let image = self.compose(&base, request).map_err(|e| self.fail(e))?;

        self.enter(Stage::Pushing);
        let report = self.push(&image, source, request).map_err(|e| self.fail(e))?;

        self.enter(Stage::Done);
        Ok(report)
    }

    fn fetch(&self, request: &BuildRequest) -> Result<(Image, Repository)> {
        let base = self.registry.resolve(&request.base)?;
        info!("fetching base image {}", base);
        self.registry.fetch_image(&base)
    }

    fn compose(&self, base: &Image, request: &BuildRequest) -> Result<Image> {
        let created = request.created.unwrap_or_else(Utc::now);
        mutate::build(base, request.files.as_slice(), &request.overrides, created)
    }

    fn push(&self, image: &Image, source: Repository, request: &BuildRequest) -> Result<PushReport> {
        let target = self.registry.resolve(&request.target)?;
        info!("pushing {} to {}", image.digest(), target);
        self.registry
            .push_image_with(image, &[source], &target, self.observer)
    }

    fn enter(&mut self, stage: Stage) {
        info!("build stage: {}", stage);
        self.state = stage;
        self.observer.on_event(&Event::StageEntered(stage));
    }

    fn fail(&mut self, err: LayupError) -> LayupError {
        let stage = self.state;
        self.enter(Stage::Failed);
        err.in_stage(stage.to_string())
    }
}
