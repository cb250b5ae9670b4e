use crate::context::AppContext;
use crate::format::{self, BuildProgress, OutputFormatter};
use liblayup::{BuildRequest, Observer, Pipeline, PushReport, Registry, Result};
use std::path::PathBuf;


/// Values of the build flags.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub base: String,
    pub target: String,
    pub files: Vec<PathBuf>,
    pub env: Vec<String>,
    pub cmd: String,
}

impl BuildArgs {
    pub fn to_request(&self) -> Result<BuildRequest> {
        BuildRequest::from_cli(
            &self.base,
            &self.target,
            self.files.clone(),
            self.env.as_slice(),
            &self.cmd,
        )
    }
}

/// Runs one build and returns what the push did.
pub fn run_build(
    registry: &Registry,
    args: &BuildArgs,
    observer: &dyn Observer,
) -> Result<PushReport> {
    let request = args.to_request()?;
    Pipeline::new(registry, observer).run(&request)
}

/// The confirmation printed after a successful push.
pub fn summary(target: &str, report: &PushReport) -> String {
    let mut line = match &report.digest {
        Some(digest) => format!("Pushed {}@{}", target, digest),
        None => format!("Pushed {}", target),
    };
    let reused = report.skipped.len() + report.mounted.len();
    if reused > 0 {
        line.push_str(&format!(
            " ({} blobs uploaded, {} reused)",
            report.uploaded.len(),
            reused
        ));
    }
    line
}

/// Handle the build command
pub fn handle_build(ctx: &AppContext, args: &BuildArgs) {
    let formatter = format::create_formatter(ctx.color);
    let progress = BuildProgress::new(formatter.as_ref(), ctx.verbosity);

    let result = ctx
        .registry()
        .and_then(|registry| run_build(&registry, args, &progress));

    match result {
        Ok(report) => formatter.success(&summary(&args.target, &report)),
        Err(e) => {
            formatter.error(&format!("Error: {}", e));
            std::process::exit(1);
        }
    }
}
