//! Loading a project directory into pipeline inputs.

use localpkg_core::discover::{read_manifests, scan, SourceSet};
use localpkg_core::pipeline::ManifestFailure;
use localpkg_core::{Bundler, DefaultDelivery, Error, ManifestSource, Pipeline, PipelineConfig, SourceFile};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "localpkg.json";

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultArg {
    Import,
    Script,
}

impl From<DefaultArg> for DefaultDelivery {
    fn from(value: DefaultArg) -> Self {
        match value {
            DefaultArg::Import => Self::Import,
            DefaultArg::Script => Self::Script,
        }
    }
}

/// Flags shared by every command that runs discovery and partitioning.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PassArgs {
    /// Output directory, relative to the working directory
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Also bundle packages marked "private": true
    #[arg(long)]
    pub include_private: bool,

    /// Package-name globs to leave out (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Bundle the `default` condition as a module or as a classic script
    #[arg(long, value_enum)]
    pub exports_default: Option<DefaultArg>,
}

impl PassArgs {
    /// Apply flags on top of file configuration. Flags only ever add.
    pub fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(out_dir) = &self.out_dir {
            config.out_dir.clone_from(out_dir);
        }
        if self.include_private {
            config.include_private = true;
        }
        config.exclude.extend(self.exclude.iter().cloned());
        if let Some(delivery) = self.exports_default {
            config.exports_default = Some(delivery.into());
        }
        config
    }
}

/// Resolve the config file to use, if any.
fn config_file(cwd: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) if path.is_absolute() => Some(path.to_path_buf()),
        Some(path) => Some(cwd.join(path)),
        None => {
            let candidate = cwd.join(DEFAULT_CONFIG);
            candidate.is_file().then_some(candidate)
        }
    }
}

/// Everything read from disk for one pass.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: PipelineConfig,
    pub sources: SourceSet,
    pub manifests: Vec<ManifestSource>,
    /// Manifests that could not be read.
    pub read_failures: Vec<ManifestFailure>,
}

impl Project {
    pub fn load(cwd: &Path, config_path: Option<&Path>, pass: &PassArgs) -> Result<Self, Error> {
        let config = match config_file(cwd, config_path) {
            Some(path) => {
                debug!(config = %path.display(), "Loading pipeline config");
                PipelineConfig::load(&path)?
            }
            None => PipelineConfig::default(),
        };
        let config = pass.apply(config);

        let sources = scan(cwd, &config.out_dir)?;
        let (manifests, errors) = read_manifests(cwd, &sources.manifests);
        let read_failures = errors
            .iter()
            .map(|err| {
                warn!(manifest = %err.path().display(), code = err.code(), error = %err, "Skipping manifest");
                ManifestFailure::from(err)
            })
            .collect();

        Ok(Self {
            root: cwd.to_path_buf(),
            config,
            sources,
            manifests,
            read_failures,
        })
    }

    /// Candidate files for the pass.
    pub fn source_files(&self) -> Vec<SourceFile> {
        self.sources
            .source_files(self.config.overrides.sourcemap.unwrap_or(false))
    }

    pub fn pipeline<B: Bundler>(&self, bundler: B) -> Pipeline<B> {
        Pipeline::new(bundler, self.config.clone())
    }
}
