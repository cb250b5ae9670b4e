//! Value-returning image transformations.
//!
//! Every function here takes an [`Image`] by reference and returns a new
//! one; the input is never touched, so a base image can be reused for any
//! number of builds.

use crate::archive::archive_to_vec;
use crate::error::{LayupError, Result, ResultExt};
use crate::image::Image;
use crate::layer::{Layer, TarballLayer};
use crate::oci::{Descriptor, History, RuntimeConfig};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::Arc;


/// Recorded as `created_by` in the history entry of an added layer.
pub const CREATED_BY: &str = "layup";

/// Environment and command that replace the base image's.
///
/// Both fields replace the base values wholesale: nothing of the base
/// environment or command survives [`apply_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    env: Vec<(String, String)>,
    cmd: String,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an environment variable.
    ///
    /// Variables keep the order they were first set in. Setting a name
    /// again replaces its value in place.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::mutate::ConfigOverrides;
    ///
    /// let overrides = ConfigOverrides::new()
    ///     .with_env("A", "1")
    ///     .with_env("B", "2")
    ///     .with_env("A", "3");
    /// assert_eq!(overrides.env_list(), vec!["A=3", "B=2"]);
    /// ```
    pub fn with_env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    /// Sets the command. It is stored as a single argument, not tokenized.
    pub fn with_cmd<S: Into<String>>(mut self, cmd: S) -> Self {
        self.cmd = cmd.into();
        self
    }

    /// Parses `KEY=VALUE` entries.
    ///
    /// The value may contain `=` and may be empty; the key may not.
    pub fn from_pairs<I, S>(pairs: I, cmd: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::new().with_cmd(cmd);
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                LayupError::input(format!("environment entry '{}' is not KEY=VALUE", pair))
            })?;
            if key.is_empty() {
                return Err(LayupError::input(format!(
                    "environment entry '{}' has an empty name",
                    pair
                )));
            }
            overrides = overrides.with_env(key, value);
        }
        Ok(overrides)
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// The environment rendered as config `Env` entries.
    pub fn env_list(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

/// Renders a creation time the way image configs store it.
pub fn format_created(created: DateTime<Utc>) -> String {
    created.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Returns a copy of `image` with the environment and command replaced and
/// the creation time set to `created`.
///
/// An empty environment removes `Env`. The command is always stored as a
/// single-element `Cmd`, even when empty.
pub fn apply_config(
    image: &Image,
    overrides: &ConfigOverrides,
    created: DateTime<Utc>,
) -> Result<Image> {
    let mut config = image.config_file().clone();
    let runtime = config.config.get_or_insert_with(RuntimeConfig::default);

    runtime.env = (!overrides.env.is_empty()).then(|| overrides.env_list());
    runtime.cmd = Some(vec![overrides.cmd.clone()]);
    config.created = Some(format_created(created));

    Image::compose(image.manifest().clone(), config, image.layers().to_vec())
        .stage("creating config file")
}

/// Returns a copy of `image` with `layer` appended after all existing layers.
///
/// The layer descriptor uses the gzip layer media type of the manifest's
/// family; the diff-id goes last in `rootfs.diff_ids` with a matching
/// history entry.
pub fn append_layer(image: &Image, layer: Arc<dyn Layer>) -> Result<Image> {
    let mut manifest = image.manifest().clone();
    manifest.layers.push(Descriptor::new(
        manifest.gzip_layer_media_type(),
        layer.size()?,
        layer.digest()?,
    ));

    let mut config = image.config_file().clone();
    config.rootfs.diff_ids.push(layer.diff_id()?);
    config.history.push(History {
        created: config.created.clone(),
        created_by: Some(CREATED_BY.to_string()),
        ..Default::default()
    });

    let mut layers = image.layers().to_vec();
    layers.push(layer);

    Image::compose(manifest, config, layers)
}

/// Archives `paths` into a new in-memory layer.
pub fn layer_from_files<P: AsRef<Path>>(paths: &[P]) -> Result<TarballLayer> {
    let tar = archive_to_vec(paths)?;
    log::debug!("archived {} sources into {} bytes", paths.len(), tar.len());
    Ok(TarballLayer::from_bytes(tar))
}

/// Applies `overrides` to `base`, then appends a layer holding `files`.
///
/// Config goes first so the final config's diff-ids include the new layer.
///
/// # Examples
///
/// ```no_run
/// use chrono::Utc;
/// use liblayup::mutate::{build, ConfigOverrides};
/// # fn example(base: &liblayup::Image) -> liblayup::Result<()> {
/// let overrides = ConfigOverrides::new()
///     .with_env("PORT", "8080")
///     .with_cmd("/app --serve");
/// let image = build(base, &["./app"], &overrides, Utc::now())?;
/// println!("{}", image.digest());
/// # Ok(())
/// # }
/// ```
pub fn build<P: AsRef<Path>>(
    base: &Image,
    files: &[P],
    overrides: &ConfigOverrides,
    created: DateTime<Utc>,
) -> Result<Image> {
    let configured = apply_config(base, overrides, created).stage("applying config")?;

    let layer = layer_from_files(files)
        .stage("creating tar archive")
        .stage("adding layer")?;

    append_layer(&configured, Arc::new(layer)).stage("adding layer")
}
