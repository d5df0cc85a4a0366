// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for nativetest.
//!
//! Configuration is layered: the embedded [`NativeTestConfig::DEFAULT_CONFIG`] is read first, and an
//! optional user file (by default `.config/nativetest.toml`) is merged on top of it.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    signature::SignatureDetector,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};
use tracing::warn;

/// Overall configuration for nativetest.
///
/// This is the root data structure for nativetest configuration. Construct it with
/// [`from_sources`](Self::from_sources).
#[derive(Clone, Debug)]
pub struct NativeTestConfig {
    detector: SignatureDetector,
    list_args: Vec<String>,
    report_args: Vec<String>,
    report_extension: String,
    poll_interval: Duration,
    run_timeout: Option<Duration>,
    work_dir_prefix: String,
    work_dir_parent: Option<Utf8PathBuf>,
    env: BTreeMap<String, String>,
}

impl NativeTestConfig {
    /// The default location of the config within the path: `.config/nativetest.toml`.
    pub const CONFIG_PATH: &'static str = ".config/nativetest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the given file, or if not specified from `.config/nativetest.toml`
    /// under `root`.
    ///
    /// If no config file is specified and `root` doesn't have `.config/nativetest.toml`, uses the
    /// default config options. A relative `work-dir-parent` is resolved against `root`.
    pub fn from_sources(
        root: impl AsRef<Utf8Path>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(root.as_ref(), config_file, |config_file, unknown| {
            let mut unknown_str = String::new();
            if unknown.len() == 1 {
                // Print this on the same line.
                unknown_str.push(' ');
                unknown_str.extend(unknown.iter().next().map(String::as_str));
            } else {
                for ignored_key in unknown {
                    unknown_str.push_str("\n  - ");
                    unknown_str.push_str(ignored_key);
                }
            }

            warn!("ignoring unknown configuration keys in config file {config_file}:{unknown_str}")
        })
    }

    // A custom unknown_callback can be passed in while testing.
    fn from_sources_impl(
        root: &Utf8Path,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        deserialized
            .into_config(root)
            .map_err(|kind| ConfigParseError::new(config_file, kind))
    }

    /// Returns the default config.
    #[cfg(test)]
    pub(crate) fn default_config() -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let mut unknown = BTreeSet::new();
        let deserialized: NativeTestConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("default config is always valid");

        // The default config is embedded in the binary, so it must not contain unknown keys.
        assert!(
            unknown.is_empty(),
            "found unknown keys in default config: {unknown:?}"
        );

        deserialized
            .into_config(Utf8Path::new("."))
            .expect("default config is always valid")
    }

    /// Returns the detector used to recognize compatible executables.
    pub fn detector(&self) -> &SignatureDetector {
        &self.detector
    }

    /// Returns the arguments used to list the tests in an executable.
    pub fn list_args(&self) -> &[String] {
        &self.list_args
    }

    /// Returns the arguments used to run the tests in an executable and write reports.
    pub fn report_args(&self) -> &[String] {
        &self.report_args
    }

    /// Returns the file extension of reports, without the leading `.`.
    pub fn report_extension(&self) -> &str {
        &self.report_extension
    }

    /// Returns how often running executables are checked on.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the timeout after which a batch run is cancelled, if one is configured.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout
    }

    /// Returns the prefix for per-run working directories.
    pub fn work_dir_prefix(&self) -> &str {
        &self.work_dir_prefix
    }

    /// Returns the directory that per-run working directories are created in, if configured.
    ///
    /// If this is `None`, the system temporary directory is used.
    pub fn work_dir_parent(&self) -> Option<&Utf8Path> {
        self.work_dir_parent.as_deref()
    }

    /// Returns extra environment variables passed to executables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(NativeTestConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: NativeTestConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already tracks the key, so drop it from the config error.
                let path = error.path().clone();
                let config_error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path,
                    config_error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NativeTestConfigDeserialize {
    signature: String,
    read_chunk_size: usize,
    list_args: Vec<String>,
    report_args: Vec<String>,
    report_extension: String,
    #[serde(with = "humantime_serde")]
    poll_interval: Duration,
    #[serde(default, with = "humantime_serde")]
    run_timeout: Option<Duration>,
    work_dir_prefix: String,
    #[serde(default)]
    work_dir_parent: Option<Utf8PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

impl NativeTestConfigDeserialize {
    fn into_config(self, root: &Utf8Path) -> Result<NativeTestConfig, ConfigParseErrorKind> {
        let detector = SignatureDetector::new(self.signature, self.read_chunk_size)
            .map_err(ConfigParseErrorKind::InvalidDetector)?;
        if self.poll_interval.is_zero() {
            return Err(ConfigParseErrorKind::ZeroPollInterval);
        }

        Ok(NativeTestConfig {
            detector,
            list_args: self.list_args,
            report_args: self.report_args,
            report_extension: self.report_extension,
            poll_interval: self.poll_interval,
            run_timeout: self.run_timeout,
            work_dir_prefix: self.work_dir_prefix,
            work_dir_parent: self.work_dir_parent.map(|parent| root.join(parent)),
            env: self.env,
        })
    }
}
