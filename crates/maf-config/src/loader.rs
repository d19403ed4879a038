//! Configuration loader with multi-source merging.

use std::path::{Path, PathBuf};

use crate::{Config, ConfigError, validate};

const ENV_PREFIX: &str = "MAF";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_FILE_STEM: &str = ".maf";

/// Loads the merged configuration tree.
///
/// Sources, lowest precedence first: built-in defaults, the config file,
/// environment variables (`MAF_SERVER__RAFT__NODE_ID=...`). CLI flag
/// overrides are the caller's business: mutate the returned [`Config`]
/// before handing it to [`Loader::validated`].
pub struct Loader {
    file: Option<PathBuf>,
}

impl Loader {
    pub fn new() -> Self {
        Self { file: None }
    }

    /// Use an explicit config file instead of `~/.maf.yaml`.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load and merge all sources. The result is not yet validated.
    pub fn load(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        match self.file {
            Some(path) => {
                builder = builder.add_source(
                    config::File::from(path.as_path()).format(config::FileFormat::Yaml),
                );
            }
            None => {
                if let Some(home) = std::env::var_os("HOME") {
                    let path = PathBuf::from(home).join(format!("{DEFAULT_FILE_STEM}.yaml"));
                    builder = builder.add_source(
                        config::File::from(path)
                            .required(false)
                            .format(config::FileFormat::Yaml),
                    );
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.raft.peers"),
        );

        let merged = builder.build()?;
        let cfg: Config = merged.try_deserialize()?;

        tracing::trace!("configuration merged");

        Ok(cfg)
    }

    /// Load, merge and validate in one step.
    pub fn validated(self) -> Result<Config, ConfigError> {
        let cfg = self.load()?;
        validate::run(&cfg)?;
        Ok(cfg)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
