use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

/// Load a config from a single file.
pub fn load_cfg<T: for<'a> Deserialize<'a>>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let pb = path.as_ref().to_path_buf();
    if !pb.exists() {
        return Err(anyhow::anyhow!("file {} does not exist", pb.display()));
    }

    let cfg = Config::builder()
        .add_source(File::from(PathBuf::from(path.as_ref())))
        .build()
        .with_context(|| format!("failed to read config from {}", pb.display()))?;

    cfg.try_deserialize()
        .with_context(|| format!("failed to deserialize config from {}", pb.display()))
}

/// Merge config files in order, then environment variables on top.
/// Missing files are skipped. Nested keys use `__` in variable names,
/// e.g. `RX_SCHEDULERS__COMPUTATION_THREADS`.
pub fn load_cfg_merge<T, P>(
    paths: impl IntoIterator<Item = P>,
    env_prefix: Option<&str>,
) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let mut builder = Config::builder();

    for p in paths {
        let pb = p.as_ref().to_path_buf();
        if pb.exists() {
            builder = builder.add_source(File::from(pb));
        } else {
            tracing::warn!("config loading: file {} does not exist", pb.display());
        }
    }

    builder = match env_prefix {
        Some(prefix) => builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__"),
        ),
        None => builder.add_source(Environment::default().separator("__")),
    };

    let cfg = builder
        .build()
        .with_context(|| "failed to build configuration from provided sources")?;

    cfg.try_deserialize()
        .with_context(|| "failed to deserialize merged configuration")
}
