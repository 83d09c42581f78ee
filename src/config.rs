//! Checkpoint configuration.
//!
//! Loadable from JSON; every field falls back to its default when omitted.

use crate::checkpoint_error::CheckpointError;
use crate::io::{ContainerBackend, DefaultBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables shared by [`Checkpointer`](crate::io::checkpoint::Checkpointer)
/// dump and restore calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Extension of the shared container file, without the dot. Defaults to
    /// the default backend's extension (`h5` with the `hdf5` feature).
    pub container_extension: String,
    /// Extension of the descriptor sidecar, without the dot.
    pub sidecar_extension: String,
    /// Whether a dump also emits the descriptor sidecar.
    pub emit_sidecar: bool,
    /// Run the layout transform on the rayon pool (needs the `rayon` feature).
    pub parallel_transform: bool,
    /// Log local and global buffer sizes on rank 0 before a dump.
    pub report_allocation: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::for_backend::<DefaultBackend>()
    }
}

impl CheckpointConfig {
    /// Defaults with `Bk`'s container extension.
    pub fn for_backend<Bk: ContainerBackend>() -> Self {
        Self {
            container_extension: Bk::EXTENSION.into(),
            sidecar_extension: "xmf".into(),
            emit_sidecar: true,
            parallel_transform: true,
            report_allocation: true,
        }
    }

    /// Parse a configuration from a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, CheckpointError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| CheckpointError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Builder-style override of [`Self::emit_sidecar`].
    pub fn with_sidecar(mut self, emit: bool) -> Self {
        self.emit_sidecar = emit;
        self
    }

    pub fn validate(&self) -> Result<(), CheckpointError> {
        for (field, ext) in [
            ("container_extension", &self.container_extension),
            ("sidecar_extension", &self.sidecar_extension),
        ] {
            if ext.is_empty() {
                return Err(CheckpointError::Config(format!("{field} must not be empty")));
            }
            if ext.contains(['/', '\\', '.']) {
                return Err(CheckpointError::Config(format!(
                    "{field} `{ext}` must be a bare extension"
                )));
            }
        }
        if self.container_extension == self.sidecar_extension {
            return Err(CheckpointError::Config(
                "container and sidecar extensions must differ".into(),
            ));
        }
        Ok(())
    }

    /// `<dir>/<stem>.<container_extension>`
    pub fn container_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(self.container_file_name(stem))
    }

    /// `<stem>.<container_extension>`, the name the sidecar refers to.
    pub fn container_file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.container_extension)
    }

    /// `<dir>/<stem>.<sidecar_extension>`
    pub fn sidecar_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{stem}.{}", self.sidecar_extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = CheckpointConfig::from_json_str(r#"{ "emit_sidecar": false }"#).unwrap();
        assert!(!cfg.emit_sidecar);
        assert_eq!(cfg.container_extension, DefaultBackend::EXTENSION);
        assert_eq!(cfg.sidecar_extension, "xmf");
    }

    #[test]
    fn rejects_clashing_extensions() {
        let err = CheckpointConfig::from_json_str(
            r#"{ "container_extension": "xmf", "sidecar_extension": "xmf" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CheckpointError::Config(_)));
    }

    #[test]
    fn rejects_dotted_extension() {
        let cfg = CheckpointConfig {
            container_extension: ".h5".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn paths_join_stem_and_extension() {
        let cfg = CheckpointConfig::for_backend::<crate::io::native::NativeBackend>();
        let dir = Path::new("/scratch/run");
        assert_eq!(
            cfg.container_path(dir, "field_000"),
            PathBuf::from("/scratch/run/field_000.ckpt")
        );
        assert_eq!(
            cfg.sidecar_path(dir, "field_000"),
            PathBuf::from("/scratch/run/field_000.xmf")
        );
    }

    #[cfg(feature = "hdf5")]
    #[test]
    fn hdf5_is_the_default_container() {
        let cfg = CheckpointConfig::default();
        assert_eq!(cfg.container_file_name("run"), "run.h5");
    }
}
