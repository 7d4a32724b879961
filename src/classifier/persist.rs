//! On-disk layout of a saved classifier.
//!
//! ```text
//! <dir>/blob_nn_model/
//!     model.json            network weights and topology
//!     metadata.json         labels and input preparation
//!     model_acc, model_loss, model_f1, model_val_*   one value per line
//!     best_params.json      winning hyperparameter record
//!     trial_history.json    every search trial
//! ```
//!
//! Each artifact is optional and loaded independently.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::network::{HyperparameterRecord, ModelMetadata, Network};
use crate::search::Study;
use crate::train::TrainingHistory;

pub const MODEL_DIR: &str = "blob_nn_model";
const MODEL_FILE: &str = "model.json";
const METADATA_FILE: &str = "metadata.json";
const HISTORY_PREFIX: &str = "model";
const BEST_PARAMS_FILE: &str = "best_params.json";
const TRIALS_FILE: &str = "trial_history.json";

/// Which artifacts a load restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub model: bool,
    pub trial_history: bool,
    pub best_params: bool,
}

impl LoadReport {
    pub fn is_empty(&self) -> bool {
        !(self.model || self.trial_history || self.best_params)
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [(self.model, "model"), (self.trial_history, "trial_history"), (self.best_params, "best_params")]
            .into_iter()
            .filter_map(|(ok, name)| ok.then_some(name))
            .collect();
        if names.is_empty() {
            f.write_str("nothing")
        } else {
            f.write_str(&names.join(", "))
        }
    }
}

/// Everything a classifier can persist. Absent fields are skipped on save.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub model: Option<(Network, ModelMetadata)>,
    pub history: Option<TrainingHistory>,
    pub best_params: Option<HyperparameterRecord>,
    pub study: Option<Study>,
}

/// Creates `dir/blob_nn_model`, replacing an existing one only when
/// `overwrite` is set, and writes every present artifact into it.
pub fn save_artifacts(dir: &Path, overwrite: bool, artifacts: &Artifacts) -> Result<PathBuf> {
    let path = dir.join(MODEL_DIR);
    if path.exists() {
        if !overwrite {
            return Err(Error::ArtifactExists(path.display().to_string()));
        }
        std::fs::remove_dir_all(&path)?;
    }
    std::fs::create_dir_all(&path)?;

    if let Some((network, metadata)) = &artifacts.model {
        network.save_json(path.join(MODEL_FILE))?;
        metadata.save_json(path.join(METADATA_FILE))?;
    }
    if let Some(history) = &artifacts.history {
        history.write_series(&path, HISTORY_PREFIX)?;
    }
    if let Some(record) = &artifacts.best_params {
        record.save_json(path.join(BEST_PARAMS_FILE))?;
    }
    if let Some(study) = &artifacts.study {
        study.save_json(path.join(TRIALS_FILE))?;
    }
    info!("files saved in {}", path.display());
    Ok(path)
}

fn optional<T>(what: &str, path: &Path, load: impl FnOnce(&Path) -> Result<T>) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match load(path) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("could not load {what} from {}: {e}", path.display());
            None
        }
    }
}

/// Reads whatever artifacts exist under `dir/blob_nn_model`. Missing or
/// unreadable files leave their slot empty.
pub fn load_artifacts(dir: &Path) -> (Artifacts, LoadReport) {
    let path = dir.join(MODEL_DIR);
    let network = optional("model", &path.join(MODEL_FILE), |p| Network::load_json(p));
    let metadata = optional("metadata", &path.join(METADATA_FILE), |p| ModelMetadata::load_json(p));
    let history = path
        .join(format!("{HISTORY_PREFIX}_loss"))
        .exists()
        .then(|| optional("history", &path, |p| TrainingHistory::read_series(p, HISTORY_PREFIX)))
        .flatten();
    let best_params = optional("best params", &path.join(BEST_PARAMS_FILE), |p| HyperparameterRecord::load_json(p));
    let study = optional("trial history", &path.join(TRIALS_FILE), |p| Study::load_json(p));

    let report = LoadReport { model: network.is_some(), trial_history: study.is_some(), best_params: best_params.is_some() };
    info!("loaded {report} from {}", path.display());
    let artifacts = Artifacts {
        model: network.map(|n| (n, metadata.unwrap_or_default())),
        history,
        best_params,
        study,
    };
    (artifacts, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Architecture;

    #[test]
    fn refuses_to_clobber_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts { best_params: Some(HyperparameterRecord::base(Architecture::Depth2)), ..Default::default() };
        save_artifacts(dir.path(), false, &artifacts).unwrap();
        let err = save_artifacts(dir.path(), false, &artifacts).unwrap_err();
        assert!(matches!(err, Error::ArtifactExists(_)));
        save_artifacts(dir.path(), true, &artifacts).unwrap();
    }

    #[test]
    fn partial_artifacts_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let record = HyperparameterRecord::base(Architecture::Depth3);
        save_artifacts(dir.path(), false, &Artifacts { best_params: Some(record.clone()), ..Default::default() }).unwrap();
        std::fs::write(dir.path().join(MODEL_DIR).join(TRIALS_FILE), "not json").unwrap();

        let (artifacts, report) = load_artifacts(dir.path());
        assert_eq!(report, LoadReport { model: false, trial_history: false, best_params: true });
        assert_eq!(artifacts.best_params, Some(record));
        assert_eq!(report.to_string(), "best_params");
    }

    #[test]
    fn missing_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (_, report) = load_artifacts(dir.path());
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "nothing");
    }
}
