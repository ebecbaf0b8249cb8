//! Persistence of learnable parameters.

use crate::nn::ParamRegistry;
use std::path::{Path, PathBuf};

/// Checkpoint name of an experiment after `epoch` completed epochs.
pub fn epoch_name(experiment: &str, epoch: usize) -> String {
    format!("{experiment}_e{epoch}")
}

/// Saves and restores every parameter of a registry under a name.
///
/// Recurrent state is not a parameter and is never stored.
pub trait CheckpointStore {
    fn save(&self, params: &ParamRegistry, name: &str) -> crate::Result<()>;

    fn load(&self, params: &mut ParamRegistry, name: &str) -> crate::Result<()>;

    fn exists(&self, name: &str) -> bool;
}

/// One `<dir>/<name>.safetensors` file per checkpoint.
#[derive(Debug, Clone)]
pub struct DirCheckpointStore {
    dir: PathBuf,
}

impl DirCheckpointStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.safetensors"))
    }
}

impl CheckpointStore for DirCheckpointStore {
    fn save(&self, params: &ParamRegistry, name: &str) -> crate::Result<()> {
        let path = self.path(name);
        params.save(&path)?;
        log::info!("saved parameters to {}", path.display());
        Ok(())
    }

    fn load(&self, params: &mut ParamRegistry, name: &str) -> crate::Result<()> {
        let path = self.path(name);
        if !path.is_file() {
            return Err(crate::Error::Checkpoint {
                name: name.to_string(),
                reason: format!("{} not found", path.display()),
            });
        }
        params.load(&path)?;
        log::info!("loaded parameters from {}", path.display());
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn epoch_names_are_suffixed() {
        assert_eq!(epoch_name("wsj", 3), "wsj_e3");
    }

    #[test]
    fn save_then_load_restores_values() {
        let dir = std::env::temp_dir().join("danet_checkpoint_unit");
        let _ = std::fs::remove_dir_all(&dir);
        let store = DirCheckpointStore::new(&dir);

        let mut reg = ParamRegistry::new(Device::Cpu);
        candle_nn::linear(3, 2, reg.scope("proj").unwrap()).unwrap();
        store.save(&reg, "unit_e1").unwrap();
        assert!(store.exists("unit_e1"));

        let var = reg.all_vars().remove(0);
        let before = var.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        var.set(&var.as_tensor().zeros_like().unwrap()).unwrap();
        store.load(&mut reg, "unit_e1").unwrap();
        let after = var.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(before, after);

        assert!(matches!(
            store.load(&mut reg, "unit_e9"),
            Err(crate::Error::Checkpoint { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
