use candle_core::{DType, Device, Var};
use candle_nn::{VarBuilder, VarMap};
use std::path::Path;

/// Registry of every learnable parameter of a model.
///
/// Sub-modules claim a uniquely named block with [`ParamRegistry::scope`]
/// while the model is built; the variables created through the returned
/// builder live in one `VarMap`, so they can be optimized, saved and
/// restored together. Recurrent state is never stored here.
pub struct ParamRegistry {
    varmap: VarMap,
    device: Device,
    blocks: Vec<String>,
}

impl ParamRegistry {
    pub fn new(device: Device) -> Self {
        Self {
            varmap: VarMap::new(),
            device,
            blocks: Vec::new(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Claim the block `name` and return a builder whose variables are
    /// prefixed with it.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` if the block is already registered.
    pub fn scope(&mut self, name: &str) -> crate::Result<VarBuilder<'static>> {
        if self.blocks.iter().any(|b| b == name) {
            return Err(crate::Error::InvalidParameter {
                name: "parameter block",
                value: name.to_string(),
                reason: "already registered".to_string(),
            });
        }
        self.blocks.push(name.to_string());
        Ok(VarBuilder::from_varmap(&self.varmap, DType::F32, &self.device).pp(name))
    }

    /// Names of the registered blocks, in registration order.
    pub fn block_names(&self) -> &[String] {
        &self.blocks
    }

    pub fn all_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.all_vars().iter().map(|v| v.elem_count()).sum()
    }

    /// Write every parameter to a safetensors file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        if let Some(dir) = path.as_ref().parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        self.varmap.save(path)?;
        Ok(())
    }

    /// Overwrite every parameter in place from a safetensors file.
    ///
    /// Variables keep their identity, so optimizers built over
    /// [`ParamRegistry::all_vars`] see the restored values.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<()> {
        self.varmap.load(path)?;
        Ok(())
    }
}
