//! Parameter exchange: model tensors as plain host arrays.
//!
//! Arrays follow the module's visiting order, which is the field declaration
//! order. Batch-norm running statistics are included.

use std::fs;
use std::path::Path;

use burn::module::{Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use chrono::{DateTime, Utc};
use fedvision_core::{Entrypoint, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One model tensor copied to host memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterArray {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl ParameterArray {
    pub fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// Ordered model tensors
pub type ParameterList = Vec<ParameterArray>;

struct ParameterCollector {
    arrays: ParameterList,
    error: Option<Error>,
}

impl<B: Backend> ModuleVisitor<B> for ParameterCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if self.error.is_some() {
            return;
        }

        let shape = tensor.dims().to_vec();
        match tensor.to_data().convert::<f32>().to_vec::<f32>() {
            Ok(values) => self.arrays.push(ParameterArray { shape, values }),
            Err(e) => {
                self.error = Some(Error::Model(format!("Failed to read tensor data: {:?}", e)));
            }
        }
    }
}

/// Copies every float tensor of `model` to host memory, in visiting order
pub fn get_model_params<B: Backend, M: Module<B>>(model: &M) -> Result<ParameterList> {
    let mut collector = ParameterCollector {
        arrays: Vec::new(),
        error: None,
    };
    model.visit(&mut collector);

    match collector.error {
        Some(error) => Err(error),
        None => Ok(collector.arrays),
    }
}

struct ParameterLoader<'a> {
    arrays: &'a [ParameterArray],
    position: usize,
    error: Option<Error>,
}

impl<B: Backend> ModuleMapper<B> for ParameterLoader<'_> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let index = self.position;
        self.position += 1;
        if self.error.is_some() {
            return tensor;
        }

        let Some(array) = self.arrays.get(index) else {
            self.error = Some(Error::ParameterMismatch(format!(
                "model has more tensors than the {} provided",
                self.arrays.len()
            )));
            return tensor;
        };

        let dims = tensor.dims();
        if array.shape != dims || array.values.len() != array.shape.iter().product::<usize>() {
            self.error = Some(Error::ParameterMismatch(format!(
                "tensor {} has shape {:?}, parameters have shape {:?} with {} values",
                index,
                dims,
                array.shape,
                array.values.len()
            )));
            return tensor;
        }

        let device = tensor.device();
        let replaced = Tensor::<B, D>::from_data(
            TensorData::new(array.values.clone(), array.shape.clone()),
            &device,
        );
        if tensor.is_require_grad() {
            replaced.require_grad()
        } else {
            replaced
        }
    }
}

/// Overwrites the tensors of `model` with `params`, in visiting order.
///
/// Fails with [`Error::ParameterMismatch`] when the count or a shape differs.
pub fn set_model_params<B: Backend, M: Module<B>>(model: M, params: &[ParameterArray]) -> Result<M> {
    let mut loader = ParameterLoader {
        arrays: params,
        position: 0,
        error: None,
    };
    let model = model.map(&mut loader);

    if let Some(error) = loader.error {
        return Err(error);
    }
    if loader.position != params.len() {
        return Err(Error::ParameterMismatch(format!(
            "model has {} tensors, {} parameters provided",
            loader.position,
            params.len()
        )));
    }
    Ok(model)
}

/// Parameters together with the model they belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterExport {
    pub entrypoint: Entrypoint,
    pub num_classes: usize,
    pub created_at: DateTime<Utc>,
    pub parameters: ParameterList,
}

impl ParameterExport {
    pub fn new(entrypoint: Entrypoint, num_classes: usize, parameters: ParameterList) -> Self {
        Self {
            entrypoint,
            num_classes,
            created_at: Utc::now(),
            parameters,
        }
    }

    pub fn total_values(&self) -> usize {
        self.parameters.iter().map(ParameterArray::num_values).sum()
    }

    /// Writes the export as JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        info!(
            "Saved {} tensors ({} values) to {}",
            self.parameters.len(),
            self.total_values(),
            path.display()
        );
        Ok(())
    }

    /// Reads an export written by [`ParameterExport::save_json`]
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Parameter file not found: {}",
                path.display()
            )));
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
