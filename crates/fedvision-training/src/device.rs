//! Compute/host placement of a model and the residency scope that moves it.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use burn::module::Module;
use burn::tensor::backend::{AutodiffBackend, Backend};
use tracing::debug;

/// The compute device of a train/eval call and the host device models rest on
#[derive(Debug, Clone)]
pub struct Placement<B: Backend> {
    pub device: B::Device,
    pub host: B::Device,
}

impl<B: Backend> Placement<B> {
    pub fn new(device: B::Device, host: B::Device) -> Self {
        Self { device, host }
    }

    /// Placement that computes on the host itself
    pub fn host_only(host: B::Device) -> Self {
        Self {
            device: host.clone(),
            host,
        }
    }
}

impl<B: AutodiffBackend> Placement<B> {
    /// Same devices, addressed through the inference backend
    pub fn inner(&self) -> Placement<B::InnerBackend> {
        Placement {
            device: self.device.clone(),
            host: self.host.clone(),
        }
    }
}

/// Keeps a model on the compute device while alive.
///
/// Construction forks the model to `placement.device`; dropping the guard
/// forks it back to `placement.host`, on every exit path.
pub struct DeviceResidency<'a, B: Backend, M: Module<B>> {
    model: &'a mut M,
    host: B::Device,
    _backend: PhantomData<B>,
}

impl<'a, B: Backend, M: Module<B>> DeviceResidency<'a, B, M> {
    pub fn new(model: &'a mut M, placement: &Placement<B>) -> Self {
        debug!("Moving model to {:?}", placement.device);
        *model = model.clone().fork(&placement.device);
        Self {
            model,
            host: placement.host.clone(),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend, M: Module<B>> Deref for DeviceResidency<'_, B, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model
    }
}

impl<B: Backend, M: Module<B>> DerefMut for DeviceResidency<'_, B, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.model
    }
}

impl<B: Backend, M: Module<B>> Drop for DeviceResidency<'_, B, M> {
    fn drop(&mut self) {
        debug!("Returning model to {:?}", self.host);
        *self.model = self.model.clone().fork(&self.host);
    }
}
