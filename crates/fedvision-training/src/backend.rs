//! Backend selection.
//!
//! CUDA when the `cuda` feature is enabled, NdArray (CPU) otherwise.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use fedvision_core::Device;
use tracing::warn;

use crate::device::Placement;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(not(any(feature = "cuda", feature = "ndarray")))]
compile_error!("At least one backend (cuda or ndarray) must be enabled!");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Backend device type
pub type BackendDevice = <DefaultBackend as Backend>::Device;

/// Human-readable name of the compiled-in backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}

/// Maps a resolved device onto the compiled-in backend.
///
/// CUDA has no host-memory device, so the host side of the placement is
/// `CudaDevice::default()` (GPU 0). Returning a model "to the host" moves it
/// to GPU 0, not to CPU memory.
#[cfg(feature = "cuda")]
pub fn placement_for(device: Device) -> Placement<DefaultBackend> {
    let compute = match device {
        Device::Gpu(index) => burn_cuda::CudaDevice::new(index),
        Device::Cpu => {
            warn!("CUDA backend has no CPU device, using GPU 0");
            burn_cuda::CudaDevice::default()
        }
    };
    Placement::new(compute, BackendDevice::default())
}

/// Maps a resolved device onto the compiled-in backend.
///
/// The host side of the placement is the backend's default device.
#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub fn placement_for(device: Device) -> Placement<DefaultBackend> {
    if let Device::Gpu(index) = device {
        warn!(
            "GPU {} requested but {} was compiled in, running on CPU",
            index,
            backend_name()
        );
    }
    Placement::host_only(BackendDevice::default())
}
