pub mod config;
pub mod device;
pub mod dot;
pub mod error;
pub mod launch;

pub use config::{run, Backend, RunConfig};
pub use device::{
    sim::{InjectedFault, SimDevice},
    Device,
};
pub use dot::{dot_product, reference_dot, uniform_expected, verify};
pub use dot_gpu::{Reduction, MAX_THREADS_PER_BLOCK};
pub use error::{check, DotError, Stage};
pub use launch::{DeviceLimits, LaunchConfig, LaunchError};
