mod descriptor;
mod generator;
pub mod params;

pub use descriptor::{Descriptor, DescriptorInit};
pub use generator::{Generator, GeneratorInit};

use crate::common::*;

pub(crate) fn leaky_relu(xs: &Tensor) -> Tensor {
    xs.max_other(&(xs * params::LEAKY_RELU_SLOPE))
}
