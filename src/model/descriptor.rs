use super::{leaky_relu, params};
use crate::{common::*, config::NetType};

#[derive(Debug, Clone)]
pub struct DescriptorInit {
    pub net_type: NetType,
    pub image_size: i64,
}

impl DescriptorInit {
    pub fn build<'p, P>(self, path: P) -> Fallible<Descriptor>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            net_type,
            image_size,
        } = self;

        match net_type {
            NetType::Object => {}
            _ => bail!("the descriptor for {:?} is not implemented", net_type),
        }
        ensure!(
            image_size > 0 && image_size % 4 == 0,
            "the descriptor expects an image size divisible by 4, but get {}",
            image_size
        );

        let conv_config = |padding, stride| nn::ConvConfig {
            padding,
            stride,
            ..Default::default()
        };

        // stride-2 convolutions keep "same" output sizes
        let conv1 = nn::conv2d(
            path / "conv1",
            params::IMAGE_CHANNELS,
            params::DES_CONV1_CHANNELS,
            5,
            conv_config(2, 2),
        );
        let conv2 = nn::conv2d(
            path / "conv2",
            params::DES_CONV1_CHANNELS,
            params::DES_CONV2_CHANNELS,
            3,
            conv_config(1, 2),
        );
        let conv3 = nn::conv2d(
            path / "conv3",
            params::DES_CONV2_CHANNELS,
            params::DES_CONV3_CHANNELS,
            3,
            conv_config(1, 1),
        );

        let feature_size = image_size / 4;
        let fc = nn::linear(
            path / "fc",
            params::DES_CONV3_CHANNELS * feature_size * feature_size,
            params::DES_FEATURES,
            Default::default(),
        );

        Ok(Descriptor {
            image_size,
            conv1,
            conv2,
            conv3,
            fc,
        })
    }
}

/// The energy-based scoring network.
#[derive(Debug)]
pub struct Descriptor {
    image_size: i64,
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    conv3: nn::Conv2D,
    fc: nn::Linear,
}

impl Descriptor {
    /// Scores a `[batch, height, width, 3]` image batch, one statistic per image.
    pub fn forward(&self, images: &Tensor) -> Fallible<Tensor> {
        let (batch_size, height, width, channels) = images.size4()?;
        ensure!(
            height == self.image_size
                && width == self.image_size
                && channels == params::IMAGE_CHANNELS,
            "the descriptor expects images of shape [_, {}, {}, {}], but get {:?}",
            self.image_size,
            self.image_size,
            params::IMAGE_CHANNELS,
            images.size()
        );

        let mut net = images.permute(&[0, 3, 1, 2]);
        net = leaky_relu(&net.apply(&self.conv1));
        net = leaky_relu(&net.apply(&self.conv2));
        net = leaky_relu(&net.apply(&self.conv3));
        net = net.reshape(&[batch_size, -1]).apply(&self.fc);

        Ok(net.sum_dim_intlist(&[1], false, Kind::Float))
    }

    pub fn image_size(&self) -> i64 {
        self.image_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let descriptor = DescriptorInit {
            net_type: NetType::Object,
            image_size: 32,
        }
        .build(vs.root() / "des")
        .unwrap();

        let images = Tensor::rand(&[3, 32, 32, 3], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let stats = descriptor.forward(&images).unwrap();
        assert_eq!(stats.size(), vec![3]);

        let names = vs.variables();
        assert!(names.keys().all(|name| name.starts_with("des.")));
    }

    #[test]
    fn descriptor_rejects_wrong_shape() {
        let vs = VarStore::new(Device::Cpu);
        let descriptor = DescriptorInit {
            net_type: NetType::Object,
            image_size: 32,
        }
        .build(vs.root())
        .unwrap();

        let images = Tensor::zeros(&[2, 16, 16, 3], (Kind::Float, Device::Cpu));
        assert!(descriptor.forward(&images).is_err());
    }

    #[test]
    fn unimplemented_net_types_fail() {
        let vs = VarStore::new(Device::Cpu);
        for net_type in [NetType::Texture, NetType::ObjectSmall] {
            let result = DescriptorInit {
                net_type,
                image_size: 64,
            }
            .build(vs.root());
            assert!(result.is_err());
        }
    }
}
