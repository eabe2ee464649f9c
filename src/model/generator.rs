use super::{leaky_relu, params};
use crate::{common::*, config::NetType};

#[derive(Debug, Clone)]
pub struct GeneratorInit {
    pub net_type: NetType,
    pub image_size: i64,
}

impl GeneratorInit {
    pub fn build<'p, P>(self, path: P) -> Fallible<Generator>
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
            _ => bail!("the generator for {:?} is not implemented", net_type),
        }
        ensure!(
            image_size > 0 && image_size % 16 == 0,
            "the generator expects an image size divisible by 16, but get {}",
            image_size
        );

        let latent_dim = net_type.latent_dim();
        let kernel_size = params::GEN_KERNEL_SIZE;

        // 1x1 -> image_size/16 without padding
        let convt1 = nn::conv_transpose2d(
            path / "convt1",
            latent_dim,
            params::GEN_CONVT1_CHANNELS,
            image_size / 16,
            Default::default(),
        );

        // each of the following doubles the spatial size
        let upsample_config = nn::ConvTransposeConfig {
            stride: 2,
            padding: (kernel_size - 1) / 2,
            output_padding: 1,
            ..Default::default()
        };
        let convt2 = nn::conv_transpose2d(
            path / "convt2",
            params::GEN_CONVT1_CHANNELS,
            params::GEN_CONVT2_CHANNELS,
            kernel_size,
            upsample_config,
        );
        let convt3 = nn::conv_transpose2d(
            path / "convt3",
            params::GEN_CONVT2_CHANNELS,
            params::GEN_CONVT3_CHANNELS,
            kernel_size,
            upsample_config,
        );
        let convt4 = nn::conv_transpose2d(
            path / "convt4",
            params::GEN_CONVT3_CHANNELS,
            params::GEN_CONVT4_CHANNELS,
            kernel_size,
            upsample_config,
        );
        let convt5 = nn::conv_transpose2d(
            path / "convt5",
            params::GEN_CONVT4_CHANNELS,
            params::IMAGE_CHANNELS,
            kernel_size,
            upsample_config,
        );

        let bn1 = batch_norm(path / "bn1", params::GEN_CONVT1_CHANNELS);
        let bn2 = batch_norm(path / "bn2", params::GEN_CONVT2_CHANNELS);
        let bn3 = batch_norm(path / "bn3", params::GEN_CONVT3_CHANNELS);
        let bn4 = batch_norm(path / "bn4", params::GEN_CONVT4_CHANNELS);

        Ok(Generator {
            image_size,
            latent_dim,
            convt1,
            convt2,
            convt3,
            convt4,
            convt5,
            bn1,
            bn2,
            bn3,
            bn4,
        })
    }
}

fn batch_norm<'p, P>(path: P, channels: i64) -> nn::BatchNorm
where
    P: Borrow<nn::Path<'p>>,
{
    nn::batch_norm2d(
        path,
        channels,
        nn::BatchNormConfig {
            eps: params::GEN_BATCH_NORM_EPS,
            ..Default::default()
        },
    )
}

/// The latent-to-image synthesis network.
#[derive(Debug)]
pub struct Generator {
    image_size: i64,
    latent_dim: i64,
    convt1: nn::ConvTranspose2D,
    convt2: nn::ConvTranspose2D,
    convt3: nn::ConvTranspose2D,
    convt4: nn::ConvTranspose2D,
    convt5: nn::ConvTranspose2D,
    bn1: nn::BatchNorm,
    bn2: nn::BatchNorm,
    bn3: nn::BatchNorm,
    bn4: nn::BatchNorm,
}

impl Generator {
    /// Maps `[batch, latent_dim]` codes to `[batch, height, width, 3]` images in `[-1, 1]`.
    pub fn forward_t(&self, latents: &Tensor, train: bool) -> Fallible<Tensor> {
        let (batch_size, latent_dim) = latents.size2()?;
        ensure!(
            latent_dim == self.latent_dim,
            "the generator expects latent vectors of size {}, but get {}",
            self.latent_dim,
            latent_dim
        );

        let mut net = latents.reshape(&[batch_size, latent_dim, 1, 1]);
        net = leaky_relu(&net.apply(&self.convt1).apply_t(&self.bn1, train));
        net = leaky_relu(&net.apply(&self.convt2).apply_t(&self.bn2, train));
        net = leaky_relu(&net.apply(&self.convt3).apply_t(&self.bn3, train));
        net = leaky_relu(&net.apply(&self.convt4).apply_t(&self.bn4, train));
        net = net.apply(&self.convt5).tanh();

        debug_assert_eq!(
            net.size(),
            vec![
                batch_size,
                params::IMAGE_CHANNELS,
                self.image_size,
                self.image_size
            ]
        );

        Ok(net.permute(&[0, 2, 3, 1]))
    }

    pub fn image_size(&self) -> i64 {
        self.image_size
    }

    pub fn latent_dim(&self) -> i64 {
        self.latent_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(vs: &VarStore) -> Generator {
        GeneratorInit {
            net_type: NetType::Object,
            image_size: 32,
        }
        .build(vs.root() / "gen")
        .unwrap()
    }

    #[test]
    fn generator_output_shape_and_range() {
        let vs = VarStore::new(Device::Cpu);
        let generator = generator(&vs);

        let latents = Tensor::randn(&[4, 100], (Kind::Float, Device::Cpu));
        let images = generator.forward_t(&latents, true).unwrap();
        assert_eq!(images.size(), vec![4, 32, 32, 3]);
        assert!(images.abs().max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn generator_is_deterministic() {
        tch::manual_seed(7);
        let vs = VarStore::new(Device::Cpu);
        let generator = generator(&vs);

        let latents = Tensor::randn(&[4, 100], (Kind::Float, Device::Cpu));
        let first = generator.forward_t(&latents, true).unwrap();
        let second = generator.forward_t(&latents, true).unwrap();
        assert!(first.equal(&second));

        let first = generator.forward_t(&latents, false).unwrap();
        let second = generator.forward_t(&latents, false).unwrap();
        assert!(first.equal(&second));
    }

    #[test]
    fn generator_rejects_wrong_latent_size() {
        let vs = VarStore::new(Device::Cpu);
        let generator = generator(&vs);

        let latents = Tensor::randn(&[4, 49], (Kind::Float, Device::Cpu));
        assert!(generator.forward_t(&latents, true).is_err());
    }

    #[test]
    fn batch_norm_epsilon() {
        let vs = VarStore::new(Device::Cpu);
        let bn = batch_norm(vs.root() / "bn", 1);

        // batch variance 1e-4 is comparable to the epsilon
        let xs = Tensor::of_slice(&[0.01_f32, -0.01]).reshape(&[2, 1, 1, 1]);
        let ys = xs.apply_t(&bn, true);
        let expect = 0.01 / (1e-4_f64 + params::GEN_BATCH_NORM_EPS).sqrt();
        assert!((ys.double_value(&[0, 0, 0, 0]) - expect).abs() < 1e-3);
        assert!((ys.double_value(&[1, 0, 0, 0]) + expect).abs() < 1e-3);
    }

    #[test]
    fn generator_rejects_texture() {
        let vs = VarStore::new(Device::Cpu);
        let result = GeneratorInit {
            net_type: NetType::Texture,
            image_size: 64,
        }
        .build(vs.root());
        assert!(result.is_err());
    }
}
