//! Langevin dynamics on image batches (through the descriptor) and on latent
//! batches (through the generator).
//!
//! Both samplers share the update
//! `x <- x - 0.5 * delta^2 * (x / refsig^2 -/+ grad) + delta * noise`;
//! the descriptor side ascends its statistic while the generator side descends
//! the reconstruction loss.

use crate::{
    common::*,
    config::Config,
    model::{Descriptor, Generator},
    objective,
};

/// Gradient of a sampling objective with respect to the sampled input,
/// evaluated at the current parameters of the network it borrows.
pub trait InputGradient {
    fn input_gradient(&self, input: &Tensor) -> Fallible<Tensor>;
}

/// The summed descriptor statistic as a function of the images.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorEnergy<'a> {
    descriptor: &'a Descriptor,
}

impl<'a> DescriptorEnergy<'a> {
    pub fn new(descriptor: &'a Descriptor) -> Self {
        Self { descriptor }
    }
}

impl InputGradient for DescriptorEnergy<'_> {
    fn input_gradient(&self, images: &Tensor) -> Fallible<Tensor> {
        let images = images.detach().set_requires_grad(true);
        let total = self.descriptor.forward(&images)?.sum(Kind::Float);
        first_gradient(Tensor::run_backward(&[&total], &[&images], false, false))
    }
}

/// The reconstruction loss of a fixed target as a function of the latents.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorReconstruction<'a> {
    generator: &'a Generator,
    target: &'a Tensor,
    sigma: f64,
}

impl<'a> GeneratorReconstruction<'a> {
    pub fn new(generator: &'a Generator, target: &'a Tensor, sigma: f64) -> Self {
        Self {
            generator,
            target,
            sigma,
        }
    }
}

impl InputGradient for GeneratorReconstruction<'_> {
    fn input_gradient(&self, latents: &Tensor) -> Fallible<Tensor> {
        let latents = latents.detach().set_requires_grad(true);
        let reconstruction = self.generator.forward_t(&latents, true)?;
        let loss = objective::reconstruction_loss(self.target, &reconstruction, self.sigma)?;
        first_gradient(Tensor::run_backward(&[&loss], &[&latents], false, false))
    }
}

fn first_gradient(grads: Vec<Tensor>) -> Fallible<Tensor> {
    grads
        .into_iter()
        .next()
        .ok_or_else(|| format_err!("autograd returned no gradient for the sampled input"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// Move up the gradient, used for the descriptor statistic.
    Ascent,
    /// Move down the gradient, used for the reconstruction loss.
    Descent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Langevin {
    pub step_size: f64,
    pub num_steps: usize,
    pub refsig: f64,
    pub drift: Drift,
}

impl Langevin {
    pub fn descriptor(config: &Config) -> Self {
        Self {
            step_size: config.des_step_size,
            num_steps: config.des_sample_steps,
            refsig: config.refsig,
            drift: Drift::Ascent,
        }
    }

    pub fn generator(config: &Config) -> Self {
        Self {
            step_size: config.gen_step_size,
            num_steps: config.gen_sample_steps,
            refsig: config.refsig,
            drift: Drift::Descent,
        }
    }

    /// One discretized Langevin move from `current`.
    pub fn update(&self, current: &Tensor, gradient: &Tensor, noise: &Tensor) -> Tensor {
        let delta = self.step_size;
        let prior = current / (self.refsig * self.refsig);
        let drift = match self.drift {
            Drift::Ascent => prior - gradient,
            Drift::Descent => prior + gradient,
        };
        current - drift * (0.5 * delta * delta) + noise * delta
    }

    /// Runs the chain with standard normal noise. `progress` receives the
    /// number of finished iterations after each one.
    pub fn run<G, F>(&self, init: &Tensor, target: &G, progress: F) -> Fallible<Tensor>
    where
        G: InputGradient + ?Sized,
        F: FnMut(usize),
    {
        self.run_with_noise(init, target, |like| like.randn_like(), progress)
    }

    pub fn run_with_noise<G, N, F>(
        &self,
        init: &Tensor,
        target: &G,
        mut noise_fn: N,
        mut progress: F,
    ) -> Fallible<Tensor>
    where
        G: InputGradient + ?Sized,
        N: FnMut(&Tensor) -> Tensor,
        F: FnMut(usize),
    {
        let mut current = init.shallow_clone();

        for iteration in 0..self.num_steps {
            let noise = noise_fn(&current);
            let gradient = target.input_gradient(&current)?;
            ensure!(
                gradient.size() == current.size(),
                "gradient shape {:?} differs from sample shape {:?}",
                gradient.size(),
                current.size()
            );
            current = tch::no_grad(|| self.update(&current, &gradient, &noise));
            progress(iteration + 1);
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NetType,
        model::{DescriptorInit, GeneratorInit},
    };

    struct ConstantGradient(Tensor);

    impl InputGradient for ConstantGradient {
        fn input_gradient(&self, _input: &Tensor) -> Fallible<Tensor> {
            Ok(self.0.shallow_clone())
        }
    }

    fn sampler(num_steps: usize, drift: Drift) -> Langevin {
        Langevin {
            step_size: 0.1,
            num_steps,
            refsig: 0.5,
            drift,
        }
    }

    #[test]
    fn zero_steps_is_identity() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let descriptor = DescriptorInit {
            net_type: NetType::Object,
            image_size: 16,
        }
        .build(vs.root())
        .unwrap();

        let images = Tensor::rand(&[2, 16, 16, 3], (Kind::Float, Device::Cpu));
        let mut calls = 0;
        let output = sampler(0, Drift::Ascent)
            .run(&images, &DescriptorEnergy::new(&descriptor), |_| calls += 1)
            .unwrap();

        assert!(output.equal(&images));
        assert_eq!(calls, 0);
    }

    #[test]
    fn generator_zero_steps_is_identity() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let generator = GeneratorInit {
            net_type: NetType::Object,
            image_size: 16,
        }
        .build(vs.root())
        .unwrap();

        let latents = Tensor::randn(&[2, 100], (Kind::Float, Device::Cpu));
        let target = Tensor::zeros(&[2, 16, 16, 3], (Kind::Float, Device::Cpu));
        let output = sampler(0, Drift::Descent)
            .run(
                &latents,
                &GeneratorReconstruction::new(&generator, &target, 0.3),
                |_| {},
            )
            .unwrap();

        assert!(output.equal(&latents));
    }

    #[test]
    fn drift_only_step() {
        let current = Tensor::of_slice(&[1.0_f32, -2.0, 0.5]);
        let gradient = Tensor::of_slice(&[0.3_f32, 0.1, -0.4]);
        let sampler = sampler(1, Drift::Ascent);

        let output = sampler
            .run_with_noise(
                &current,
                &ConstantGradient(gradient.shallow_clone()),
                |like| like.zeros_like(),
                |_| {},
            )
            .unwrap();

        // x - 0.5 * 0.01 * (x / 0.25 - g)
        let expect = &current - (&current / 0.25 - &gradient) * 0.005;
        assert!(output.allclose(&expect, 1e-6, 1e-7, false));
    }

    #[test]
    fn descent_flips_gradient_sign() {
        let current = Tensor::of_slice(&[1.0_f32, -2.0]);
        let gradient = Tensor::of_slice(&[0.3_f32, 0.1]);
        let noise = current.zeros_like();

        let output = sampler(1, Drift::Descent).update(&current, &gradient, &noise);
        let expect = &current - (&current / 0.25 + &gradient) * 0.005;
        assert!(output.allclose(&expect, 1e-6, 1e-7, false));
    }

    #[test]
    fn progress_counts_iterations() {
        let current = Tensor::zeros(&[4], (Kind::Float, Device::Cpu));
        let gradient = Tensor::ones(&[4], (Kind::Float, Device::Cpu));
        let mut seen = vec![];

        sampler(3, Drift::Ascent)
            .run(&current, &ConstantGradient(gradient), |n| seen.push(n))
            .unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn descriptor_gradient_matches_shape() {
        let vs = VarStore::new(Device::Cpu);
        let descriptor = DescriptorInit {
            net_type: NetType::Object,
            image_size: 16,
        }
        .build(vs.root())
        .unwrap();

        let images = Tensor::rand(&[3, 16, 16, 3], (Kind::Float, Device::Cpu));
        let gradient = DescriptorEnergy::new(&descriptor)
            .input_gradient(&images)
            .unwrap();

        assert_eq!(gradient.size(), images.size());
        assert!(!images.requires_grad());
        // the parameter gradients are left untouched
        assert!(vs
            .trainable_variables()
            .iter()
            .all(|var| !var.grad().defined()));
    }
}
