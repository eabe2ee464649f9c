use crate::{
    checkpoint,
    common::*,
    config::Config,
    dataset::ImageDataset,
    langevin::{DescriptorEnergy, GeneratorReconstruction, Langevin},
    metrics::{Diagnostics, SummaryWriter},
    model::{Descriptor, DescriptorInit, Generator, GeneratorInit},
    model::params,
    objective, visualize,
};

/// Tensors produced by one cooperative training step.
#[derive(Debug)]
pub struct StepOutput {
    /// Raw generator samples.
    pub g_res: Tensor,
    /// Samples refined by the descriptor.
    pub syn: Tensor,
    /// Latents refined toward `syn`.
    pub latents: Tensor,
    pub des_loss: f64,
    pub gen_loss: f64,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct CoopTrainer {
    config: Config,
    #[derivative(Debug = "ignore")]
    des_vs: VarStore,
    #[derivative(Debug = "ignore")]
    gen_vs: VarStore,
    descriptor: Descriptor,
    generator: Generator,
    #[derivative(Debug = "ignore")]
    des_optimizer: nn::Optimizer,
    #[derivative(Debug = "ignore")]
    gen_optimizer: nn::Optimizer,
    des_sampler: Langevin,
    gen_sampler: Langevin,
    diagnostics: Diagnostics,
    sample_buffer: Tensor,
}

impl CoopTrainer {
    pub fn new(config: Config) -> Fallible<Self> {
        config.validate()?;
        let device = config.device;

        let des_vs = VarStore::new(device);
        let gen_vs = VarStore::new(device);

        let descriptor = DescriptorInit {
            net_type: config.net_type,
            image_size: config.image_size,
        }
        .build(des_vs.root() / "des")?;
        let generator = GeneratorInit {
            net_type: config.net_type,
            image_size: config.image_size,
        }
        .build(gen_vs.root() / "gen")?;

        let des_optimizer = nn::Adam {
            beta1: config.beta1,
            ..Default::default()
        }
        .build(&des_vs, config.d_lr)?;
        let gen_optimizer = nn::Adam {
            beta1: config.beta1,
            ..Default::default()
        }
        .build(&gen_vs, config.g_lr)?;

        let des_sampler = Langevin::descriptor(&config);
        let gen_sampler = Langevin::generator(&config);
        let sample_buffer = Tensor::zeros(
            &[0, config.image_size, config.image_size, 3],
            (Kind::Float, device),
        );

        Ok(Self {
            config,
            des_vs,
            gen_vs,
            descriptor,
            generator,
            des_optimizer,
            gen_optimizer,
            des_sampler,
            gen_sampler,
            diagnostics: Diagnostics::default(),
            sample_buffer,
        })
    }

    /// Runs one cooperative step on the observed batch `obs`.
    ///
    /// `progress` receives the number of finished Langevin iterations within
    /// this step, descriptor iterations first.
    pub fn train_step<F>(
        &mut self,
        batch_index: usize,
        obs: &Tensor,
        mut progress: F,
    ) -> Fallible<StepOutput>
    where
        F: FnMut(usize),
    {
        let Config {
            image_size,
            sigma,
            device,
            ..
        } = self.config;
        let num_chains = self.config.num_chains();
        let latent_dim = self.config.latent_dim();

        {
            let (num_obs, height, width, channels) = obs.size4()?;
            ensure!(
                num_obs > 0 && height == image_size && width == image_size && channels == 3,
                "expect observed images of shape [_, {}, {}, 3], but get {:?}",
                image_size,
                image_size,
                obs.size()
            );
        }
        let obs = obs.to_device(device);

        // G0: propose
        let latents = Tensor::randn(&[num_chains, latent_dim], (Kind::Float, device));
        let g_res = tch::no_grad(|| self.generator.forward_t(&latents, true))?;

        // D1: refine the proposal through the descriptor
        let syn = self.des_sampler.run(
            &g_res,
            &DescriptorEnergy::new(&self.descriptor),
            |step| progress(step),
        )?;

        // G1: explain the refined images with the latents
        let des_steps = self.des_sampler.num_steps;
        let latents = self.gen_sampler.run(
            &latents,
            &GeneratorReconstruction::new(&self.generator, &syn, sigma),
            |step| progress(des_steps + step),
        )?;

        // D2: descriptor update
        let des_loss = {
            let syn_stats = self.descriptor.forward(&syn)?;
            let obs_stats = self.descriptor.forward(&obs)?;
            objective::descriptor_loss(&syn_stats, &obs_stats)
        };
        self.des_optimizer.backward_step(&des_loss);
        // reported per descriptor feature
        let des_loss = des_loss.double_value(&[]) / params::DES_FEATURES as f64;
        self.diagnostics.des_loss.update(des_loss);

        // G2: generator update, with syn standing in for the observation
        let (gen_loss, pixels_per_image) = {
            let reconstruction = self.generator.forward_t(&latents, true)?;
            let pixels_per_image = reconstruction.numel() as f64 / num_chains as f64;
            let loss = objective::reconstruction_loss(&syn, &reconstruction, sigma)?;
            (loss, pixels_per_image)
        };
        self.gen_optimizer.backward_step(&gen_loss);
        let gen_loss = gen_loss.double_value(&[]) / pixels_per_image;
        self.diagnostics.gen_loss.update(gen_loss);

        // diagnostics
        self.diagnostics.recon_err.update(
            &syn.mean_dim(&[0], false, Kind::Float),
            &obs.mean_dim(&[0], false, Kind::Float),
        )?;
        self.store_samples(batch_index, &syn)?;

        Ok(StepOutput {
            g_res,
            syn,
            latents,
            des_loss,
            gen_loss,
        })
    }

    /// Runs the epoch loop over the dataset. `interrupted` is checked between
    /// epochs.
    pub fn train(&mut self, dataset: &ImageDataset, interrupted: &AtomicBool) -> Fallible<()> {
        let image_size = self.config.image_size;
        ensure!(
            dataset.image_size() == image_size,
            "the dataset has image size {}, but the model expects {}",
            dataset.image_size(),
            image_size
        );

        let batch_size = self.config.batch_size.get();
        let log_step = self.config.log_step.get();
        let tile_cols = self.config.tile_cols.get();
        let num_chains = self.config.num_chains();
        let num_batches = dataset.num_batches(batch_size);
        let steps_per_batch = self.des_sampler.num_steps + self.gen_sampler.num_steps;
        let total_steps = num_batches * steps_per_batch;

        self.sample_buffer = Tensor::randn(
            &[num_chains * num_batches as i64, image_size, image_size, 3],
            (Kind::Float, self.config.device),
        );

        let log_dir = self.config.log_dir();
        if log_dir.exists() {
            fs::remove_dir_all(&log_dir)?;
        }
        fs::create_dir_all(&log_dir)?;
        let mut summary_writer = SummaryWriter::create(log_dir.join("summary.jsonl"))?;

        let sample_dir = self.config.sample_dir();
        let model_dir = self.config.model_dir();

        for epoch in 0..self.config.num_epochs {
            if interrupted.load(Ordering::SeqCst) {
                warn!("training is interrupted before epoch {}", epoch);
                break;
            }

            let epoch_instant = Instant::now();
            let is_log_epoch = epoch % log_step == 0;

            for batch_index in 0..num_batches {
                let start = batch_index * batch_size;
                let end = dataset.len().min(start + batch_size);
                let obs = dataset.slice(start, end)?;

                let base = batch_index * steps_per_batch;
                let output = self.train_step(batch_index, &obs, |step| {
                    debug!(
                        "epoch #{} sampling {}/{}",
                        epoch,
                        base + step,
                        total_steps
                    );
                })?;

                if batch_index == 0 && is_log_epoch {
                    let des_path = sample_dir.join(format!("des{:03}.png", epoch));
                    let gen_path = sample_dir.join(format!("gen{:03}.png", epoch));
                    visualize::save_tiled(&output.syn, &des_path, tile_cols)?;
                    visualize::save_tiled(&output.g_res, &gen_path, tile_cols)?;
                    info!("saved samples to {}", sample_dir.display());
                }
            }

            let summary = self.diagnostics.summary(epoch);
            info!(
                "epoch #{}, descriptor loss: {:.4}, generator loss: {:.4}, avg MSE: {:.4}, elapsed: {}s",
                epoch,
                summary.des_loss,
                summary.gen_loss,
                summary.recon_err,
                epoch_instant.elapsed().as_secs()
            );
            summary_writer.append(&summary)?;

            if is_log_epoch {
                let path = checkpoint::save_checkpoint(
                    &model_dir,
                    epoch,
                    &[&self.des_vs, &self.gen_vs],
                    &summary,
                )?;
                info!("saved checkpoint {}", path.display());
            }
        }

        Ok(())
    }

    fn store_samples(&mut self, batch_index: usize, syn: &Tensor) -> Fallible<()> {
        let num_samples = syn.size()[0];
        let offset = batch_index as i64 * num_samples;
        let required = offset + num_samples;
        let available = self.sample_buffer.size()[0];

        if available < required {
            let (_, height, width, channels) = syn.size4()?;
            let extra = Tensor::randn(
                &[required - available, height, width, channels],
                (Kind::Float, syn.device()),
            );
            self.sample_buffer = Tensor::cat(&[&self.sample_buffer, &extra], 0);
        }

        tch::no_grad(|| {
            self.sample_buffer
                .narrow(0, offset, num_samples)
                .f_copy_(syn)
        })?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn des_var_store(&self) -> &VarStore {
        &self.des_vs
    }

    pub fn gen_var_store(&self) -> &VarStore {
        &self.gen_vs
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Latest descriptor-refined samples of every batch, `num_chains` per batch.
    pub fn sample_buffer(&self) -> &Tensor {
        &self.sample_buffer
    }
}
