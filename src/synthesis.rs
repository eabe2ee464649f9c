use crate::{
    checkpoint,
    common::*,
    config::Config,
    model::{Generator, GeneratorInit},
    visualize,
};

/// Draws images and latent interpolations from a restored generator.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Synthesizer {
    config: Config,
    #[derivative(Debug = "ignore")]
    gen_vs: VarStore,
    generator: Generator,
}

impl Synthesizer {
    /// Restores the generator parameters. `checkpoint` may name a checkpoint
    /// file or a directory of checkpoints.
    pub fn restore(config: Config, checkpoint: Option<&Path>) -> Fallible<Self> {
        let checkpoint = checkpoint.ok_or_else(|| format_err!("no checkpoint provided"))?;
        config.validate()?;
        let path = checkpoint::resolve_checkpoint(checkpoint)?;

        let gen_vs = VarStore::new(config.device);
        let generator = GeneratorInit {
            net_type: config.net_type,
            image_size: config.image_size,
        }
        .build(gen_vs.root() / "gen")?;
        checkpoint::restore_checkpoint(&path, &gen_vs)?;
        info!("loaded checkpoint {}", path.display());

        Ok(Self {
            config,
            gen_vs,
            generator,
        })
    }

    pub fn generate(&self, latents: &Tensor) -> Fallible<Tensor> {
        tch::no_grad(|| self.generator.forward_t(latents, false))
    }

    /// Writes `gen{i}.png` and `interp{i}.png` for each chunk of at most
    /// `num_chains` latents. Returns the written paths.
    pub fn run(&self, sample_size: usize) -> Fallible<Vec<PathBuf>> {
        ensure!(sample_size > 0, "sample_size must be positive");

        let num_chains = self.config.num_chains() as usize;
        let tile_rows = self.config.tile_rows.get() as i64;
        let tile_cols = self.config.tile_cols.get();
        let latent_dim = self.generator.latent_dim();
        let test_dir = self.config.test_dir();
        fs::create_dir_all(&test_dir)?;

        let num_batches = (sample_size + num_chains - 1) / num_chains;
        let mut remaining = sample_size;
        let mut written = vec![];

        for index in 0..num_batches {
            let count = remaining.min(num_chains);
            let latents = Tensor::randn(
                &[count as i64, latent_dim],
                (Kind::Float, self.config.device),
            );

            let images = self.generate(&latents)?;
            let gen_path = test_dir.join(format!("gen{:03}.png", index));
            visualize::save_tiled(&images, &gen_path, tile_cols)?;

            let interp_latents = linear_interpolate(&latents, tile_rows, tile_cols as i64)?;
            let interp = self.generate(&interp_latents)?;
            let interp_path = test_dir.join(format!("interp{:03}.png", index));
            visualize::save_tiled(&interp, &interp_path, tile_cols)?;

            debug!("wrote {} and {}", gen_path.display(), interp_path.display());
            written.push(gen_path);
            written.push(interp_path);
            remaining -= count;
        }

        info!("synthesized {} images into {}", sample_size, test_dir.display());
        Ok(written)
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn var_store(&self) -> &VarStore {
        &self.gen_vs
    }
}

/// Interpolates linearly between latent pairs `(2k, 2k + 1)`, wrapping
/// around when there are fewer than `2 * num_pairs` latents.
///
/// Returns `num_pairs * num_interp` rows; row `k * num_interp + j` sits at
/// fraction `j / (num_interp - 1)` from the first latent of pair `k` to the
/// second.
pub fn linear_interpolate(latents: &Tensor, num_pairs: i64, num_interp: i64) -> Fallible<Tensor> {
    let (num_latents, _latent_dim) = latents.size2()?;
    ensure!(
        num_pairs > 0 && num_interp > 0,
        "interpolation needs at least one pair and one step"
    );
    ensure!(num_latents > 0, "no latent to interpolate");

    let rows = (0..num_pairs)
        .map(|pair| {
            let from = latents.get((2 * pair) % num_latents);
            let to = latents.get((2 * pair + 1) % num_latents);
            let steps = (0..num_interp)
                .map(|step| {
                    let alpha = if num_interp > 1 {
                        step as f64 / (num_interp - 1) as f64
                    } else {
                        0.0
                    };
                    &from * (1.0 - alpha) + &to * alpha
                })
                .collect::<Vec<_>>();
            Tensor::stack(&steps, 0)
        })
        .collect::<Vec<_>>();

    Ok(Tensor::cat(&rows, 0))
}
