use coopnets::{
    common::*, config::Config, dataset::ImageDataset, synthesis::Synthesizer,
    trainer::CoopTrainer,
};

lazy_static! {
    static ref SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
}

/// Cooperative training of a descriptor and a generator network.
#[derive(FromArgs)]
struct Args {
    /// the config file.
    #[argh(option, default = "PathBuf::from(\"config.json5\")")]
    config: PathBuf,
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Train(TrainArgs),
    Test(TestArgs),
}

/// Train both networks on the configured image category.
#[derive(FromArgs)]
#[argh(subcommand, name = "train")]
struct TrainArgs {}

/// Synthesize images and interpolations from a trained generator.
#[derive(FromArgs)]
#[argh(subcommand, name = "test")]
struct TestArgs {
    /// checkpoint file, or a directory whose newest checkpoint is used.
    #[argh(option)]
    checkpoint: Option<PathBuf>,
    /// number of images to synthesize.
    #[argh(option, default = "100")]
    sample_size: usize,
}

fn main() -> Fallible<()> {
    pretty_env_logger::init();

    // Parse arguments
    let args: Args = argh::from_env();

    // load config
    let config = Config::open(&args.config)?;

    if let Some(seed) = config.seed {
        tch::manual_seed(seed);
    }
    let num_threads = config
        .num_threads
        .map(NonZeroUsize::get)
        .unwrap_or_else(num_cpus::get);
    tch::set_num_threads(num_threads as i32);

    match args.command {
        Command::Train(TrainArgs {}) => {
            // Set signal handler
            ctrlc::set_handler(|| {
                warn!("Interrupted by user, stopping after the current epoch");
                SHUTDOWN_FLAG.store(true, Ordering::SeqCst);
            })?;

            // Load dataset
            info!("Loading dataset");
            let dataset = ImageDataset::open(config.data_dir(), config.image_size)?;

            let mut trainer = CoopTrainer::new(config)?;
            trainer.train(&dataset, &SHUTDOWN_FLAG)?;
        }
        Command::Test(TestArgs {
            checkpoint,
            sample_size,
        }) => {
            let synthesizer = Synthesizer::restore(config, checkpoint.as_deref())?;
            synthesizer.run(sample_size)?;
        }
    }

    Ok(())
}
