use crate::common::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub net_type: NetType,
    pub num_epochs: usize,
    pub image_size: i64,
    pub batch_size: NonZeroUsize,
    pub tile_rows: NonZeroUsize,
    pub tile_cols: NonZeroUsize,
    pub d_lr: f64,
    pub g_lr: f64,
    pub beta1: f64,
    pub sigma: f64,
    pub refsig: f64,
    pub des_step_size: f64,
    pub des_sample_steps: usize,
    pub gen_step_size: f64,
    pub gen_sample_steps: usize,
    pub log_step: NonZeroUsize,
    pub data_path: PathBuf,
    pub category: String,
    pub output_dir: PathBuf,
    #[serde(
        serialize_with = "serialize_device",
        deserialize_with = "deserialize_device"
    )]
    pub device: Device,
    pub seed: Option<i64>,
    pub num_threads: Option<NonZeroUsize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            net_type: NetType::Object,
            num_epochs: 200,
            image_size: 64,
            batch_size: NonZeroUsize::new(100).unwrap(),
            tile_rows: NonZeroUsize::new(12).unwrap(),
            tile_cols: NonZeroUsize::new(12).unwrap(),
            d_lr: 0.001,
            g_lr: 0.0001,
            beta1: 0.5,
            sigma: 0.3,
            refsig: 0.016,
            des_step_size: 0.002,
            des_sample_steps: 10,
            gen_step_size: 0.1,
            gen_sample_steps: 0,
            log_step: NonZeroUsize::new(10).unwrap(),
            data_path: PathBuf::from("/tmp/data/"),
            category: "rock".into(),
            output_dir: PathBuf::from("./output"),
            device: Device::cuda_if_available(),
            seed: None,
            num_threads: None,
        }
    }
}

impl Config {
    pub fn open<P>(path: P) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Fallible<()> {
        ensure!(
            self.image_size > 0 && self.image_size % 16 == 0,
            "image_size must be a positive multiple of 16, but get {}",
            self.image_size
        );
        ensure!(self.sigma > 0.0, "sigma must be positive");
        ensure!(self.refsig > 0.0, "refsig must be positive");
        ensure!(
            self.des_step_size >= 0.0 && self.gen_step_size >= 0.0,
            "Langevin step sizes must not be negative"
        );
        Ok(())
    }

    /// Number of parallel MCMC chains, which is also the tile count of a sample image.
    pub fn num_chains(&self) -> i64 {
        (self.tile_rows.get() * self.tile_cols.get()) as i64
    }

    pub fn latent_dim(&self) -> i64 {
        self.net_type.latent_dim()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_path.join(&self.category)
    }

    pub fn category_dir(&self) -> PathBuf {
        self.output_dir.join(&self.category)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.category_dir().join("log")
    }

    pub fn sample_dir(&self) -> PathBuf {
        self.category_dir().join("synthesis")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.category_dir().join("checkpoints")
    }

    pub fn test_dir(&self) -> PathBuf {
        self.category_dir().join("test")
    }
}

/// The network family. Only [NetType::Object] has concrete layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetType {
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "texture")]
    Texture,
    #[serde(rename = "object_small")]
    ObjectSmall,
}

impl NetType {
    pub fn latent_dim(&self) -> i64 {
        match self {
            Self::Texture => 49,
            Self::Object => 100,
            Self::ObjectSmall => 2,
        }
    }
}

fn serialize_device<S>(device: &Device, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let text = match device {
        Device::Cpu => "cpu".into(),
        Device::Cuda(n) => format!("cuda({})", n),
    };
    text.serialize(serializer)
}

fn deserialize_device<'de, D>(deserializer: D) -> Result<Device, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    let device = match name.as_str() {
        "cpu" => Device::Cpu,
        _ => {
            let prefix = "cuda(";
            let suffix = ")";
            if name.starts_with(prefix) && name.ends_with(suffix) {
                let number: usize = name[(prefix.len())..(name.len() - suffix.len())]
                    .parse()
                    .map_err(|_err| D::Error::custom(format!("invalid device name {}", name)))?;
                Device::Cuda(number)
            } else {
                return Err(D::Error::custom(format!("invalid device name {}", name)));
            }
        }
    };
    Ok(device)
}
