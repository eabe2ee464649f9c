pub use anyhow::{bail, ensure, format_err, Context, Error};
pub use argh::FromArgs;
pub use derivative::Derivative;
pub use image::{imageops::FilterType, ImageBuffer, Rgb, RgbImage};
pub use itertools::Itertools;
pub use lazy_static::lazy_static;
pub use log::{debug, info, warn};
pub use rayon::prelude::*;
pub use regex::Regex;
pub use serde::{
    de::Error as DeserializeError, ser::Error as SerializeError, Deserialize, Deserializer,
    Serialize, Serializer,
};
pub use std::{
    borrow::Borrow,
    collections::HashMap,
    fs::{self, File},
    io::{prelude::*, BufWriter},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};
pub use tch::{
    nn::{self, ModuleT, OptimizerConfig, VarStore},
    Device, Kind, Tensor,
};

pub type Fallible<T> = Result<T, Error>;
