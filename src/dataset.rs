use crate::common::*;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Observed images held in memory as `[n, size, size, 3]` values in `[-1, 1]`.
#[derive(Debug)]
pub struct ImageDataset {
    images: Tensor,
}

impl ImageDataset {
    /// Loads every image file in `dir` in file name order, resized to
    /// `image_size` x `image_size`.
    pub fn open<P>(dir: P, image_size: i64) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        ensure!(image_size > 0, "image_size must be positive");
        ensure!(dir.is_dir(), "the data directory {} does not exist", dir.display());

        let pattern = dir.join("*");
        let pattern = pattern
            .to_str()
            .ok_or_else(|| format_err!("non-UTF-8 path {}", dir.display()))?;
        let paths = glob::glob(pattern)?
            .map(|entry| Ok(entry?))
            .collect::<Fallible<Vec<PathBuf>>>()?
            .into_iter()
            .filter(|path| is_image_file(path))
            .sorted()
            .collect::<Vec<_>>();
        ensure!(!paths.is_empty(), "no image is found in {}", dir.display());

        let instant = Instant::now();
        let pixels = paths
            .par_iter()
            .map(|path| load_image(path, image_size as u32))
            .collect::<Fallible<Vec<_>>>()?
            .concat();

        let num_images = paths.len() as i64;
        let images =
            Tensor::of_slice(&pixels).reshape(&[num_images, image_size, image_size, 3]);
        info!(
            "loaded {} images from {} in {}ms",
            num_images,
            dir.display(),
            instant.elapsed().as_millis()
        );

        Ok(Self { images })
    }

    /// Wraps an in-memory `[n, size, size, 3]` batch.
    pub fn from_tensor(images: Tensor) -> Fallible<Self> {
        let (num_images, height, width, channels) = images.size4()?;
        ensure!(num_images > 0, "the dataset is empty");
        ensure!(
            height == width && channels == 3,
            "expect square RGB images, but get shape {:?}",
            images.size()
        );
        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image_size(&self) -> i64 {
        self.images.size()[1]
    }

    pub fn num_batches(&self, batch_size: usize) -> usize {
        (self.len() + batch_size - 1) / batch_size
    }

    /// Images `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Fallible<Tensor> {
        ensure!(
            start < end && end <= self.len(),
            "invalid slice {}..{} on a dataset of {} images",
            start,
            end,
            self.len()
        );
        Ok(self.images.narrow(0, start as i64, (end - start) as i64))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
}

fn load_image(path: &Path, size: u32) -> Fallible<Vec<f32>> {
    let image = image::open(path)
        .with_context(|| format!("unable to decode image {}", path.display()))?
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();
    let pixels = image
        .into_raw()
        .into_iter()
        .map(|value| value as f32 / 255.0 * 2.0 - 1.0)
        .collect();
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_image_folder() {
        let dir = std::env::temp_dir().join(format!("coopnets-dataset-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]))
            .save(dir.join("b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 6, Rgb([0, 0, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        fs::write(dir.join("notes.txt"), "not an image").unwrap();

        let dataset = ImageDataset::open(&dir, 16).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.image_size(), 16);

        // sorted by name: a.png (black) then b.png (white)
        let first = dataset.slice(0, 1).unwrap();
        let second = dataset.slice(1, 2).unwrap();
        assert_eq!(first.size(), vec![1, 16, 16, 3]);
        assert!((first.mean(Kind::Float).double_value(&[]) + 1.0).abs() < 1e-2);
        assert!((second.mean(Kind::Float).double_value(&[]) - 1.0).abs() < 1e-2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_folder_fails() {
        let dir = std::env::temp_dir().join(format!("coopnets-empty-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        assert!(ImageDataset::open(&dir, 16).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn slice_bounds() {
        let dataset =
            ImageDataset::from_tensor(Tensor::zeros(&[5, 4, 4, 3], (Kind::Float, Device::Cpu)))
                .unwrap();
        assert_eq!(dataset.num_batches(2), 3);
        assert_eq!(dataset.slice(4, 5).unwrap().size(), vec![1, 4, 4, 3]);
        assert!(dataset.slice(4, 6).is_err());
        assert!(dataset.slice(3, 3).is_err());
    }
}
