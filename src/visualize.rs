use crate::common::*;

/// Lays out a `[n, height, width, 3]` batch in `[-1, 1]` as a row-major grid
/// with `cols` columns. Missing tiles in the last row are black.
pub fn tile_images(images: &Tensor, cols: usize) -> Fallible<RgbImage> {
    let (num_images, height, width, channels) = images.size4()?;
    ensure!(channels == 3, "expect RGB images, but get {} channels", channels);
    ensure!(num_images > 0, "no image to tile");
    ensure!(cols > 0, "the tile column count must be positive");

    let cols = cols as i64;
    let rows = (num_images + cols - 1) / cols;

    let pixels = ((images
        .detach()
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .clamp(-1.0, 1.0)
        + 1.0)
        * 127.5)
        .round()
        .to_kind(Kind::Uint8);

    let num_padding = rows * cols - num_images;
    let pixels = if num_padding > 0 {
        let padding = Tensor::zeros(
            &[num_padding, height, width, channels],
            (Kind::Uint8, Device::Cpu),
        );
        Tensor::cat(&[pixels, padding], 0)
    } else {
        pixels
    };

    let grid = pixels
        .reshape(&[rows, cols, height, width, channels])
        .permute(&[0, 2, 1, 3, 4])
        .contiguous()
        .reshape(&[-1]);
    let buf = Vec::<u8>::from(&grid);

    let image = RgbImage::from_raw((cols * width) as u32, (rows * height) as u32, buf)
        .ok_or_else(|| format_err!("the pixel buffer does not fit the tiled image"))?;
    Ok(image)
}

/// Writes the tiled batch to `path`, creating parent directories as needed.
pub fn save_tiled<P>(images: &Tensor, path: P, cols: usize) -> Fallible<()>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    tile_images(images, cols)?
        .save(path)
        .with_context(|| format!("unable to write image {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_layout() {
        // three 2x2 tiles: black, white, mid gray
        let images = Tensor::cat(
            &[
                Tensor::full(&[1, 2, 2, 3], -1.0, (Kind::Float, Device::Cpu)),
                Tensor::full(&[1, 2, 2, 3], 1.0, (Kind::Float, Device::Cpu)),
                Tensor::full(&[1, 2, 2, 3], 0.0, (Kind::Float, Device::Cpu)),
            ],
            0,
        );

        let image = tile_images(&images, 2).unwrap();
        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(3, 1), &Rgb([255, 255, 255]));
        assert_eq!(image.get_pixel(1, 2), &Rgb([128, 128, 128]));
        // padded tile
        assert_eq!(image.get_pixel(3, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn tile_clamps_out_of_range() {
        let images = Tensor::full(&[1, 1, 1, 3], 5.0, (Kind::Float, Device::Cpu));
        let image = tile_images(&images, 1).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn tile_rejects_grayscale() {
        let images = Tensor::zeros(&[1, 2, 2, 1], (Kind::Float, Device::Cpu));
        assert!(tile_images(&images, 1).is_err());
    }
}
