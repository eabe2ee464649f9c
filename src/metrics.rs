use crate::common::*;

/// Running mean over every value seen since construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingMean {
    total: f64,
    count: f64,
}

impl StreamingMean {
    pub fn update(&mut self, value: f64) {
        self.total += value;
        self.count += 1.0;
    }

    /// Zero when nothing was recorded yet.
    pub fn mean(&self) -> f64 {
        if self.count > 0.0 {
            self.total / self.count
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }
}

/// Running mean squared error accumulated element-wise across updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingMse {
    squared_error: f64,
    count: f64,
}

impl StreamingMse {
    pub fn update(&mut self, prediction: &Tensor, label: &Tensor) -> Fallible<()> {
        ensure!(
            prediction.size() == label.size(),
            "prediction of shape {:?} does not match label of shape {:?}",
            prediction.size(),
            label.size()
        );
        let diff = prediction - label;
        self.squared_error += (&diff * &diff).sum(Kind::Double).double_value(&[]);
        self.count += diff.numel() as f64;
        Ok(())
    }

    pub fn mean(&self) -> f64 {
        if self.count > 0.0 {
            self.squared_error / self.count
        } else {
            0.0
        }
    }
}

/// The diagnostics reported once per epoch.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub des_loss: StreamingMean,
    pub gen_loss: StreamingMean,
    pub recon_err: StreamingMse,
}

impl Diagnostics {
    pub fn summary(&self, epoch: usize) -> EpochSummary {
        EpochSummary {
            epoch,
            des_loss: self.des_loss.mean(),
            gen_loss: self.gen_loss.mean(),
            recon_err: self.recon_err.mean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub des_loss: f64,
    pub gen_loss: f64,
    pub recon_err: f64,
}

/// Appends one JSON record per epoch to a log file.
#[derive(Debug)]
pub struct SummaryWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SummaryWriter {
    pub fn create<P>(path: P) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_owned();
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self { path, writer })
    }

    pub fn append(&mut self, summary: &EpochSummary) -> Fallible<()> {
        serde_json::to_writer(&mut self.writer, summary)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_mean_accumulates() {
        let mut mean = StreamingMean::default();
        assert_eq!(mean.mean(), 0.0);

        mean.update(1.0);
        mean.update(2.0);
        mean.update(6.0);
        assert_eq!(mean.count(), 3);
        assert!((mean.mean() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn streaming_mse_weights_by_elements() {
        let mut mse = StreamingMse::default();
        let zeros = Tensor::zeros(&[2, 2], (Kind::Float, Device::Cpu));

        mse.update(&Tensor::ones(&[2, 2], (Kind::Float, Device::Cpu)), &zeros)
            .unwrap();
        mse.update(&zeros, &zeros).unwrap();
        assert!((mse.mean() - 0.5).abs() < 1e-12);

        let wrong = Tensor::zeros(&[3], (Kind::Float, Device::Cpu));
        assert!(mse.update(&wrong, &zeros).is_err());
    }

    #[test]
    fn summary_writer_appends_lines() {
        let dir = std::env::temp_dir().join(format!("coopnets-summary-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("summary.jsonl");

        let mut writer = SummaryWriter::create(&path).unwrap();
        let mut diagnostics = Diagnostics::default();
        diagnostics.des_loss.update(-1.5);
        writer.append(&diagnostics.summary(0)).unwrap();
        writer.append(&diagnostics.summary(1)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let records: Vec<EpochSummary> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].epoch, 1);
        assert_eq!(records[0].des_loss, -1.5);

        fs::remove_dir_all(&dir).unwrap();
    }
}
