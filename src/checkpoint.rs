use crate::{common::*, metrics::EpochSummary};

lazy_static! {
    static ref CHECKPOINT_NAME: Regex = Regex::new(r"^model-(\d+)\.ot$").unwrap();
}

pub fn checkpoint_path<P>(dir: P, epoch: usize) -> PathBuf
where
    P: AsRef<Path>,
{
    dir.as_ref().join(format!("model-{:03}.ot", epoch))
}

/// Writes the variables of all stores into `model-{epoch}.ot`, plus a JSON
/// sidecar carrying the diagnostics at that epoch.
///
/// Variable names keep their scope prefix, so the stores must not share names.
pub fn save_checkpoint<P>(
    dir: P,
    epoch: usize,
    stores: &[&VarStore],
    summary: &EpochSummary,
) -> Fallible<PathBuf>
where
    P: AsRef<Path>,
{
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let named_tensors = stores
        .iter()
        .flat_map(|vs| vs.variables().into_iter())
        .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
        .collect::<Vec<_>>();
    if let Some(((name, _), _)) = named_tensors
        .iter()
        .tuple_windows()
        .find(|((lhs, _), (rhs, _))| lhs == rhs)
    {
        bail!("the variable {} appears in more than one store", name);
    }

    let path = checkpoint_path(dir, epoch);
    Tensor::save_multi(named_tensors.as_slice(), &path)?;

    let meta_file = BufWriter::new(File::create(path.with_extension("json"))?);
    serde_json::to_writer_pretty(meta_file, summary)?;

    Ok(path)
}

/// Copies the saved values of every variable in `vs` from the checkpoint.
/// Variables of other stores saved in the same file are ignored.
pub fn restore_checkpoint<P>(path: P, vs: &VarStore) -> Fallible<()>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let saved = Tensor::load_multi(path)
        .with_context(|| format!("unable to load checkpoint {}", path.display()))?
        .into_iter()
        .collect::<HashMap<_, _>>();

    for (name, mut var) in vs.variables() {
        let value = saved.get(&name).ok_or_else(|| {
            format_err!(
                "the variable {} is missing in checkpoint {}",
                name,
                path.display()
            )
        })?;
        ensure!(
            value.size() == var.size(),
            "the variable {} has shape {:?}, but the checkpoint stores {:?}",
            name,
            var.size(),
            value.size()
        );
        tch::no_grad(|| var.f_copy_(value))?;
    }

    Ok(())
}

/// Resolves a checkpoint argument. A directory resolves to the checkpoint
/// with the largest epoch inside it.
pub fn resolve_checkpoint<P>(path: P) -> Fallible<PathBuf>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if path.is_file() {
        return Ok(path.to_owned());
    }
    ensure!(path.is_dir(), "the checkpoint {} does not exist", path.display());

    let pattern = path.join("model-*.ot");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| format_err!("non-UTF-8 path {}", path.display()))?;

    let latest = glob::glob(pattern)?
        .map(|entry| -> Fallible<_> {
            let entry = entry?;
            let epoch = entry
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| CHECKPOINT_NAME.captures(name))
                .and_then(|captures| captures[1].parse::<usize>().ok());
            Ok(epoch.map(|epoch| (epoch, entry)))
        })
        .filter_map(|result| result.transpose())
        .collect::<Fallible<Vec<_>>>()?
        .into_iter()
        .max_by_key(|(epoch, _)| *epoch)
        .map(|(_, entry)| entry)
        .ok_or_else(|| format_err!("no checkpoint found in {}", path.display()))?;

    Ok(latest)
}
