//! The `refract snapshot` command: persist the train-split identifier tables.

use clap::Args;
use refract_core::dataset::{
    DatasetOptions, DatasetSpec, JsonSnapshotStore, NoSnapshot, QueryDataset, SnapshotStore,
    SplitKind,
};
use refract_core::Config;

use super::setup::DatasetArgs;

/// Arguments for the `snapshot` command.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Recompute even if a snapshot already exists
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub dataset: DatasetArgs,
}

/// Execute the snapshot command.
pub async fn execute(mut config: Config, args: SnapshotArgs) -> anyhow::Result<()> {
    args.dataset.apply(&mut config)?;
    let spec = DatasetSpec::from_config(&config.dataset)?;
    if !spec.name.has_queries() {
        anyhow::bail!("{} has no train triplets to index.", spec.name);
    }

    let root = config.data_root();
    let store = JsonSnapshotStore::new(root.join(&config.dataset.snapshot_file));
    if store.path().exists() && !args.force {
        anyhow::bail!(
            "Snapshot already exists at: {}\nUse --force to overwrite.",
            store.path().display()
        );
    }

    let options = DatasetOptions::from_config(&config.dataset)?;
    let queries = QueryDataset::open(&spec.name, SplitKind::Train, &root, &options, &NoSnapshot)?;
    let Some(tables) = queries.tables() else {
        anyhow::bail!("train split produced no identifier tables");
    };
    store.save(tables.snapshot())?;

    println!(
        "Snapshot written to {} ({} images, {} targets)",
        store.path().display(),
        tables.image_count(),
        tables.target_count()
    );
    Ok(())
}
