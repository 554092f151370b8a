//! The `refract search` command: one composed query against a gallery.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use refract_core::dataset::SplitKind;
use refract_core::{Config, OutputFormat, ResultWriter, Retriever};

use super::setup::{build_index, load_models, open_gallery, DatasetArgs};

/// Result output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
    Jsonl,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::Jsonl => OutputFormat::JsonLines,
        }
    }
}

/// Arguments for the `search` command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Reference image
    pub image: PathBuf,

    /// Modification text, e.g. "is red and has sleeves"
    pub query: String,

    /// Gallery split to search
    #[arg(long, default_value = "val")]
    pub split: String,

    /// Number of results (defaults to retrieval.top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    #[command(flatten)]
    pub dataset: DatasetArgs,
}

/// Execute the search command.
pub async fn execute(mut config: Config, args: SearchArgs) -> anyhow::Result<()> {
    let image = crate::expand_path(&args.image);
    if !image.is_file() {
        anyhow::bail!(
            "Reference image does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            image
        );
    }

    args.dataset.apply(&mut config)?;
    let split = SplitKind::parse(&args.split)?;

    let models = load_models(&config)?;
    let gallery = open_gallery(&config, split)?;
    let index = build_index(&config, &models, &gallery).await?;

    let retriever = Retriever::new(
        Arc::clone(&models.encoder),
        Arc::clone(&models.combiner),
        models.transform.clone(),
        Arc::new(index),
    )
    .with_top_k(args.top_k.unwrap_or(config.retrieval.top_k));

    let query = args.query.clone();
    let result = tokio::task::spawn_blocking(move || retriever.search(&image, &query)).await??;

    let mut writer = ResultWriter::new(std::io::stdout().lock(), args.format.into());
    writer.write_result(&result)?;
    writer.flush()?;
    Ok(())
}
