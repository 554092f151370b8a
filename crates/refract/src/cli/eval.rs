//! The `refract eval` command: validation recall.

use std::fmt;

use clap::Args;
use refract_core::dataset::{DatasetName, DatasetSpec, SplitKind};
use refract_core::{Config, EvalProtocol, Evaluator, RecallReport, ResultWriter};
use serde::Serialize;

use super::search::Format;
use super::setup::{build_index, load_models, open_gallery, open_queries, DatasetArgs, Models};

/// Arguments for the `eval` command.
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    #[command(flatten)]
    pub dataset: DatasetArgs,
}

/// Recall per evaluated subset, plus the FashionIQ category average.
#[derive(Debug, Serialize)]
struct EvalSummary {
    dataset: String,
    subsets: Vec<(String, RecallReport)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    average: Option<Vec<(usize, f32)>>,
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, report) in &self.subsets {
            writeln!(f, "{name}: {report}")?;
        }
        if let Some(average) = &self.average {
            let parts: Vec<String> = average
                .iter()
                .map(|(k, v)| format!("R@{k} = {v:.2}"))
                .collect();
            write!(f, "average: {}", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Execute the eval command.
pub async fn execute(mut config: Config, args: EvalArgs) -> anyhow::Result<()> {
    args.dataset.apply(&mut config)?;
    let spec = DatasetSpec::from_config(&config.dataset)?;
    let Some(protocol) = EvalProtocol::for_dataset(&spec.name) else {
        anyhow::bail!(
            "{} has no validation queries.\n\n  Hint: Use --dataset fiq or --dataset cirr.",
            spec.name
        );
    };

    let models = load_models(&config)?;

    // FashionIQ categories are evaluated separately and averaged.
    let subsets: Vec<(String, Config)> = match &spec.name {
        DatasetName::FashionIq(categories) => categories
            .iter()
            .map(|category| {
                let mut subset = config.clone();
                subset.dataset.categories = vec![category.as_str().to_string()];
                (category.as_str().to_string(), subset)
            })
            .collect(),
        other => vec![(other.to_string(), config.clone())],
    };

    let mut reports = Vec::with_capacity(subsets.len());
    for (name, subset) in subsets {
        tracing::info!("Evaluating {}", name);
        let report = evaluate(&subset, &models, protocol).await?;
        reports.push((name, report));
    }

    let average = (protocol == EvalProtocol::FashionIq && reports.len() > 1).then(|| {
        reports[0]
            .1
            .recall
            .iter()
            .map(|r| {
                let sum: f32 = reports.iter().filter_map(|(_, rep)| rep.at(r.k)).sum();
                (r.k, sum / reports.len() as f32)
            })
            .collect()
    });

    let summary = EvalSummary {
        dataset: spec.name.to_string(),
        subsets: reports,
        average,
    };
    let mut writer = ResultWriter::new(std::io::stdout().lock(), args.format.into());
    writer.write_report(&summary)?;
    writer.flush()?;
    Ok(())
}

async fn evaluate(
    config: &Config,
    models: &Models,
    protocol: EvalProtocol,
) -> anyhow::Result<RecallReport> {
    let queries = open_queries(config, SplitKind::Val)?;
    let gallery = open_gallery(config, SplitKind::Val)?;
    let index = build_index(config, models, &gallery).await?;

    let evaluator = Evaluator::new(protocol)
        .with_batch_size(config.index.batch_size)
        .with_depth(config.retrieval.eval_top_k);
    Ok(evaluator.evaluate(
        &queries,
        &index,
        models.encoder.as_ref(),
        models.combiner.as_ref(),
    )?)
}
