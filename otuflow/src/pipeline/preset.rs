//! The default amplicon stage queue.

use super::Pipeline;
use crate::command::ConfigLoader;
use crate::config::PipelineSettings;
use crate::errors::Result;
use crate::stages::{
    AssemblyStage, ClusteringStage, DereplicationStage, MappingStage, PoolingStage,
    TablingStage, TrimmingStage,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Builds the amplicon pipeline for `settings`, with `inputs` feeding the first stage.
///
/// The queue is pooling, dereplication, OTU clustering, read mapping, and OTU tabling.
/// Assembly is placed before pooling when mate tokens are set, and quality trimming
/// before everything else when a trim cutoff is set.
///
/// # Errors
///
/// Returns an error if the output parent does not exist or the output folder cannot
/// be created.
pub fn amplicon_pipeline(settings: &PipelineSettings, inputs: Vec<PathBuf>) -> Result<Pipeline> {
    let loader = Arc::new(ConfigLoader::new(&settings.config_dir));
    let mut pipeline = Pipeline::new().with_monitor(settings.monitor.clone());
    pipeline.set_output_parent(&settings.output_parent)?;

    if let Some(cutoff) = settings.trim_cutoff {
        pipeline.add_stage(Box::new(
            TrimmingStage::new()
                .with_threads(settings.threads)
                .with_cutoff(cutoff)
                .with_encoding(settings.encoding),
        ));
    }
    if let Some(mates) = &settings.mates {
        pipeline.add_stage(Box::new(
            AssemblyStage::new(Arc::clone(&loader), mates.clone())
                .with_threads(settings.threads)
                .with_encoding(settings.encoding),
        ));
    }
    pipeline.add_stage(Box::new(
        PoolingStage::new()
            .with_threads(settings.threads)
            .with_truncation(settings.trunc_min, settings.trunc_max),
    ));
    pipeline.add_stage(Box::new(
        DereplicationStage::new().with_min_size(settings.min_size),
    ));
    pipeline.add_stage(Box::new(ClusteringStage::new(Arc::clone(&loader))));
    pipeline.add_stage(Box::new(MappingStage::new(Arc::clone(&loader))));
    pipeline.add_stage(Box::new(TablingStage::new(loader)));

    pipeline.set_initial_inputs(inputs);
    Ok(pipeline)
}
