//! Maps a schedule's name to a fresh boxed instance, so the harness can
//! pick one by a command-line string instead of a compile-time type.

use crate::{
    Allgather, AllgatherAsync, Allreduce, AllreduceButterfly, AllreduceButterflySegmented, AllreduceRabenseifner,
    AllreduceRing, AllreduceRingPipeline, BruckAsync, GrabenseifnerAllgather, GrabenseifnerAllgatherScatter,
    GrabenseifnerAllgatherSegmented, GrabenseifnerSubgroup, RabenseifnerGather, RabenseifnerScatter, Schedule,
};

/// Default subgroup count for `grabenseifner_subgroup` when picked by name;
/// callers who need a different split construct `GrabenseifnerSubgroup`
/// directly instead of going through the registry.
const DEFAULT_SUBGROUP_COUNT: i32 = 2;

/// All 15 named schedules, in the order they're documented.
pub fn registry_names() -> &'static [&'static str] {
    &[
        "allreduce",
        "allgather",
        "allgather_async",
        "bruck_async",
        "allreduce_ring",
        "allreduce_ring_pipeline",
        "allreduce_butterfly",
        "allreduce_butterfly_segmented",
        "allreduce_rabenseifner",
        "rabenseifner_gather",
        "rabenseifner_scatter",
        "grabenseifner_allgather",
        "grabenseifner_allgather_scatter",
        "grabenseifner_allgather_segmented",
        "grabenseifner_subgroup",
    ]
}

/// Builds a fresh `Box<dyn Schedule>` for `name`, or `None` if it isn't one
/// of `registry_names()`. A fresh instance is always built rather than
/// cached since some schedules (the segmented variants, `grabenseifner_subgroup`)
/// carry construction-time parameters a caller may want to vary between runs.
pub fn default_registry(name: &str) -> Option<Box<dyn Schedule>> {
    Some(match name {
        "allreduce" => Box::new(Allreduce),
        "allgather" => Box::new(Allgather),
        "allgather_async" => Box::new(AllgatherAsync),
        "bruck_async" => Box::new(BruckAsync),
        "allreduce_ring" => Box::new(AllreduceRing),
        "allreduce_ring_pipeline" => Box::new(AllreduceRingPipeline::default()),
        "allreduce_butterfly" => Box::new(AllreduceButterfly),
        "allreduce_butterfly_segmented" => Box::new(AllreduceButterflySegmented::default()),
        "allreduce_rabenseifner" => Box::new(AllreduceRabenseifner),
        "rabenseifner_gather" => Box::new(RabenseifnerGather),
        "rabenseifner_scatter" => Box::new(RabenseifnerScatter),
        "grabenseifner_allgather" => Box::new(GrabenseifnerAllgather),
        "grabenseifner_allgather_scatter" => Box::new(GrabenseifnerAllgatherScatter),
        "grabenseifner_allgather_segmented" => Box::new(GrabenseifnerAllgatherSegmented::default()),
        "grabenseifner_subgroup" => Box::new(GrabenseifnerSubgroup::new(DEFAULT_SUBGROUP_COUNT)),
        _ => return None,
    })
}
