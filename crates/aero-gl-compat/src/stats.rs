/// Snapshot of translation counters, suitable for profiling/telemetry.
///
/// Every component keeps its own plain counters (the layer is single-threaded); the context merges
/// them into one of these on demand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TranslatorStats {
    pub pipeline_cache_hits: u64,
    pub pipeline_cache_misses: u64,
    pub pipelines_built: u64,
    pub fallbacks_used: u64,
    pub unusable_pipelines: u64,
    pub variant_downgrades: u64,

    pub draws_submitted: u64,
    pub draws_skipped: u64,
    pub draws_noop: u64,
    pub texture_rebinds: u64,
    pub uniform_uploads: u64,
    pub render_state_applies: u64,

    /// Observable fixed-function state transitions recorded by the tracker.
    pub state_transitions: u64,
    /// Buffers, textures and framebuffers whose native objects were destroyed.
    pub resources_released: u64,
}

impl TranslatorStats {
    pub fn draws_total(&self) -> u64 {
        self.draws_submitted + self.draws_skipped + self.draws_noop
    }
}
