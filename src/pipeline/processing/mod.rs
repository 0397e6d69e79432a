// Candidate processing: normalization, deduplication and enrichment

pub mod dedup;
pub mod enrich;
pub mod normalize;
