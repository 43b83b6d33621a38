

pub mod context;
pub mod merger;
pub mod router;
pub mod structured;
pub mod templates;
pub mod vector;

pub use context::{ContextFormatter, NO_RESULTS};
pub use merger::{Provenance, RankedItem, ResultMerger};
pub use router::{BoundQuery, QueryRouter, RouterError};
pub use structured::StructuredRetriever;
pub use templates::{QueryTemplate, QueryTemplateLibrary, TemplateSlot};
pub use vector::{
    EnrichedHit, HitEnricher, IndexSelector, MergedHit, MultiIndexSearcher, SearchHit, VectorIndex,
    VectorIndexError, VectorIndexRegistry,
};
