//! Progressive streaming: view-dependent priorities, stream cursors and the
//! refinement format

pub mod priority;
pub mod cursor;
pub mod pdae;

pub use priority::{MAX_SOLID_ANGLE, Priority, PriorityWeights, solid_angle, texture_level};
pub use cursor::ProgressiveCursor;
pub use pdae::{
    DecodedRefinements, PDAE_MAGIC, PdaeDecoder, ProgressiveMesh, RefinementOp, RefinementRecord,
    encode_pdae,
};
