/// Core preprocessing: validity filtering, reconstruction, combination and
/// segment statistics.
///
/// Architecture:
/// ```text
///   RawChannel (one eye)
///        │
///        ▼
///   ┌──────────┐
///   │ validity  │  range → speed → edge → trend → islands  → ValidityMask
///   └──────────┘
///        │
///        ▼
///   ┌─────────────┐
///   │ reconstruct  │  PCHIP + zero-phase low-pass → SmoothSignal
///   └─────────────┘
///        │            (two eyes)
///        ▼               │
///   ┌──────────┐    ┌──────────┐
///   │ segments  │◄───│ combine   │  mean of both reconstructions
///   └──────────┘    └──────────┘
/// ```

pub mod combine;
pub mod model;
pub mod reconstruct;
pub mod segments;
pub mod trend;
pub mod validity;

pub use combine::{check_pair, Combination, EyeCombiner};
pub use model::{
    DataQuality, EyeLabel, EyeRole, RawChannel, Reconstruction, SmoothSignal, ValidSampleInfo,
    ValidityMask,
};
pub use reconstruct::{output_len, Reconstructor};
pub use segments::{
    attach_segment_stats, parse_segments, segment_stats, RoleStats, Segment, SegmentRecord,
    SegmentSpec, SegmentStats,
};
pub use validity::{FilterReport, Stage, ValidityFilter};
