/// Data layer: stored channels, session files and exports.
///
/// Architecture:
/// ```text
///  .parquet / .json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Session
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ChannelRecord │  chantype, rate, unit, values, header
///   └──────────────┘
///        │  to_raw / from_processed
///        ▼
///   ┌──────────┐
///   │  export   │  segment statistics → .csv
///   └──────────┘
/// ```

pub mod export;
pub mod loader;
pub mod model;
