/// Metadata layer: record types, index loading, and selection.
///
/// Architecture:
/// ```text
///  *metadata.yml / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse files → InputData (filename → record)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ MetadataRecord │  attribute → MetadataValue
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  select   │  select / group / sort records by attribute
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod select;

pub use loader::{load_input_data, InputData};
pub use model::{record, MetadataRecord, MetadataValue};
pub use select::{group, select, sort, sort_groups, Constraints, MetadataGroups, Sort};
