/// Data layer: incidents in, per-slot histograms out.
///
/// Architecture:
/// ```text
///  .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  select columns, dropna → Vec<IncidentRecord>
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ outliers  │  quantile trim latitude, then longitude
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ binning   │  equal-width cut → grid cell
///   │ timeslot  │  floor to interval → slot
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  tensor   │  group by slot, histogram → CrimeGrid
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  writer   │  .parquet / .json
///   └──────────┘
/// ```

pub mod binning;
pub mod loader;
pub mod model;
pub mod outliers;
pub mod tensor;
pub mod timeslot;
pub mod writer;
