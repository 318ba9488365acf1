// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing the retail data the
// pipeline works on. Nothing here touches burn, the filesystem
// or the network.
//
//   record.rs  — raw rows of the train / test / store tables
//                and the merged (sales + store) row
//   feature.rs — the closed set of model input columns
//   traits.rs  — contracts implemented by the data and ml layers

/// Raw sales and store rows
pub mod record;

/// Model input columns and their properties
pub mod feature;

/// Core abstractions (traits) that other layers implement
pub mod traits;
