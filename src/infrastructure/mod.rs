// Dukascopy price CSV reader
pub mod duka_csv;

// Macro-economic series CSV reader
pub mod macro_csv;

// Synthetic and in-memory sources
pub mod mock;

// Processed-table CSV export
pub mod table_export;
