//! Core domain types and abstractions

pub mod cache;
pub mod calculators;
pub mod config;
pub mod error;
pub mod indicator;
pub mod log;
pub mod observation;
pub mod source;

// Re-export main types for cleaner imports
pub use cache::{CacheEntry, CacheSnapshot, CacheStore, KeyValueCollection};
pub use error::{EntryError, EntryErrorKind, SourceError};
pub use indicator::{Indicator, IndicatorDescriptor, Periodicity, Registry, SourceKind};
pub use observation::{DateRange, LatestReading, Observation};
pub use source::{Credentials, FetchMode, LatestResults, SourceClient, SourceSet};
