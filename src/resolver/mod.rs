// Resolver module - multi-profile media link resolution

pub mod config;
pub mod engine;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod profiles;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Backend, Settings};
pub use engine::Engine;
pub use errors::{ConfigError, ExtractError, FailureKind, ResolveError};
pub use format_selector::{FormatSelector, NoPlayableFormat, Selection};
pub use models::{
    Failure, Identifier, QualityHint, ResolutionOutcome, ResolvedMedia, SearchHit, SearchOutcome,
    SearchQuery, SelectedFormat,
};
pub use normalizer::{normalize, normalize_search, FailureRecord, OutputRecord};
pub use orchestrator::FallbackResolver;
pub use profiles::{CookieSource, Profile, ProfileCatalog};
