pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod mock;
pub mod provider;
pub mod similarity;

pub use cache::{CacheTier, EmbeddingCache};
pub use config::EmbeddingConfig;
pub use error::EmbeddingError;
pub use http::HttpEmbeddingProvider;
pub use metrics::{EmbeddingMetrics, EmbeddingMetricsSnapshot};
pub use mock::{FailingEmbeddingProvider, MappingEmbeddingProvider, MockEmbeddingProvider};
pub use provider::EmbeddingProvider;
pub use similarity::{centroid, cosine_similarity, l2_distance, l2_distance_squared, normalize};
