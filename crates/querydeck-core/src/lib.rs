//! querydeck-core - Core library for querydeck
//!
//! Provides latency metrics, query planning, the TTL result cache, index
//! provisioning, the report pipeline and response shaping for a document
//! store backed API.

pub mod aggregation;
pub mod analyzer;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod indexes;
pub mod metrics;
pub mod query;
pub mod service;
pub mod shaper;
pub mod store;

pub use aggregation::{build_report_pipeline, Pipeline, PipelineBuilder, Stage};
pub use analyzer::{analyze, StorageReport};
pub use cache::{generate_key, CacheStats, TtlCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheConfig, DeckConfig, EvictionMode, MetricsConfig, PoolConfig};
pub use error::{CoreError, ErrorSeverity, ProvisionError, ProvisionReport};
pub use indexes::{provision, provision_required, IndexCatalog, IndexDescriptor};
pub use metrics::{MetricRegistry, OperationStats, TimerToken};
pub use query::{build_plan, QueryPlan, RawQuery};
pub use service::QueryService;
pub use shaper::{shape, ShapeOptions};
pub use store::{DocumentStore, MemoryStore};
