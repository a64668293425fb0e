pub mod cache_schema;
pub mod config;
pub mod decision;
pub mod deliberation;
pub mod position;
pub mod risk_report;
pub mod signal;

pub use cache_schema::SnapshotRow;
pub use config::{BackendKind, CacheConfig, InferenceConfig, PipelineConfig, PortfolioConfig, TadsConfig};
pub use decision::{
    DecisionRecord, HoldAlternative, PriceZone, RiskLabel, StrategySet, StrategyTier, TierKind,
    Timeframes, Violation,
};
pub use deliberation::{
    DeliberationState, DirectionVerdict, GatheredContext, Phase, RiskArguments, Role, StateError,
    TranscriptEntry,
};
pub use position::{Currency, Position, PositionDirection, PositionParseError};
pub use risk_report::{
    DailyClose, DrawdownScenario, EarningsEvent, MarketSnapshot, PositionRisk, ProximityBand,
    RecommendedAction, RiskLevel, RiskProfile, RiskReport,
};
pub use signal::{AssetClass, Direction, Language, Signal};
