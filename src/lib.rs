pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{BinanceDataSource, DataSource, DataSourceError, MockDataSource};
pub use db::{init_db, Repository};
pub use domain::{
    Anomaly, Asset, DailySummary, Decimal, Fill, IncomeCategory, IncomeEntry, Position,
    PositionSide, PositionStatus, Side, Symbol, TimeMs, TimeWindow,
};
pub use engine::{PnlMode, ReversalPolicy};
pub use error::AppError;
pub use orchestration::{JournalPipeline, PipelineError, RunReport};
