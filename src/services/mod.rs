pub mod command_server;
pub mod daily_reset;
pub mod visualizer;

pub use command_server::{router, spawn_command_server, CommandState, SetStrategyRequest};
pub use daily_reset::{duration_until_next_utc_midnight, spawn_daily_reset};
pub use visualizer::{
    FanoutSink, LogSink, PositionSummary, SnapshotBoard, SymbolSnapshot, VisualizationSink,
};
