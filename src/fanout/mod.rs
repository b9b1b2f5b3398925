mod dispatcher;

pub use dispatcher::{DeliveryReport, DispatcherStats, DispatcherStatsSnapshot, FanoutDispatcher};
