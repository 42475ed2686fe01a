pub mod rows;
pub mod schedule;
pub mod statistics;

pub use rows::{EventRow, FetchResult, FetchTask};
pub use schedule::{EventScore, EventStatus, NamedEntity, ScheduledEvent, ScheduledEventsResponse};
pub use statistics::{StatisticsGroup, StatisticsItem, StatisticsPeriod, StatisticsResponse};
