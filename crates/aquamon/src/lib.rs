pub mod api;
pub mod config;
pub mod dashboard;
pub mod screen;
pub mod source;
pub mod splash;
pub mod view;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use dashboard::Command;
pub use dashboard::Dashboard;
pub use dashboard::Event;
pub use dashboard::Flag;
pub use dashboard::Pump;
pub use dashboard::SensorSnapshot;
pub use source::DataSource;
pub use source::MemorySource;
pub use source::Patch;
pub use source::RecordEvent;
pub use source::SourceError;
pub use view::DashboardView;
