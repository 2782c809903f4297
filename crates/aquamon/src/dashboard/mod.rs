pub mod command;
mod dashboard;
mod event;
mod message;
pub mod state;

pub use command::Command;
pub use command::Pump;
pub use dashboard::Dashboard;
pub use event::Event;
pub use message::FromSourceMessage;
pub use state::Flag;
pub use state::SensorSnapshot;
