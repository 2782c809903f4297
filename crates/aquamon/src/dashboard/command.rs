//! Pump commands.
//!
//! Every command is a partial-field patch of the monitored record. Toggles
//! read the record first and write the complement in a second request; no
//! lock or transaction spans the two, so a concurrent writer in between is
//! overwritten (last write wins).

use serde::Serialize;
use tracing::info;

use super::state::Flag;
use super::state::fields;
use super::state::flag_field;
use crate::source::DataSource;
use crate::source::Patch;
use crate::source::SourceError;

/// One of the two manually switchable pumps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString,
)]
pub enum Pump {
    #[strum(serialize = "1")]
    One,
    #[strum(serialize = "2")]
    Two,
}

impl Pump {
    /// Remote field holding this pump's state.
    pub const fn field(self) -> &'static str {
        match self {
            Pump::One => fields::PUMP1,
            Pump::Two => fields::PUMP2,
        }
    }
}

/// A user action on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Hand both pumps to the device's automatic control
    SetAutomatic,

    /// Leave automatic mode and flip one pump
    TogglePump(Pump),
}

/// Patch written by [`set_automatic`], independent of the current record.
pub fn automatic_patch() -> Patch {
    Patch::new()
        .set(fields::AUTOMATIC, Flag::On)
        .set(fields::PUMP1, Flag::Off)
        .set(fields::PUMP2, Flag::Off)
}

/// Patch that flips `pump` given its currently stored state.
///
/// Only a stored `"1"` counts as on; a missing or unknown value is treated
/// as off, so the pump is switched on.
pub fn toggle_patch(pump: Pump, current: Option<Flag>) -> Patch {
    let next = current.unwrap_or(Flag::Off).toggled();
    Patch::new()
        .set(fields::AUTOMATIC, Flag::Off)
        .set(pump.field(), next)
}

/// Switch to automatic mode: both pumps off, automatic flag on.
pub async fn set_automatic(source: &dyn DataSource, path: &str) -> Result<Patch, SourceError> {
    let patch = automatic_patch();
    source.patch(path, &patch).await?;
    info!("Automatic mode enabled on {}", path);
    Ok(patch)
}

/// Leave automatic mode and flip one pump.
pub async fn toggle_pump(
    source: &dyn DataSource,
    path: &str,
    pump: Pump,
) -> Result<Patch, SourceError> {
    let record = source.get(path).await?;
    let current = record
        .as_ref()
        .and_then(|record| flag_field(record, pump.field()));

    let patch = toggle_patch(pump, current);
    source.patch(path, &patch).await?;
    info!("Pump {} toggled on {}: {:?}", pump, path, patch);
    Ok(patch)
}

/// Execute a command against the record at `path`.
pub async fn execute(
    source: &dyn DataSource,
    path: &str,
    command: Command,
) -> Result<Patch, SourceError> {
    match command {
        Command::SetAutomatic => set_automatic(source, path).await,
        Command::TogglePump(pump) => toggle_pump(source, path, pump).await,
    }
}
