//! Text projection of the dashboard.
//!
//! Everything here is pure: the same snapshot and clock reading always render
//! the same text, so the terminal screen, the `show` command and the HTTP API
//! share one layout.

use std::fmt;

use chrono::Datelike;
use chrono::NaiveDateTime;
use chrono::Weekday;
use serde::Serialize;

use crate::dashboard::Flag;
use crate::dashboard::SensorSnapshot;

/// Shown in place of any value the record does not provide.
pub const PLACEHOLDER: &str = "-";

/// An ON/OFF lamp on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum Indicator {
    #[strum(serialize = "ON")]
    On,
    #[strum(serialize = "OFF")]
    Off,
}

impl From<Option<Flag>> for Indicator {
    /// Only a flag that is explicitly on lights the indicator.
    fn from(flag: Option<Flag>) -> Self {
        match flag {
            Some(Flag::On) => Indicator::On,
            _ => Indicator::Off,
        }
    }
}

/// Indonesian name of a weekday.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "Minggu",
        Weekday::Mon => "Senin",
        Weekday::Tue => "Selasa",
        Weekday::Wed => "Rabu",
        Weekday::Thu => "Kamis",
        Weekday::Fri => "Jumat",
        Weekday::Sat => "Sabtu",
    }
}

/// Clock and calendar readout in the dashboard header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockReadout {
    pub day: &'static str,
    pub time: String,
    pub date: String,
}

impl ClockReadout {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            day: weekday_name(now.weekday()),
            time: now.format("%H:%M:%S").to_string(),
            date: now.format("%d/%m/%Y").to_string(),
        }
    }
}

/// Everything the dashboard shows, already formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub clock: ClockReadout,

    /// Both automatic-section lamps follow the automatic flag
    pub automatic: Indicator,
    pub pump1: Indicator,
    pub pump2: Indicator,

    pub turbidity_status: String,
    pub water_level_status: String,
    pub temperature_status: String,
    pub ph_status: String,

    pub turbidity: String,
    pub water_level: String,
    pub temperature: String,
    pub ph: String,
}

fn number(value: Option<f64>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| v.to_string())
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or(PLACEHOLDER).to_string()
}

impl DashboardView {
    /// Project a snapshot (or its absence) at the given local time.
    pub fn project(snapshot: Option<&SensorSnapshot>, now: NaiveDateTime) -> Self {
        let empty = SensorSnapshot::default();
        let s = snapshot.unwrap_or(&empty);

        Self {
            clock: ClockReadout::at(now),
            automatic: s.automatic.into(),
            pump1: s.pump1.into(),
            pump2: s.pump2.into(),
            turbidity_status: text(s.turbidity_status.as_deref()),
            water_level_status: text(s.water_level_status.as_deref()),
            temperature_status: text(s.temperature_status.as_deref()),
            ph_status: text(s.ph_status.as_deref()),
            turbidity: number(s.turbidity),
            water_level: number(s.water_level),
            temperature: number(s.temperature),
            ph: number(s.ph),
        }
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Monitoring Air")?;
        writeln!(
            f,
            "{} {} {}",
            self.clock.day, self.clock.date, self.clock.time
        )?;

        writeln!(f)?;
        writeln!(f, "Pompa Otomatis")?;
        writeln!(f, "  Pompa 1 {}", self.automatic)?;
        writeln!(f, "  Pompa 2 {}", self.automatic)?;

        writeln!(f)?;
        writeln!(f, "Pompa Manual")?;
        writeln!(f, "  Pompa 1 {}", self.pump1)?;
        writeln!(f, "  Pompa 2 {}", self.pump2)?;

        writeln!(f)?;
        writeln!(f, "Status Monitoring")?;
        writeln!(f, "  Kekeruhan Air: {}", self.turbidity_status)?;
        writeln!(f, "  Ketinggian Air: {}", self.water_level_status)?;
        writeln!(f, "  Suhu Air: {}", self.temperature_status)?;
        writeln!(f, "  Status pH: {}", self.ph_status)?;

        writeln!(f)?;
        writeln!(f, "Nilai Monitoring")?;
        writeln!(f, "  Kekeruhan Air: {}", self.turbidity)?;
        writeln!(f, "  Ketinggian Air: {}", self.water_level)?;
        writeln!(f, "  Suhu: {}", self.temperature)?;
        write!(f, "  Nilai pH: {}", self.ph)
    }
}
