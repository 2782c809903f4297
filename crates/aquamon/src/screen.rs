//! Interactive terminal screen.
//!
//! Shows the splash, then the live dashboard. Commands are read line by line
//! from stdin and dispatched without waiting for the write; the display picks
//! up the result through the subscription like any other remote change.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::dashboard::Command;
use crate::dashboard::Dashboard;
use crate::dashboard::Pump;
use crate::splash::Navigator;
use crate::splash::Route;
use crate::splash::Splash;
use crate::view::DashboardView;

/// Clear the terminal and move the cursor home.
const CLEAR: &str = "\x1b[2J\x1b[H";

const CLOCK_TICK: Duration = Duration::from_secs(1);

const HELP: &str = "[a] otomatis  [1] pompa 1  [2] pompa 2  [q] keluar";

/// One line of user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Automatic,
    Toggle(Pump),
    Quit,
}

impl Input {
    /// The dashboard command this input triggers, if any.
    pub fn command(self) -> Option<Command> {
        match self {
            Input::Automatic => Some(Command::SetAutomatic),
            Input::Toggle(pump) => Some(Command::TogglePump(pump)),
            Input::Quit => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown input '{0}'")]
pub struct UnknownInput(String);

impl FromStr for Input {
    type Err = UnknownInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Input::Automatic),
            "q" => Ok(Input::Quit),
            other => other
                .parse::<Pump>()
                .map(Input::Toggle)
                .map_err(|_| UnknownInput(s.trim().to_string())),
        }
    }
}

/// Forwards navigation requests to the screen loop.
struct ChannelNavigator(mpsc::UnboundedSender<Route>);

impl Navigator for ChannelNavigator {
    fn replace(&self, route: Route) {
        let _ = self.0.send(route);
    }
}

fn draw(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}{}\n\n{}", CLEAR, text, HELP)?;
    stdout.flush()
}

fn draw_dashboard(dashboard: &Dashboard) -> std::io::Result<()> {
    let snapshot = dashboard.snapshot();
    let view = DashboardView::project(snapshot.as_deref(), Local::now().naive_local());
    draw(&view.to_string())
}

/// Wait on the splash screen. Returns `false` if interrupted.
async fn show_splash(delay: Duration) -> anyhow::Result<bool> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut splash = Splash::mount(delay, Arc::new(ChannelNavigator(tx)));

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}{}", CLEAR, Splash::render())?;
        stdout.flush()?;
    }

    tokio::select! {
        route = rx.recv() => {
            debug!("Navigating to {:?}", route);
            Ok(true)
        }
        _ = tokio::signal::ctrl_c() => {
            splash.unmount();
            Ok(false)
        }
    }
}

/// Run the interactive screen until the user quits or Ctrl+C.
///
/// Expects the dashboard's event loop to be running already.
pub async fn run(dashboard: Arc<Dashboard>, splash_delay: Duration) -> anyhow::Result<()> {
    if !show_splash(splash_delay).await? {
        return Ok(());
    }

    let mut events = dashboard.events();
    dashboard.mount();
    draw_dashboard(&dashboard).context("Failed to draw dashboard")?;

    let mut clock = tokio::time::interval(CLOCK_TICK);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = clock.tick() => {}
            event = events.recv() => match event {
                Ok(event) => debug!("Redrawing after {:?}", event),
                Err(RecvError::Lagged(n)) => debug!("Skipped {} events", n),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Input>() {
                    Ok(Input::Quit) => break,
                    Ok(input) => {
                        if let Some(command) = input.command() {
                            info!("Dispatching {:?}", command);
                            dashboard.dispatch(command);
                        }
                    }
                    Err(e) => warn!("{}", e),
                },
                Ok(None) => {
                    debug!("stdin closed, commands disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }

        draw_dashboard(&dashboard).context("Failed to draw dashboard")?;
    }

    dashboard.unmount();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!("a".parse::<Input>().unwrap(), Input::Automatic);
        assert_eq!(" A \n".parse::<Input>().unwrap(), Input::Automatic);
        assert_eq!("1".parse::<Input>().unwrap(), Input::Toggle(Pump::One));
        assert_eq!("2".parse::<Input>().unwrap(), Input::Toggle(Pump::Two));
        assert_eq!("q".parse::<Input>().unwrap(), Input::Quit);

        let err = "3".parse::<Input>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown input '3'");
    }

    #[test]
    fn test_input_commands() {
        assert_eq!(Input::Automatic.command(), Some(Command::SetAutomatic));
        assert_eq!(
            Input::Toggle(Pump::Two).command(),
            Some(Command::TogglePump(Pump::Two))
        );
        assert_eq!(Input::Quit.command(), None);
    }

    #[tokio::test]
    async fn test_channel_navigator_forwards_route() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        ChannelNavigator(tx).replace(Route::Dashboard);
        assert_eq!(rx.recv().await, Some(Route::Dashboard));
    }
}
