//! Splash screen and the one-shot transition to the dashboard.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;

/// Title shown while the splash screen is up.
pub const SPLASH_TITLE: &str = "Monitoring Air Aquarium";

/// Named screens of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum Route {
    Splash,
    Dashboard,
}

/// Screen navigation. `replace` swaps the current screen without keeping it
/// in the history.
pub trait Navigator: Send + Sync {
    fn replace(&self, route: Route);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplashState {
    /// Timer running
    Armed,
    /// Navigation happened
    Fired,
    /// Unmounted before the delay elapsed
    Cancelled,
}

/// A mounted splash screen.
///
/// Navigates to [`Route::Dashboard`] exactly once after `delay`, unless it is
/// unmounted (or dropped) first.
pub struct Splash {
    state: Arc<Mutex<SplashState>>,
    timer: Option<JoinHandle<()>>,
}

impl Splash {
    pub fn mount(delay: Duration, navigator: Arc<dyn Navigator>) -> Self {
        let state = Arc::new(Mutex::new(SplashState::Armed));

        debug!("Splash armed for {:?}", delay);
        let timer = tokio::spawn({
            let state = state.clone();
            async move {
                tokio::time::sleep(delay).await;

                // Unmount may race the timer; only an armed splash navigates.
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if *state == SplashState::Armed {
                    *state = SplashState::Fired;
                    drop(state);
                    info!("Splash elapsed, replacing with {}", Route::Dashboard);
                    navigator.replace(Route::Dashboard);
                }
            }
        });

        Self {
            state,
            timer: Some(timer),
        }
    }

    pub fn state(&self) -> SplashState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the pending transition. No-op once it has fired.
    pub fn unmount(&mut self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == SplashState::Armed {
                *state = SplashState::Cancelled;
                debug!("Splash cancelled before the transition");
            }
        }

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Text drawn while the splash is up.
    pub fn render() -> &'static str {
        SPLASH_TITLE
    }
}

impl Drop for Splash {
    fn drop(&mut self) {
        self.unmount();
    }
}
