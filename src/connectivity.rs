use serde::Serialize;

/// Which classification path a capture takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Online,
    Offline,
}

/// Answers "is the classification service reachable right now?".
///
/// Asked once per capture; implementations must answer quickly and never block
/// on the network for long.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

impl<F> ConnectivityProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_online(&self) -> bool {
        self()
    }
}

pub fn select_mode(probe: &dyn ConnectivityProbe) -> Mode {
    if probe.is_online() {
        Mode::Online
    } else {
        Mode::Offline
    }
}
