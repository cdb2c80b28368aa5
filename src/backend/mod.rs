//! Process-backed implementations of the engine's backend traits

mod pacman;
mod script;
mod systemd;

pub use pacman::Pacman;
pub use script::ScriptInterpreter;
pub use systemd::Systemctl;

/// Turn a runner failure into an engine backend error
fn backend_error(action: impl Into<String>, err: &anyhow::Error) -> reconcile::Error {
    reconcile::Error::backend(action, format!("{err:#}"))
}

fn exit_message(status: std::process::ExitStatus) -> String {
    status.code().map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exited with status {code}"),
    )
}
