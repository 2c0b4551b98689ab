use std::io;
use std::thread::{self, JoinHandle};

/// Spawn a thread named `name` running `f`.
///
/// The name shows up in panic messages and in `ps -T`, session workers are named
/// after their `SessionId`.
pub fn spawn_thread<N, F, R>(name: N, f: F) -> io::Result<JoinHandle<R>>
where
    N: Into<String>,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(f)
}
