//! API socket discovery and connection.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Once;
use std::time::{Duration, Instant};

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::net::UnixStream;

use crate::error::{Result, VapiError};

/// Default API socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/run/vpp/api.sock";

/// Older well-known socket path, tried when the default is absent.
pub const LEGACY_SOCKET_PATH: &str = "/run/vpp-api.sock";

static MISSING_SOCKET_HINT: Once = Once::new();

/// Pick the socket path for this connection.
///
/// An explicitly configured path is used verbatim. With no override, a
/// missing default path falls back to the legacy well-known path when that
/// one exists.
pub fn resolve_socket_path(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    let primary = Path::new(DEFAULT_SOCKET_PATH);
    let legacy = Path::new(LEGACY_SOCKET_PATH);
    if !primary.exists() && legacy.exists() {
        tracing::debug!(
            "default socket {} absent, using legacy path {}",
            DEFAULT_SOCKET_PATH,
            LEGACY_SOCKET_PATH
        );
        return legacy.to_path_buf();
    }
    primary.to_path_buf()
}

/// Block until the socket file exists, up to `max_wait`.
///
/// Returns immediately when the file is already there; otherwise watches the
/// socket's parent directory for a create event naming the target file. One
/// final existence check runs after the deadline, covering a file created
/// between the last event and the timeout.
pub async fn wait_for_socket(path: &Path, max_wait: Duration) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    emit_missing_socket_hint(path);

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || watch_for_create(&path, max_wait))
        .await
        .map_err(|e| VapiError::Io(std::io::Error::other(e)))?
}

fn watch_for_create(path: &Path, max_wait: Duration) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("/"));
    let Some(file_name) = path.file_name().map(ToOwned::to_owned) else {
        return Err(VapiError::SocketMissing(path.to_path_buf()));
    };

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        let _ = tx.send(event);
    })
    .map_err(|e| VapiError::Io(std::io::Error::other(e)))?;
    watcher
        .watch(parent, RecursiveMode::NonRecursive)
        .map_err(|e| VapiError::Io(std::io::Error::other(e)))?;

    // the file may have appeared between the first check and the watch
    if path.exists() {
        return Ok(());
    }

    let deadline = Instant::now() + max_wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(Ok(event)) => {
                let created = matches!(event.kind, EventKind::Create(_))
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if created {
                    return Ok(());
                }
            }
            Ok(Err(e)) => tracing::debug!("socket watch error: {e}"),
            Err(_) => break,
        }
    }

    // last chance: a legacy-path fallback racing this wait may have created
    // the file without a matching event
    if path.exists() {
        Ok(())
    } else {
        Err(VapiError::SocketMissing(path.to_path_buf()))
    }
}

/// One-time, human-oriented pointer for the common first-run failure. The
/// typed error is still returned to the caller.
fn emit_missing_socket_hint(path: &Path) {
    MISSING_SOCKET_HINT.call_once(|| {
        tracing::warn!(
            "API socket {} does not exist; check that the dataplane is running \
             and its configuration enables the socket listener \
             (`socksvr {{ socket-name {} }}` in the startup config)",
            path.display(),
            path.display(),
        );
    });
}

/// Connect to the API socket.
///
/// Dials the stream flavor first; when the far end rejects it with a
/// wrong-socket-type class of error, retries exactly once with the
/// seqpacket flavor before giving up.
pub async fn dial(path: &Path) -> Result<UnixStream> {
    match UnixStream::connect(path).await {
        Ok(stream) => Ok(stream),
        Err(e) if is_wrong_socket_type(&e) => {
            tracing::debug!("stream connect to {} rejected ({e}); retrying as seqpacket", path.display());
            dial_seqpacket(path).map_err(|source| VapiError::Dial {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(VapiError::Dial {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn is_wrong_socket_type(e: &std::io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EPROTOTYPE) | Some(libc::EPROTONOSUPPORT) | Some(libc::ESOCKTNOSUPPORT)
    )
}

fn dial_seqpacket(path: &Path) -> std::io::Result<UnixStream> {
    let socket = socket2::Socket::new(socket2::Domain::UNIX, socket2::Type::SEQPACKET, None)?;
    socket.connect(&socket2::SockAddr::unix(path)?)?;
    socket.set_nonblocking(true)?;
    let stream: std::os::unix::net::UnixStream = socket.into();
    UnixStream::from_std(stream)
}
