//! Daemon server: Unix socket server answering graph queries.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

use crate::cache::{GraphCache, RefreshOutcome};
use crate::config::Config;
use crate::error::GraphError;
use crate::query::{self, DetailOptions};
use crate::refresh::{RefreshScheduler, RefreshStats, SchedulerControl};
use crate::storage::JsonFileStorage;

use super::protocol::{Request, Response};

/// Shared state handed to every connection.
pub struct DaemonState {
    pub cache: Arc<GraphCache>,
    pub stats: Arc<RefreshStats>,
    control: SchedulerControl,
    shutdown: AtomicBool,
}

impl DaemonState {
    pub fn new(cache: Arc<GraphCache>, stats: Arc<RefreshStats>, control: SchedulerControl) -> Self {
        Self {
            cache,
            stats,
            control,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Load the dataset, start the refresh scheduler and serve until shutdown.
///
/// Returns an error when the scheduler stops on a fatal refresh failure; the
/// binary turns that into a non-zero exit.
pub fn start_daemon(config: &Config) -> Result<()> {
    let storage = Arc::new(JsonFileStorage::open(&config.database));
    let aliases = Arc::new(config.alias_table());

    info!(database = %config.database.display(), "loading initial graph");
    let cache = Arc::new(
        GraphCache::load(storage, aliases).context("initial graph load failed")?,
    );

    let stats = Arc::new(RefreshStats::new());
    let scheduler = RefreshScheduler::new(Arc::clone(&cache), config.refresh_interval())?
        .with_rebuild_timeout(config.rebuild_timeout())
        .observe(stats.clone())
        .spawn()?;

    let sock_path = config.socket.clone();
    if sock_path.exists() {
        std::fs::remove_file(&sock_path)?;
    }
    let listener = UnixListener::bind(&sock_path)
        .with_context(|| format!("binding {}", sock_path.display()))?;
    info!(socket = %sock_path.display(), "daemon listening");

    let state = Arc::new(DaemonState::new(cache, stats, scheduler.control()));
    {
        let state = Arc::clone(&state);
        thread::Builder::new()
            .name("permgraph-accept".into())
            .spawn(move || accept_loop(listener, state))?;
    }

    let result = scheduler.join();
    state.shutdown.store(true, Ordering::SeqCst);
    let _ = std::fs::remove_file(&sock_path);

    match result {
        Ok(()) => {
            info!("daemon shutting down");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "refresh failed, daemon exiting");
            Err(e.into())
        }
    }
}

fn accept_loop(listener: UnixListener, state: Arc<DaemonState>) {
    for stream in listener.incoming() {
        if state.is_shutting_down() {
            break;
        }
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, &state) {
                        debug!(error = %e, "client handler error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "accept error");
            }
        }
    }
}

/// Handle a single client connection: one request line, one response line.
fn handle_client(stream: UnixStream, state: &DaemonState) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let mut line = String::new();
    reader.read_line(&mut line)?;

    let response = match serde_json::from_str::<Request>(&line) {
        Ok(request) => {
            debug!(?request, "received request");
            process_request(request, state)
        }
        Err(e) => Response::error(format!("bad request: {}", e)),
    };

    let response_json = serde_json::to_string(&response)?;
    writeln!(writer, "{}", response_json)?;

    Ok(())
}

fn error_response(e: GraphError) -> Response {
    if e.is_not_found() {
        Response::not_found(e.to_string())
    } else {
        Response::error(e.to_string())
    }
}

/// Answer one request. Each answer is computed from a single captured
/// snapshot and stamped with that snapshot's checkpoint.
pub fn process_request(request: Request, state: &DaemonState) -> Response {
    let snapshot = state.cache.snapshot();
    let checkpoint = snapshot.checkpoint();

    match request {
        Request::Ping => Response::Pong,

        Request::Shutdown => {
            state.shutdown.store(true, Ordering::SeqCst);
            state.control.stop();
            Response::Goodbye
        }

        // ─── Queries ───────────────────────────────────────────
        Request::UserDetails { name, cutoff } => {
            match query::get_user_details(&snapshot, &name, cutoff) {
                Ok(details) => Response::ok(checkpoint, details),
                Err(e) => error_response(e),
            }
        }

        Request::GroupDetails {
            name,
            cutoff,
            show_permission,
            expose_aliases,
        } => {
            let options = DetailOptions {
                cutoff,
                show_permission,
                expose_aliases,
            };
            match query::get_group_details(&snapshot, &name, &options) {
                Ok(details) => Response::ok(checkpoint, details),
                Err(e) => error_response(e),
            }
        }

        Request::PermissionDetails { name } => match query::get_permission_details(&snapshot, &name) {
            Ok(details) => Response::ok(checkpoint, details),
            Err(e) => error_response(e),
        },

        Request::Groups {
            audited,
            directly_audited,
        } => Response::ok(checkpoint, query::get_groups(&snapshot, audited, directly_audited)),

        Request::Permissions { audited } => {
            Response::ok(checkpoint, query::get_permissions(&snapshot, audited))
        }

        Request::DisabledGroups => Response::ok(checkpoint, query::get_disabled_groups(&snapshot)),

        Request::Users => Response::ok(checkpoint, snapshot.users().collect::<Vec<_>>()),

        Request::Checkpoint => Response::ok(checkpoint, checkpoint),

        Request::Stats => Response::ok(
            checkpoint,
            serde_json::json!({
                "snapshot": snapshot.stats(),
                "built_at": snapshot.built_at(),
                "successful_updates": state.stats.successful_updates(),
                "failed_updates": state.stats.failed_updates(),
                "last_update_ms": state.stats.last_update_ms(),
            }),
        ),

        // ─── System ────────────────────────────────────────────
        // Runs on the scheduler loop, behind its dataset identity check. A
        // failure there stops the loop and with it the daemon.
        Request::Rebuild => match state.control.rebuild() {
            Ok(RefreshOutcome::Updated { checkpoint, elapsed }) => Response::ok(
                checkpoint,
                serde_json::json!({
                    "message": "graph rebuilt",
                    "elapsed_ms": elapsed.as_millis() as u64,
                }),
            ),
            Ok(RefreshOutcome::Unchanged(checkpoint)) => Response::ok(
                checkpoint,
                serde_json::json!({ "message": "superseded by a newer snapshot" }),
            ),
            Err(e) => {
                state.shutdown.store(true, Ordering::SeqCst);
                Response::error(e.to_string())
            }
        },
    }
}

/// Send a request to the daemon and read its response.
pub fn send_request(socket: &Path, request: &Request) -> Result<Response> {
    let mut stream = UnixStream::connect(socket)
        .with_context(|| format!("connecting to {}", socket.display()))?;

    let request_json = serde_json::to_string(request)?;
    writeln!(stream, "{}", request_json)?;

    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

/// Whether a daemon answers on `socket`.
pub fn is_daemon_running(socket: &Path) -> bool {
    matches!(send_request(socket, &Request::Ping), Ok(Response::Pong))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, Role};
    use crate::storage::{Dataset, JsonFileStorage, MemoryStorage};
    use crate::refresh::SchedulerHandle;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn storage() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new(Dataset::new("db")));
        storage.update(|d| {
            d.add_member("team", &Node::user("a@a.co"), Role::Owner);
            d.grant_to_group("team", "ssh", "*", Utc::now());
        });
        storage
    }

    fn state() -> DaemonState {
        let cache = Arc::new(GraphCache::without_aliases(storage()));
        cache.refresh().unwrap();
        DaemonState::new(cache, Arc::new(RefreshStats::new()), SchedulerControl::detached())
    }

    /// State backed by a running scheduler that never ticks on its own.
    fn scheduled() -> (Arc<MemoryStorage>, DaemonState, SchedulerHandle) {
        let storage = storage();
        let cache = Arc::new(GraphCache::without_aliases(storage.clone()));
        cache.refresh().unwrap();
        let handle = RefreshScheduler::new(Arc::clone(&cache), Duration::from_secs(3600))
            .unwrap()
            .spawn()
            .unwrap();
        let state = DaemonState::new(cache, Arc::new(RefreshStats::new()), handle.control());
        (storage, state, handle)
    }

    #[test]
    fn test_rebuild_picks_up_changes() {
        let (storage, state, handle) = scheduled();
        storage.update(|d| {
            d.add_group("fresh");
        });
        match process_request(Request::Rebuild, &state) {
            Response::Ok { checkpoint, data, .. } => {
                assert_eq!(checkpoint, 2);
                assert_eq!(data["message"], "graph rebuilt");
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(state.cache.snapshot().has_group("fresh"));
        assert!(!state.is_shutting_down());
        handle.stop().unwrap();
    }

    #[test]
    fn test_rebuild_refuses_other_dataset() {
        let (storage, state, handle) = scheduled();
        storage.set_identity("staging");
        storage.update(|d| {
            d.add_group("staging-only");
        });

        let resp = process_request(Request::Rebuild, &state);
        assert!(matches!(resp, Response::Error { not_found: false, .. }));
        assert!(!state.cache.snapshot().has_group("staging-only"));
        assert!(state.is_shutting_down());
        assert!(matches!(
            handle.join().unwrap_err(),
            GraphError::DatasetChanged { .. }
        ));
    }

    #[test]
    fn test_failed_rebuild_stops_scheduler() {
        let (storage, state, handle) = scheduled();
        storage.set_unavailable(true);

        let resp = process_request(Request::Rebuild, &state);
        assert!(matches!(resp, Response::Error { .. }));
        assert!(state.is_shutting_down());
        let err = handle.join().unwrap_err();
        assert!(matches!(err, GraphError::RebuildFailed(_)));
        // queries keep answering from the last snapshot until the host exits
        assert!(state.cache.snapshot().has_group("team"));
    }

    #[test]
    fn test_rebuild_without_scheduler_is_an_error() {
        let state = state();
        assert!(matches!(
            process_request(Request::Rebuild, &state),
            Response::Error { .. }
        ));
    }

    #[test]
    fn test_query_envelope() {
        let state = state();
        let resp = process_request(
            Request::UserDetails {
                name: "a@a.co".into(),
                cutoff: None,
            },
            &state,
        );
        match resp {
            Response::Ok {
                checkpoint, data, ..
            } => {
                assert_eq!(checkpoint, 1);
                assert_eq!(data["groups"]["team"]["rolename"], "owner");
                assert_eq!(data["permissions"][0]["permission"], "ssh");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_not_found_is_flagged() {
        let state = state();
        let resp = process_request(Request::PermissionDetails { name: "none".into() }, &state);
        assert!(matches!(resp, Response::Ok { .. }));
        let resp = process_request(
            Request::GroupDetails {
                name: "none".into(),
                cutoff: None,
                show_permission: None,
                expose_aliases: true,
            },
            &state,
        );
        assert!(matches!(resp, Response::Error { not_found: true, .. }));
    }

    #[test]
    fn test_shutdown_sets_flag() {
        let state = state();
        assert_eq!(process_request(Request::Ping, &state), Response::Pong);
        assert_eq!(process_request(Request::Shutdown, &state), Response::Goodbye);
        assert!(state.is_shutting_down());
    }

    #[test]
    fn test_serve_over_socket() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("dataset.json");
        let mut dataset = Dataset::new("prod");
        dataset.add_member("team", &Node::user("a@a.co"), Role::Member);
        dataset.bump_counter(Utc::now());
        JsonFileStorage::write(&database, &dataset).unwrap();

        let mut config = Config::new(&database);
        config.socket = dir.path().join("permgraph.sock");
        let socket = config.socket.clone();
        let daemon = thread::spawn(move || start_daemon(&config));

        let mut up = false;
        for _ in 0..200 {
            if is_daemon_running(&socket) {
                up = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(up, "daemon did not come up");

        let resp = send_request(&socket, &Request::Groups { audited: false, directly_audited: false }).unwrap();
        match resp {
            Response::Ok { data, .. } => assert_eq!(data[0]["name"], "team"),
            other => panic!("unexpected response: {:?}", other),
        }

        assert_eq!(send_request(&socket, &Request::Shutdown).unwrap(), Response::Goodbye);
        daemon.join().unwrap().unwrap();
    }

    #[test]
    fn test_daemon_exits_when_rebuild_finds_other_dataset() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("dataset.json");
        let mut dataset = Dataset::new("prod");
        dataset.add_member("team", &Node::user("a@a.co"), Role::Member);
        dataset.bump_counter(Utc::now());
        JsonFileStorage::write(&database, &dataset).unwrap();

        let mut config = Config::new(&database);
        config.socket = dir.path().join("permgraph.sock");
        let socket = config.socket.clone();
        let daemon = thread::spawn(move || start_daemon(&config));

        let mut up = false;
        for _ in 0..200 {
            if is_daemon_running(&socket) {
                up = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(up, "daemon did not come up");

        dataset.name = "staging".into();
        dataset.bump_counter(Utc::now());
        JsonFileStorage::write(&database, &dataset).unwrap();

        let resp = send_request(&socket, &Request::Rebuild).unwrap();
        assert!(matches!(resp, Response::Error { .. }));
        let err = daemon.join().unwrap().unwrap_err();
        assert!(err.to_string().contains("dataset changed"));
    }
}
