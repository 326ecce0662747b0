// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! The supervisor dispatch loop: a single dedicated thread owning the supervisor socket,
//! multiplexing it against a command queue fed by application threads via
//! [`Dispatcher::send_command`].
//!
//! `Dispatcher::connect` blocks the caller on a condition variable until the loop has connected
//! to the supervisor and registered the application name, mirroring the original `init()`
//! contract of not returning until the bus name is acquired.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::message::{DispatchCommand, LifecycleRequestKind, RequestId, SupervisorMessage};
use crate::transport::{read_frame, write_frame};

/// Receives events the dispatch loop observes on the supervisor socket. Implemented by the
/// lifecycle state machine; kept as a trait so this crate never depends on `persistence-core`.
pub trait SupervisorSink: Send + Sync + 'static {
    fn on_lifecycle_request(&self, request: LifecycleRequestKind, request_id: RequestId);
    fn on_block_and_write_back(&self);
    fn on_unblock(&self);
}

enum ConnectState {
    Pending,
    Connected,
    Failed(String),
}

struct ConnectSignal {
    state: Mutex<ConnectState>,
    cv: Condvar,
}

/// A handle to the running dispatch loop thread.
pub struct Dispatcher {
    commands: mpsc::UnboundedSender<DispatchCommand>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns the dispatch loop thread and blocks until it has connected to `socket_path` and
    /// registered `app_name`, or failed to do so.
    pub fn connect(socket_path: PathBuf, app_name: String, sink: Arc<dyn SupervisorSink>) -> anyhow::Result<Self> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let signal = Arc::new(ConnectSignal {
            state: Mutex::new(ConnectState::Pending),
            cv: Condvar::new(),
        });

        let thread_signal = signal.clone();
        let thread = std::thread::Builder::new()
            .name("persistence-supervisor".into())
            .spawn(move || run(socket_path, app_name, sink, commands_rx, thread_signal))
            .map_err(|e| anyhow::anyhow!("failed to spawn dispatch thread: {e}"))?;

        let mut guard = signal.state.lock().unwrap_or_else(|p| p.into_inner());
        while matches!(*guard, ConnectState::Pending) {
            guard = signal.cv.wait(guard).unwrap_or_else(|p| p.into_inner());
        }
        match &*guard {
            ConnectState::Connected => Ok(Self {
                commands: commands_tx,
                thread: Some(thread),
            }),
            ConnectState::Failed(reason) => Err(anyhow::anyhow!("{reason}")),
            ConnectState::Pending => unreachable!("loop only exits on Connected or Failed"),
        }
    }

    /// Enqueues `command` for the dispatch loop; never blocks on the loop's own progress.
    pub fn send_command(&self, command: DispatchCommand) {
        if self.commands.send(command).is_err() {
            warn!("dispatch loop is no longer running; dropping command");
        }
    }

    /// Stops the dispatch loop and waits for its thread to exit.
    pub fn shutdown(mut self) {
        self.send_command(DispatchCommand::Quit);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.send_command(DispatchCommand::Quit);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(
    socket_path: PathBuf,
    app_name: String,
    sink: Arc<dyn SupervisorSink>,
    commands: mpsc::UnboundedReceiver<DispatchCommand>,
    signal: Arc<ConnectSignal>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            fail(&signal, format!("failed to start dispatch runtime: {e}"));
            return;
        }
    };
    runtime.block_on(run_async(socket_path, app_name, sink, commands, signal));
}

async fn run_async(
    socket_path: PathBuf,
    app_name: String,
    sink: Arc<dyn SupervisorSink>,
    mut commands: mpsc::UnboundedReceiver<DispatchCommand>,
    signal: Arc<ConnectSignal>,
) {
    let mut stream = match UnixStream::connect(&socket_path).await {
        Ok(stream) => stream,
        Err(e) => {
            fail(&signal, format!("failed to connect to supervisor at {}: {e}", socket_path.display()));
            return;
        }
    };

    if let Err(e) = write_frame(&mut stream, &SupervisorMessage::RegisterShutdownClient { app_name }).await {
        fail(&signal, format!("failed to register with supervisor: {e}"));
        return;
    }

    {
        let mut guard = signal.state.lock().unwrap_or_else(|p| p.into_inner());
        *guard = ConnectState::Connected;
        signal.cv.notify_all();
    }
    debug!("supervisor dispatch loop connected");

    loop {
        tokio::select! {
            frame = read_frame(&mut stream) => {
                match frame {
                    Ok(SupervisorMessage::LifecycleRequest { request, request_id }) => {
                        sink.on_lifecycle_request(request, request_id);
                    }
                    Ok(SupervisorMessage::BlockAndWriteBack) => sink.on_block_and_write_back(),
                    Ok(SupervisorMessage::Unblock) => sink.on_unblock(),
                    Ok(other) => debug!(?other, "ignoring unexpected inbound supervisor message"),
                    Err(e) => {
                        error!("supervisor socket closed or unreadable: {e}");
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(DispatchCommand::Quit) | None => break,
                    Some(DispatchCommand::NotifyChanged { .. }) => {
                        // Local-process notification fan-out is handled by the notification bus
                        // directly; this command exists so a future remote-multicast supervisor
                        // hook has a place to plug in without touching call sites.
                    }
                    Some(DispatchCommand::WritebackComplete { request_id, status }) => {
                        if let Err(e) = write_frame(&mut stream, &SupervisorMessage::LifecycleRequestComplete { request_id, status }).await {
                            error!("failed to report writeback completion: {e}");
                        }
                    }
                }
            }
        }
    }

    let _ = write_frame(&mut stream, &SupervisorMessage::UnregisterShutdownClient).await;
}

fn fail(signal: &ConnectSignal, reason: String) {
    error!("{reason}");
    let mut guard = signal.state.lock().unwrap_or_else(|p| p.into_inner());
    *guard = ConnectState::Failed(reason);
    signal.cv.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    struct RecordingSink {
        lifecycle_requests: AtomicUsize,
        blocks: AtomicUsize,
    }

    impl SupervisorSink for RecordingSink {
        fn on_lifecycle_request(&self, _request: LifecycleRequestKind, _request_id: RequestId) {
            self.lifecycle_requests.fetch_add(1, Ordering::SeqCst);
        }
        fn on_block_and_write_back(&self) {
            self.blocks.fetch_add(1, Ordering::SeqCst);
        }
        fn on_unblock(&self) {}
    }

    #[test]
    fn connect_fails_fast_against_a_nonexistent_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("nope.sock");
        let sink = Arc::new(RecordingSink {
            lifecycle_requests: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
        });
        let result = Dispatcher::connect(socket_path, "app".into(), sink);
        assert!(result.is_err());
    }

    #[test]
    fn connect_succeeds_and_delivers_lifecycle_requests() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("supervisor.sock");

        let server_runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let socket_path_for_server = socket_path.clone();
        let server = std::thread::spawn(move || {
            server_runtime.block_on(async move {
                let listener = UnixListener::bind(&socket_path_for_server).unwrap();
                let (mut stream, _) = listener.accept().await.unwrap();
                let registration = read_frame(&mut stream).await.unwrap();
                assert!(matches!(registration, SupervisorMessage::RegisterShutdownClient { .. }));

                write_frame(
                    &mut stream,
                    &SupervisorMessage::LifecycleRequest {
                        request: LifecycleRequestKind::PrepareShutdown,
                        request_id: 1,
                    },
                )
                .await
                .unwrap();

                // Keep the stream open until the client disconnects.
                let _ = read_frame(&mut stream).await;
            });
        });

        // Give the listener a moment to bind before the client dials in.
        std::thread::sleep(std::time::Duration::from_millis(50));

        let sink = Arc::new(RecordingSink {
            lifecycle_requests: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::connect(socket_path, "app".into(), sink.clone()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(sink.lifecycle_requests.load(Ordering::SeqCst), 1);

        dispatcher.shutdown();
        let _ = server.join();
    }
}
