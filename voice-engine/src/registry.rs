//! `SessionManager`: keyed session registry with a single-writer operation
//! chain per session and a background idle-timeout sweep. The sweep follows
//! the accept/timeout shape of a connection listener elsewhere in this
//! codebase: one background task owns the map under a lock, a second
//! background task periodically retains only the entries still active.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use voice_protocol::{AudioFrame, Envelope};
use voice_session::{SessionError, SessionState, VoiceSession};

type Reply = oneshot::Sender<Result<(), SessionError>>;

enum SessionOp {
    Start(Box<Envelope>, Reply),
    Control(Box<Envelope>, Reply),
    Audio(Box<AudioFrame>, Reply),
    BinaryAudio(Vec<u8>, Reply),
    Stop(String),
}

/// A cheaply-cloneable reference to one session's operation chain.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    ops_tx: mpsc::Sender<SessionOp>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn start(&self, env: Envelope) -> Result<(), SessionError> {
        self.call(|reply| SessionOp::Start(Box::new(env), reply)).await
    }

    pub async fn on_control(&self, env: Envelope) -> Result<(), SessionError> {
        self.call(|reply| SessionOp::Control(Box::new(env), reply)).await
    }

    pub async fn on_audio(&self, frame: AudioFrame) -> Result<(), SessionError> {
        self.call(|reply| SessionOp::Audio(Box::new(frame), reply)).await
    }

    pub async fn on_binary_audio(&self, bin: Vec<u8>) -> Result<(), SessionError> {
        self.call(|reply| SessionOp::BinaryAudio(bin, reply)).await
    }

    pub async fn stop(&self, reason: impl Into<String>) {
        let _ = self.ops_tx.send(SessionOp::Stop(reason.into())).await;
    }

    async fn call(&self, build: impl FnOnce(Reply) -> SessionOp) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.ops_tx.send(build(reply_tx)).await.is_err() {
            return Err(SessionError::NotStarted);
        }
        reply_rx.await.unwrap_or(Err(SessionError::NotStarted))
    }
}

struct RegisteredSession {
    handle: SessionHandle,
    last_active: Instant,
}

/// Owns every live `VoiceSession`, keyed by `session_id`, guarded by a single
/// lock; enforces single-writer-per-session by giving each session its own
/// `mpsc` operation chain drained by one dedicated task.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, RegisteredSession>>>,
    idle_timeout: Duration,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        let sessions: Arc<RwLock<HashMap<String, RegisteredSession>>> = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let sweep_sessions = sessions.clone();
        let sweep_cancel = cancel.clone();
        let sweep_timeout = idle_timeout;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sweep_cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {
                        let mut stale = Vec::new();
                        {
                            let sessions = sweep_sessions.read().await;
                            let now = Instant::now();
                            for (id, session) in sessions.iter() {
                                if now.duration_since(session.last_active) > sweep_timeout {
                                    stale.push((id.clone(), session.handle.clone()));
                                }
                            }
                        }
                        for (id, handle) in stale {
                            warn!(session_id = %id, "idle timeout, stopping session");
                            handle.stop("idle_timeout").await;
                            sweep_sessions.write().await.remove(&id);
                        }
                    }
                }
            }
        });

        Self { sessions, idle_timeout, cancel }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        session.last_active = Instant::now();
        Some(session.handle.clone())
    }

    /// Spawns the session's operation-chain task and registers it.
    pub async fn register(&self, session_id: impl Into<String>, session: VoiceSession) -> SessionHandle {
        let session_id = session_id.into();
        let (ops_tx, ops_rx) = mpsc::channel(64);
        let handle = SessionHandle { session_id: session_id.clone(), ops_tx };

        let sessions = self.sessions.clone();
        let task_session_id = session_id.clone();
        tokio::spawn(async move {
            run_session(session, ops_rx).await;
            sessions.write().await.remove(&task_session_id);
            info!(session_id = %task_session_id, "session removed from registry");
        });

        self.sessions.write().await.insert(
            session_id,
            RegisteredSession { handle: handle.clone(), last_active: Instant::now() },
        );
        handle
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Stops the idle-timeout sweep. Does not stop any live sessions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// The per-session operation chain: drains externally queued operations and
/// internally generated turn/provider events in arrival order, so nothing
/// ever mutates session state concurrently with another handler.
async fn run_session(mut session: VoiceSession, mut ops: mpsc::Receiver<SessionOp>) {
    loop {
        tokio::select! {
            op = ops.recv() => {
                match op {
                    Some(SessionOp::Start(env, reply)) => {
                        let _ = reply.send(session.start(&env).await);
                    }
                    Some(SessionOp::Control(env, reply)) => {
                        let _ = reply.send(session.on_control(*env).await);
                    }
                    Some(SessionOp::Audio(frame, reply)) => {
                        let _ = reply.send(session.on_audio(*frame).await);
                    }
                    Some(SessionOp::BinaryAudio(bin, reply)) => {
                        let _ = reply.send(session.on_binary_audio(&bin).await);
                    }
                    Some(SessionOp::Stop(reason)) => {
                        session.stop(&reason).await;
                    }
                    None => break,
                }
            }
            Some(event) = session.next_event() => {
                if let Err(e) = session.handle_event(event).await {
                    warn!(error = %e, "session event handling failed");
                }
            }
        }
        if session.state() == SessionState::Stopped {
            break;
        }
    }
}
