use anyhow::{Result, anyhow};
use log::{error, info, warn};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::{
        Arc,
        atomic::Ordering,
        mpsc::{self, Receiver, Sender},
    },
    thread,
    time::Duration,
};

use super::pipeline::{Shared, register_stop_signals, run_pipeline};
use super::runtime::socket_path;
use crate::config::{DaemonConfigState, ProfileWatcher};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DaemonOptions {
    /// Frame source; stdin when unset.
    pub input: Option<PathBuf>,
    /// Serve the control socket (`start`) or stay in the foreground only (`run`).
    pub control_socket: bool,
}

pub fn run_daemon(opts: DaemonOptions) -> Result<()> {
    let listener = if opts.control_socket {
        let sock = socket_path()?;
        if sock.exists() {
            let _ = std::fs::remove_file(&sock);
        }
        let l = UnixListener::bind(&sock)?;
        l.set_nonblocking(true)?;
        info!("daemon: listening on {}", sock.display());
        Some((l, sock))
    } else {
        None
    };

    let mut state = DaemonState::new(opts.input.clone())?;
    info!("daemon: active profile '{}'", state.cfg.active_name);

    let shared = Arc::new(Shared::new(state.cfg.profile.clone()));
    register_stop_signals(&shared.stop)?;

    let watcher = match ProfileWatcher::new(&state.cfg.profiles_dir) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile hot reload disabled: {e}");
            None
        }
    };

    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();
    let _pipeline = PipelineThread::start(opts.input, Arc::clone(&shared), tx_evt);

    let res = control_loop(
        &mut state,
        &shared,
        listener.as_ref().map(|(l, _)| l),
        watcher.as_ref(),
        tx_req,
        rx_req,
        rx_evt,
    );

    if let Some((_, sock)) = listener {
        let _ = std::fs::remove_file(sock);
    }
    info!("daemon: stopped");
    res
}

fn control_loop(
    state: &mut DaemonState,
    shared: &Arc<Shared>,
    listener: Option<&UnixListener>,
    watcher: Option<&ProfileWatcher>,
    tx_req: Sender<IpcMsg>,
    rx_req: Receiver<IpcMsg>,
    rx_evt: Receiver<DaemonEvent>,
) -> Result<()> {
    loop {
        if let Some(l) = listener {
            if let Ok((stream, _)) = l.accept() {
                let tx = tx_req.clone();
                let st_snapshot = state.clone_shallow();
                let sh = Arc::clone(shared);
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, st_snapshot, sh, tx) {
                        error!("ipc client error: {e}");
                    }
                });
            }
        }

        while let Ok(evt) = rx_evt.try_recv() {
            match evt {
                DaemonEvent::InputClosed { frames } => {
                    info!("daemon: frame source closed after {frames} frames");
                    return Ok(());
                }
                DaemonEvent::Failed(e) => return Err(anyhow!("frame pipeline failed: {e}")),
            }
        }

        if watcher.is_some_and(|w| w.touched(&state.cfg.active_path())) {
            let _ = reload(state, shared);
        }

        while let Ok(msg) = rx_req.try_recv() {
            handle_msg(msg, state, shared);
        }

        if shared.stopping() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn handle_msg(msg: IpcMsg, state: &mut DaemonState, shared: &Shared) {
    match msg {
        IpcMsg::Reload(reply) => {
            let _ = reply.send(reload(state, shared));
        }
        IpcMsg::UseProfile(name, reply) => {
            let _ = reply.send(use_profile(state, shared, &name));
        }
        IpcMsg::Shutdown => shared.stop.store(true, Ordering::Relaxed),
    }
}

/// Returns the active profile name on success.
fn reload(state: &mut DaemonState, shared: &Shared) -> Result<String> {
    match state.cfg.reload() {
        Ok(()) => {
            shared.update_profile(state.cfg.profile.clone());
            info!("profile '{}' reloaded", state.cfg.active_name);
            Ok(state.cfg.active_name.clone())
        }
        Err(e) => {
            error!("reload failed, keeping previous profile: {e}");
            Err(e)
        }
    }
}

fn use_profile(state: &mut DaemonState, shared: &Shared, name: &str) -> Result<String> {
    match state.cfg.set_active(name) {
        Ok(()) => {
            shared.update_profile(state.cfg.profile.clone());
            info!("switched active profile to {}", state.cfg.active_name);
            Ok(state.cfg.active_name.clone())
        }
        Err(e) => {
            error!("use profile failed: {e}");
            Err(e)
        }
    }
}

/// Block until the control loop has applied a profile change.
fn await_profile(rx: Receiver<Result<String>>) -> serde_json::Value {
    match rx.recv_timeout(REPLY_TIMEOUT) {
        Ok(Ok(name)) => serde_json::json!({"ok": true, "data": {"active_profile": name}}),
        Ok(Err(e)) => serde_json::json!({"ok": false, "error": format!("{e:#}")}),
        Err(_) => serde_json::json!({"ok": false, "error": "daemon did not answer"}),
    }
}

fn handle_client(
    mut stream: UnixStream,
    st: DaemonState,
    shared: Arc<Shared>,
    tx_req: Sender<IpcMsg>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match op {
        "status" => serde_json::json!({"ok": true, "data": {
            "pid": std::process::id(),
            "active_profile": st.cfg.active_name,
            "socket": socket_path()?,
            "input": st.input.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "stdin".into()),
            "engine": shared.status(),
        }}),
        "reload" => {
            let (tx, rx) = mpsc::channel();
            tx_req
                .send(IpcMsg::Reload(tx))
                .map_err(|_| anyhow!("daemon is shutting down"))?;
            await_profile(rx)
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            if name.is_empty() {
                serde_json::json!({"ok": false, "error": "missing profile name"})
            } else {
                let (tx, rx) = mpsc::channel();
                tx_req
                    .send(IpcMsg::UseProfile(name.to_string(), tx))
                    .map_err(|_| anyhow!("daemon is shutting down"))?;
                await_profile(rx)
            }
        }
        "list" => {
            let list = st.cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": st.cfg.active_name}})
        }
        "doctor" => serde_json::json!({"ok": true, "data": st.cfg.doctor_report()}),
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    writeln!(stream, "{resp}")?;
    Ok(())
}

struct DaemonState {
    input: Option<PathBuf>,
    cfg: DaemonConfigState,
}

impl DaemonState {
    fn new(input: Option<PathBuf>) -> Result<Self> {
        let cfg = DaemonConfigState::load_or_install_default()?;
        Ok(Self { input, cfg })
    }

    fn clone_shallow(&self) -> Self {
        Self {
            input: self.input.clone(),
            cfg: self.cfg.clone(),
        }
    }
}

/// Profile changes carry a reply channel so the client sees the real outcome.
enum IpcMsg {
    Reload(Sender<Result<String>>),
    UseProfile(String, Sender<Result<String>>),
    Shutdown,
}

enum DaemonEvent {
    InputClosed { frames: u64 },
    Failed(String),
}

struct PipelineThread {
    _thread: thread::JoinHandle<()>,
}

impl PipelineThread {
    fn start(input: Option<PathBuf>, shared: Arc<Shared>, tx_evt: Sender<DaemonEvent>) -> Self {
        let handle = thread::spawn(move || {
            let evt = match run_pipeline(input.as_deref(), shared) {
                Ok(frames) => DaemonEvent::InputClosed { frames },
                Err(e) => {
                    error!("frame pipeline failed: {e:#}");
                    DaemonEvent::Failed(e.to_string())
                }
            };
            let _ = tx_evt.send(evt);
        });
        Self { _thread: handle }
    }
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
