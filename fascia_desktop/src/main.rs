//! Fascia visualizer - Slint UI client
//!
//! Binds a renderer to the front-panel schematic and feeds it snapshots from
//! the `fasciad` daemon (push `Subscribe` stream by default, `--poll` for
//! request/response polling) or, with `--demo`, from an in-process producer
//! thread so the panel runs with no daemon at all.

use std::cell::RefCell;
use std::env;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::rc::Rc;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use fascia::bridge::{self, SnapshotSender};
use fascia::producer::{Backend, DemoBackend, DEFAULT_INTERVAL};
use fascia::proto::{Request, Response};
use fascia::render::Renderer;
use fascia::scene::{
    CellSlot, Rgb, SceneDocument, TextSlot, CLOCK_LEFT_ID, CLOCK_RIGHT_ID, COMMAND_DISPLAY_CLASS,
    REGISTER_CLASS, STACK_CELL_CLASS,
};
use fascia::snapshot::{
    Snapshot, HISTORY_SLOTS, REGISTER_BITS, REGISTER_COUNT, REGISTER_NAMES, STACK_CELLS,
};
use slint::{Color, Model, ModelRc, SharedString, Timer, TimerMode, VecModel};

slint::include_modules!();

const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:9178";

#[derive(Debug, Clone)]
struct Config {
    daemon_addr: String,
    /// UI dispatch cadence (and poll cadence in pull mode).
    poll_ms: u64,
    /// Pull mode: GetState polling instead of a Subscribe stream.
    pull: bool,
    /// Standalone mode: in-process demo producer, no daemon.
    demo: bool,
    demo_tick_ms: u64,
    demo_seed: u64,
}

impl Config {
    fn from_env_and_args() -> Self {
        let mut daemon_addr =
            env::var("FASCIA_ADDR").unwrap_or_else(|_| DEFAULT_DAEMON_ADDR.to_string());
        let mut poll_ms: u64 = env::var("FASCIA_POLL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);
        let mut pull = false;
        let mut demo = false;
        let mut demo_tick_ms: u64 = DEFAULT_INTERVAL.as_millis() as u64;
        let mut demo_seed: u64 = 2026;

        let mut args = env::args().skip(1);
        while let Some(a) = args.next() {
            match a.as_str() {
                "--addr" => {
                    if let Some(v) = args.next() {
                        daemon_addr = v;
                    }
                }
                "--poll-ms" => {
                    if let Some(v) = args.next() {
                        poll_ms = v.parse().unwrap_or(poll_ms);
                    }
                }
                "--poll" => pull = true,
                "--demo" => demo = true,
                "--tick-ms" => {
                    if let Some(v) = args.next() {
                        demo_tick_ms = v.parse().unwrap_or(demo_tick_ms);
                    }
                }
                "--seed" => {
                    if let Some(v) = args.next() {
                        demo_seed = v.parse().unwrap_or(demo_seed);
                    }
                }
                _ => {}
            }
        }

        Self {
            daemon_addr,
            poll_ms: poll_ms.clamp(10, 60_000),
            pull,
            demo,
            demo_tick_ms: demo_tick_ms.clamp(10, 60_000),
            demo_seed,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scene binding
// ═══════════════════════════════════════════════════════════════════════════

fn to_color(fill: Option<Rgb>) -> Color {
    match fill {
        Some(rgb) => Color::from_rgb_u8(rgb.r, rgb.g, rgb.b),
        None => Color::from_argb_u8(0, 0, 0, 0),
    }
}

/// Scene document backed by the schematic window's models.
///
/// The "elements" the registry binds are (model, row) handles; writing one
/// replaces that row, which is what repaints the cell or text on screen.
struct SlintScene {
    clock: Rc<VecModel<SharedString>>,
    register_fills: Rc<VecModel<Color>>,
    /// Row order matches the gauge rows, top-to-bottom.
    stack_fills: Rc<VecModel<Color>>,
    history: Rc<VecModel<SharedString>>,
}

impl SlintScene {
    /// Creates the models and installs them on the window.
    fn bind(ui: &MainWindow) -> Self {
        let clock = Rc::new(VecModel::from(vec![SharedString::from("00"); 2]));
        let register_fills = Rc::new(VecModel::from(vec![
            to_color(None);
            REGISTER_COUNT * REGISTER_BITS
        ]));
        let stack_fills = Rc::new(VecModel::from(vec![to_color(None); STACK_CELLS]));
        let history = Rc::new(VecModel::from(vec![SharedString::default(); HISTORY_SLOTS]));

        ui.set_clock_digits(ModelRc::from(clock.clone()));
        ui.set_register_fills(ModelRc::from(register_fills.clone()));
        ui.set_stack_fills(ModelRc::from(stack_fills.clone()));
        ui.set_history_lines(ModelRc::from(history.clone()));
        ui.set_register_names(ModelRc::new(VecModel::from(
            REGISTER_NAMES
                .iter()
                .map(|name| SharedString::from(*name))
                .collect::<Vec<_>>(),
        )));

        Self {
            clock,
            register_fills,
            stack_fills,
            history,
        }
    }
}

struct SlintText {
    model: Rc<VecModel<SharedString>>,
    index: usize,
}

impl TextSlot for SlintText {
    fn set_text(&mut self, text: &str) {
        self.model.set_row_data(self.index, SharedString::from(text));
    }
}

struct SlintCell {
    model: Rc<VecModel<Color>>,
    index: usize,
}

impl CellSlot for SlintCell {
    fn set_fill(&mut self, fill: Option<Rgb>) {
        self.model.set_row_data(self.index, to_color(fill));
    }
}

impl SceneDocument for SlintScene {
    type Text = SlintText;
    type Cell = SlintCell;

    fn text_by_id(&self, id: &str) -> Option<SlintText> {
        let index = match id {
            CLOCK_LEFT_ID => 0,
            CLOCK_RIGHT_ID => 1,
            _ => return None,
        };
        Some(SlintText {
            model: self.clock.clone(),
            index,
        })
    }

    fn texts_by_class(&self, class: &str) -> Vec<SlintText> {
        if class != COMMAND_DISPLAY_CLASS {
            return Vec::new();
        }
        (0..HISTORY_SLOTS)
            .map(|index| SlintText {
                model: self.history.clone(),
                index,
            })
            .collect()
    }

    fn cells_by_class(&self, class: &str) -> Vec<SlintCell> {
        if class != STACK_CELL_CLASS {
            return Vec::new();
        }
        // Document order top-to-bottom; the registry reverses to fill order.
        (0..STACK_CELLS)
            .map(|index| SlintCell {
                model: self.stack_fills.clone(),
                index,
            })
            .collect()
    }

    fn cell_groups_by_class(&self, class: &str) -> Vec<Vec<SlintCell>> {
        if class != REGISTER_CLASS {
            return Vec::new();
        }
        (0..REGISTER_COUNT)
            .map(|register| {
                (0..REGISTER_BITS)
                    .map(|bit| SlintCell {
                        model: self.register_fills.clone(),
                        index: register * REGISTER_BITS + bit,
                    })
                    .collect()
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Daemon client (mirrors the fasciad wire protocol)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct DaemonClient {
    tx: mpsc::Sender<Request>,
    /// (generation, latest state); the generation lets the UI loop skip
    /// dispatching a snapshot it already painted.
    latest: Arc<Mutex<(u64, Option<Snapshot>)>>,
    link_error: Arc<Mutex<String>>,
}

fn store_state(latest: &Mutex<(u64, Option<Snapshot>)>, snapshot: Snapshot) {
    if let Ok(mut slot) = latest.lock() {
        slot.0 += 1;
        slot.1 = Some(snapshot);
    }
}

fn run_push_session(
    stream: &mut TcpStream,
    reader: &mut BufReader<TcpStream>,
    latest: &Mutex<(u64, Option<Snapshot>)>,
) -> std::io::Result<()> {
    // A subscription stream may legitimately go quiet between slow ticks.
    stream.set_read_timeout(None)?;

    if let Ok(line) = serde_json::to_string(&Request::Subscribe) {
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
    }

    loop {
        let mut resp_line = String::new();
        if reader.read_line(&mut resp_line)? == 0 {
            return Ok(()); // daemon closed the stream
        }
        match serde_json::from_str::<Response>(&resp_line) {
            Ok(Response::State(snapshot)) => store_state(latest, snapshot),
            Ok(Response::Success { .. }) => {}
            Ok(Response::Error { message }) => eprintln!("Daemon error: {}", message),
            Err(e) => eprintln!("Bad response: {}", e),
        }
    }
}

fn run_pull_session(
    stream: &mut TcpStream,
    reader: &mut BufReader<TcpStream>,
    rx: &mpsc::Receiver<Request>,
    latest: &Mutex<(u64, Option<Snapshot>)>,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;

    loop {
        let Ok(request) = rx.recv() else {
            return Ok(()); // UI gone, channel closed
        };
        let Ok(line) = serde_json::to_string(&request) else {
            continue;
        };
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;

        let mut resp_line = String::new();
        if reader.read_line(&mut resp_line)? == 0 {
            return Ok(());
        }
        if resp_line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Response>(&resp_line) {
            Ok(Response::State(snapshot)) => store_state(latest, snapshot),
            Ok(Response::Success { .. }) => {}
            Ok(Response::Error { message }) => eprintln!("Daemon error: {}", message),
            Err(e) => eprintln!("Bad response: {}", e),
        }
    }
}

impl DaemonClient {
    fn connect(addr: String, subscribe: bool) -> Self {
        let (tx, rx) = mpsc::channel::<Request>();
        let latest: Arc<Mutex<(u64, Option<Snapshot>)>> = Arc::new(Mutex::new((0, None)));
        let link_error = Arc::new(Mutex::new("connecting".to_string()));

        let latest_bg = Arc::clone(&latest);
        let error_bg = Arc::clone(&link_error);

        // Background worker: owns the TCP connection, reconnects forever.
        thread::spawn(move || loop {
            match TcpStream::connect(&addr) {
                Ok(mut stream) => {
                    if let Ok(mut e) = error_bg.lock() {
                        e.clear();
                    }
                    let Ok(read_half) = stream.try_clone() else {
                        continue;
                    };
                    let mut reader = BufReader::new(read_half);

                    let session = if subscribe {
                        run_push_session(&mut stream, &mut reader, &latest_bg)
                    } else {
                        run_pull_session(&mut stream, &mut reader, &rx, &latest_bg)
                    };
                    match session {
                        // A clean return means the UI side is gone.
                        Ok(()) => return,
                        Err(e) => {
                            if let Ok(mut s) = error_bg.lock() {
                                *s = format!("link lost: {}", e);
                            }
                        }
                    }
                }
                Err(e) => {
                    if let Ok(mut s) = error_bg.lock() {
                        *s = format!("daemon unreachable: {}", e);
                    }
                    thread::sleep(Duration::from_secs(1));
                }
            }
        });

        Self {
            tx,
            latest,
            link_error,
        }
    }

    fn send(&self, request: Request) {
        let _ = self.tx.send(request);
    }

    /// The latest snapshot if it is newer than `seen`, updating `seen`.
    fn take_newer(&self, seen: &mut u64) -> Option<Snapshot> {
        let slot = self.latest.lock().ok()?;
        if slot.0 == *seen {
            return None;
        }
        *seen = slot.0;
        slot.1.clone()
    }

    fn link_error(&self) -> String {
        self.link_error
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Standalone producer: samples the demo backend on its own thread and pushes
/// through the in-process bridge.
fn spawn_demo_producer(tx: SnapshotSender, seed: u64, interval: Duration) {
    thread::spawn(move || {
        let mut backend = DemoBackend::new(seed);
        loop {
            thread::sleep(interval);
            match backend.sample() {
                Ok(snapshot) => {
                    if tx.send(snapshot).is_err() {
                        return; // UI gone
                    }
                }
                Err(e) => eprintln!("demo tick skipped: {}", e),
            }
        }
    });
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env_and_args();
    let ui = MainWindow::new()?;

    let scene = SlintScene::bind(&ui);
    let mut renderer = Renderer::new();
    renderer.initialize(&scene)?;
    let renderer = Rc::new(RefCell::new(renderer));

    // Snapshot source: in-process bridge (standalone) or daemon client.
    let mut next_snapshot: Box<dyn FnMut() -> Option<Snapshot>>;
    let status_client: Option<DaemonClient>;

    if config.demo {
        let (tx, rx) = bridge::channel();
        spawn_demo_producer(tx, config.demo_seed, Duration::from_millis(config.demo_tick_ms));
        let rx = RefCell::new(rx);
        next_snapshot = Box::new(move || {
            let mut rx = rx.borrow_mut();
            if rx.has_changed() {
                rx.latest()
            } else {
                None
            }
        });
        status_client = None;
    } else {
        let client = DaemonClient::connect(config.daemon_addr.clone(), !config.pull);
        status_client = Some(client.clone());
        let pull = config.pull;
        let mut seen = 0u64;
        next_snapshot = Box::new(move || {
            if pull {
                // One poll of latency: this request's reply is dispatched on
                // the next timer tick.
                client.send(Request::GetState);
            }
            client.take_newer(&mut seen)
        });
    }

    let timer = Timer::default();
    {
        let ui_weak = ui.as_weak();
        let renderer = renderer.clone();
        let daemon_addr = config.daemon_addr.clone();
        let demo = config.demo;

        timer.start(
            TimerMode::Repeated,
            Duration::from_millis(config.poll_ms),
            move || {
                if let Some(snapshot) = next_snapshot() {
                    if let Err(e) = renderer.borrow_mut().dispatch(&snapshot) {
                        eprintln!("dispatch failed: {}", e);
                    }
                }

                if let Some(ui) = ui_weak.upgrade() {
                    let (up, status) = if demo {
                        (true, "standalone demo".to_string())
                    } else {
                        let client = status_client.as_ref();
                        let error = client.map(DaemonClient::link_error).unwrap_or_default();
                        if error.is_empty() {
                            (true, format!("link {}", daemon_addr))
                        } else {
                            (false, error)
                        }
                    };
                    ui.set_link_up(up);
                    ui.set_status_line(SharedString::from(status));
                }
            },
        );
    }

    ui.run()?;
    Ok(())
}
