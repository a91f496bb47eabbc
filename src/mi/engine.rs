//! The MI engine: parses command lines, dispatches to the seven
//! command families, and tracks the varobj registry, breakpoint
//! table, and running/stopped state machine described by the
//! protocol core.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use crate::client::{ClientResult, RegisterDescriptor, RspClient, Stop};
use crate::target::signal;
use crate::wire::{self, MiCommand};

use super::break_;
use super::data;
use super::exec;
use super::reply::{field, list, tuple, val, AsyncKind, MiReply, PROMPT};
use super::stack;
use super::target_select;
use super::thread;
use super::var;

/// `IDLE` / `RUNNING` from the spec's MI state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
}

type StopCallback = Box<dyn FnMut(Stop)>;

/// One command's full output: async records that precede the reply,
/// the reply itself, and async records that follow it — in that
/// order, matching §5's `^running` before `*running` ordering rule.
pub struct HandlerOutput {
    pub pre: Vec<MiReply>,
    pub reply: MiReply,
    pub post: Vec<MiReply>,
}

impl HandlerOutput {
    pub fn just(reply: MiReply) -> Self {
        HandlerOutput { pre: Vec::new(), reply, post: Vec::new() }
    }
}

pub struct MiEngine {
    pub(super) client: Option<RspClient<StopCallback>>,
    pub(super) pending_stops: Rc<RefCell<VecDeque<Stop>>>,
    pub(super) state: EngineState,
    pub(super) breakpoints: BTreeMap<u32, u64>,
    pub(super) next_bp_id: u32,
    pub(super) register_snapshot: Vec<RegisterDescriptor>,
    pub(super) entry_codeline: u64,
    pub(super) transient_vars: HashMap<String, String>,
    pub(super) next_transient: usize,
}

impl Default for MiEngine {
    fn default() -> Self {
        MiEngine {
            client: None,
            pending_stops: Rc::new(RefCell::new(VecDeque::new())),
            state: EngineState::Idle,
            breakpoints: BTreeMap::new(),
            next_bp_id: 0,
            register_snapshot: Vec::new(),
            entry_codeline: 0,
            transient_vars: HashMap::new(),
            next_transient: 0,
        }
    }
}

impl MiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect the embedded RSP client to `addr`, fetch the register
    /// snapshot, and record the entry codeline. Called by
    /// `target-select` but exposed so the CLI binary can wire a
    /// `--target`-selected connection up front too.
    pub fn connect(&mut self, addr: &str) -> ClientResult<()> {
        let queue = Rc::clone(&self.pending_stops);
        let cb: StopCallback = Box::new(move |s| queue.borrow_mut().push_back(s));
        let mut client = RspClient::connect(addr, cb)?;

        let mut snapshot = Vec::new();
        let mut idx = 0u64;
        while let Some(info) = client.register_info(idx)? {
            snapshot.push(info);
            idx += 1;
        }
        let pc = client.read_register(0)?;

        self.register_snapshot = snapshot;
        self.entry_codeline = pc / 8;
        self.next_transient = self.register_snapshot.len();
        self.client = Some(client);
        Ok(())
    }

    /// Drop the RSP client connection, if any, so the peer server's
    /// run loop observes EOF and can be joined.
    pub fn disconnect(&mut self) {
        self.client = None;
    }

    /// Handle one line of MI input, returning the full text to write
    /// back (async records, the reply, the trailing prompt).
    pub fn handle_line(&mut self, line: &str) -> String {
        let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
        let Some(cmd) = wire::parse_mi_command(line) else {
            return render_output(HandlerOutput::just(MiReply::Error(trimmed)), None);
        };
        let token = cmd.token;
        let output = self.dispatch(&cmd, &trimmed);
        render_output(output, token)
    }

    fn dispatch(&mut self, cmd: &MiCommand, original_line: &str) -> HandlerOutput {
        let result = if cmd.name.starts_with("break-") {
            break_::handle(self, cmd)
        } else if cmd.name.starts_with("data-") {
            data::handle(self, cmd)
        } else if cmd.name.starts_with("exec-") {
            exec::handle(self, cmd)
        } else if cmd.name.starts_with("stack-") {
            stack::handle(self, cmd)
        } else if cmd.name == "target-select" {
            target_select::handle(self, cmd)
        } else if cmd.name.starts_with("thread-") {
            thread::handle(self, cmd)
        } else if cmd.name.starts_with("var-") {
            var::handle(self, cmd)
        } else {
            Err(original_line.to_string())
        };
        match result {
            Ok(output) => output,
            Err(msg) => HandlerOutput::just(MiReply::Error(msg)),
        }
    }

    /// Drain any stop notifications the client has buffered since the
    /// last call, translating each into a `*stopped` async record.
    /// Intended to be polled by the CLI's main loop between reads.
    pub fn poll(&mut self) -> String {
        if let Some(client) = self.client.as_mut() {
            let _ = client.poll_interrupts();
        }
        let stops: Vec<Stop> = self.pending_stops.borrow_mut().drain(..).collect();
        let mut out = String::new();
        for stop in stops {
            self.state = EngineState::Idle;
            out.push_str(&self.stop_to_async(stop).render(None));
            out.push_str(PROMPT);
        }
        out
    }

    fn current_frame_fields(&mut self) -> Vec<(String, String)> {
        let pc = self.client.as_mut().and_then(|c| c.read_register(0).ok()).unwrap_or(0);
        let codeline = pc / 8;
        vec![
            field("level", val("0")),
            field("addr", val(format!("0x{:016x}", pc))),
            field("func", val("entry")),
            field("file", val("ir")),
            field("fullname", val("ir")),
            field("line", val(codeline.to_string())),
            field("arch", val("i386:x86-64")),
        ]
    }

    fn stop_to_async(&mut self, stop: Stop) -> MiReply {
        let frame = tuple(&self.current_frame_fields());
        let fields = match stop.signal {
            s if s == signal::TRAP => vec![
                field("reason", val("breakpoint-hit")),
                field("frame", frame),
                field("thread-id", val("1")),
                field("stopped-threads", val("all")),
            ],
            s if s == signal::INT => vec![
                field("signal-name", val("SIGINT")),
                field("signal-meaning", val("Interrupt")),
                field("frame", frame),
                field("thread-id", val("1")),
                field("stopped-threads", val("all")),
                field("core", val("0")),
            ],
            _ => vec![
                field("signal-name", val("SIGKILL")),
                field("signal-meaning", val("Killed")),
                field("frame", frame),
                field("thread-id", val("1")),
                field("stopped-threads", val("all")),
                field("core", val("0")),
            ],
        };
        MiReply::Async(AsyncKind::Stopped, fields)
    }
}

fn render_output(output: HandlerOutput, token: Option<u64>) -> String {
    let mut out = String::new();
    for r in &output.pre {
        out.push_str(&r.render(None));
    }
    out.push_str(&output.reply.render(token));
    for r in &output.post {
        out.push_str(&r.render(None));
    }
    out.push_str(PROMPT);
    out
}

/// Helper shared by the command-family modules: a `{number=i,value=}`
/// element list for `data-list-register-values`.
pub(super) fn register_value_list(engine: &mut MiEngine, hex_values: &[(usize, String)]) -> String {
    let _ = engine;
    list(
        &hex_values
            .iter()
            .map(|(i, v)| tuple(&[field("number", val(i.to_string())), field("value", val(v))]))
            .collect::<Vec<_>>(),
    )
}
