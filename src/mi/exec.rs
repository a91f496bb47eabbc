//! `exec-run` / `exec-continue` / `exec-next` / `exec-step` /
//! `exec-interrupt`, grounded on `gdbLlvimIrCmdExec.py`.

use crate::wire::MiCommand;

use super::engine::{EngineState, HandlerOutput, MiEngine};
use super::reply::{field, val, AsyncKind, MiReply};

pub fn handle(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    match cmd.name.as_str() {
        "exec-run" => run(engine),
        "exec-continue" => continue_(engine),
        "exec-next" | "exec-step" => step(engine),
        "exec-interrupt" => interrupt(engine),
        _ => Err(format!("unsupported command {}", cmd.name)),
    }
}

fn run(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    engine.client.as_mut().ok_or("no target connected")?.send_continue().map_err(|e| e.to_string())?;
    engine.state = EngineState::Running;
    Ok(HandlerOutput {
        pre: vec![
            MiReply::Async(
                AsyncKind::ThreadGroupStarted,
                vec![field("id", val("i1")), field("pid", val("1"))],
            ),
            MiReply::Async(AsyncKind::ThreadCreated, vec![field("id", val("1")), field("group-id", val("i1"))]),
        ],
        reply: MiReply::Running,
        post: vec![MiReply::Async(AsyncKind::RunningExec, vec![field("thread-id", val("1"))])],
    })
}

fn continue_(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    engine.client.as_mut().ok_or("no target connected")?.send_continue().map_err(|e| e.to_string())?;
    engine.state = EngineState::Running;
    Ok(running_reply())
}

fn step(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    engine.client.as_mut().ok_or("no target connected")?.send_step().map_err(|e| e.to_string())?;
    engine.state = EngineState::Running;
    Ok(running_reply())
}

fn interrupt(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    engine.client.as_mut().ok_or("no target connected")?.send_interrupt().map_err(|e| e.to_string())?;
    Ok(HandlerOutput::just(MiReply::Done(Vec::new())))
}

fn running_reply() -> HandlerOutput {
    HandlerOutput {
        pre: Vec::new(),
        reply: MiReply::Running,
        post: vec![MiReply::Async(AsyncKind::RunningExec, vec![field("thread-id", val("1"))])],
    }
}
