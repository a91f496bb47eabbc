//! `stack-info-depth` / `stack-list-frames` / `stack-list-variables`,
//! grounded on `gdbLlvimIrCmdStack.py`. The simulator never has more
//! than one frame.

use crate::wire::MiCommand;

use super::engine::{HandlerOutput, MiEngine};
use super::reply::{field, list, tuple, val, MiReply};

pub fn handle(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    match cmd.name.as_str() {
        "stack-info-depth" => Ok(HandlerOutput::just(MiReply::Done(vec![field("depth", val("1"))]))),
        "stack-list-frames" => list_frames(engine),
        "stack-list-variables" => list_variables(engine),
        _ => Err(format!("unsupported command {}", cmd.name)),
    }
}

fn list_frames(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    let pc = engine.client.as_mut().ok_or("no target connected")?.read_register(0).map_err(|e| e.to_string())?;
    let codeline = pc / 8;
    let frame = tuple(&[
        field("level", val("0")),
        field("addr", val(format!("0x{:016x}", pc))),
        field("func", val("entry")),
        field("file", val("ir")),
        field("fullname", val("ir")),
        field("line", val(codeline.to_string())),
        field("arch", val("i386:x86-64")),
    ]);
    Ok(HandlerOutput::just(MiReply::Done(vec![field("stack", list(&[frame]))])))
}

fn list_variables(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    let vars: Vec<String> = engine
        .register_snapshot
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != 0)
        .map(|(_, r)| tuple(&[field("name", val(r.name.clone())), field("value", val("0"))]))
        .collect();
    Ok(HandlerOutput::just(MiReply::Done(vec![field("variables", list(&vars))])))
}
