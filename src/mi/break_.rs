//! `break-insert` / `break-delete`, grounded on `gdbLlvimIrCmdBreak.py`.

use crate::wire::MiCommand;

use super::engine::{HandlerOutput, MiEngine};
use super::reply::{field, tuple, val, AsyncKind, MiReply};

pub fn handle(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    match cmd.name.as_str() {
        "break-insert" => insert(engine, cmd),
        "break-delete" => delete(engine, cmd),
        _ => Err(format!("unsupported command {}", cmd.name)),
    }
}

fn insert(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    let location = cmd
        .args
        .iter()
        .rev()
        .find(|a| !a.starts_with('-'))
        .ok_or_else(|| "break-insert: missing location".to_string())?;

    let codeline = match location.rsplit_once(':') {
        Some((_, line)) => line.parse::<u64>().map_err(|_| format!("bad line in {location}"))?,
        None => engine.entry_codeline,
    };

    let addr = codeline * 8;
    engine
        .client
        .as_mut()
        .ok_or("no target connected")?
        .break_insert(addr)
        .map_err(|e| e.to_string())?;

    let id = engine.next_bp_id;
    engine.next_bp_id += 1;
    engine.breakpoints.insert(id, codeline);

    let fields = vec![
        field("number", val(id.to_string())),
        field("type", val("breakpoint")),
        field("disp", val("keep")),
        field("enabled", val("y")),
        field("addr", val(format!("0x{:016x}", addr))),
        field("func", val(location.split(':').next().unwrap_or(location))),
        field("file", val("ir")),
        field("fullname", val("ir")),
        field("line", val(codeline.to_string())),
    ];
    let bkpt = tuple(&fields);

    Ok(HandlerOutput {
        pre: vec![MiReply::Async(AsyncKind::BreakpointCreated, vec![field("bkpt", bkpt.clone())])],
        reply: MiReply::Done(vec![field("bkpt", bkpt)]),
        post: Vec::new(),
    })
}

fn delete(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    let id: u32 = cmd
        .args
        .first()
        .ok_or("break-delete: missing breakpoint number")?
        .parse()
        .map_err(|_| "break-delete: not a number".to_string())?;
    let codeline = *engine.breakpoints.get(&id).ok_or_else(|| format!("no breakpoint number {id}"))?;
    engine
        .client
        .as_mut()
        .ok_or("no target connected")?
        .break_delete(codeline * 8)
        .map_err(|e| e.to_string())?;
    engine.breakpoints.remove(&id);

    Ok(HandlerOutput {
        pre: vec![MiReply::Async(AsyncKind::BreakpointDeleted, vec![field("id", val(id.to_string()))])],
        reply: MiReply::Done(Vec::new()),
        post: Vec::new(),
    })
}
