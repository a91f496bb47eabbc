//! `var-create` / `var-update` / `var-delete`, grounded on
//! `gdbLlvimIrCmdVar.py`.

use crate::wire::MiCommand;

use super::engine::{HandlerOutput, MiEngine};
use super::reply::{field, list, tuple, val, MiReply};

pub fn handle(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    match cmd.name.as_str() {
        "var-create" => create(engine, cmd),
        "var-update" => update(engine, cmd),
        "var-delete" => delete(engine, cmd),
        _ => Err(format!("unsupported command {}", cmd.name)),
    }
}

fn create(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    let raw_name = cmd.args.last().ok_or("var-create: missing expression")?;
    let name = raw_name.trim_matches('"');

    if let Some(index) = engine.register_snapshot.iter().position(|r| r.name == name) {
        let value = engine
            .client
            .as_mut()
            .ok_or("no target connected")?
            .read_register(index as u64)
            .map_err(|e| e.to_string())?;
        let bitsize = engine.register_snapshot[index].bitsize;
        return Ok(HandlerOutput::just(MiReply::Done(vec![
            field("name", val(format!("var{index}"))),
            field("value", val(format!("0x{:x}", value))),
            field("numchild", val("0")),
            field("type", val(format!("i{bitsize}"))),
            field("thread-id", val("1")),
            field("has_more", val("0")),
        ])));
    }

    let n = engine.next_transient;
    engine.next_transient += 1;
    let var_name = format!("var{n}");
    engine.transient_vars.insert(name.to_string(), var_name.clone());

    Ok(HandlerOutput::just(MiReply::Done(vec![
        field("name", val(var_name)),
        field("value", val("0x0")),
        field("numchild", val("0")),
        field("type", val("int")),
        field("thread-id", val("1")),
        field("has_more", val("0")),
    ])))
}

fn var_index(name: &str) -> Result<usize, String> {
    name.strip_prefix("var")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| format!("Undefined variable object {name:?}"))
}

fn update(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    let name = cmd.args.first().ok_or("var-update: missing name")?;
    let index = var_index(name)?;
    if index >= engine.register_snapshot.len() {
        return Ok(HandlerOutput::just(MiReply::Done(vec![field("changelist", list(&[]))])));
    }
    let value = engine
        .client
        .as_mut()
        .ok_or("no target connected")?
        .read_register(index as u64)
        .map_err(|e| e.to_string())?;
    let entry = tuple(&[
        field("name", val(name.clone())),
        field("value", val(format!("0x{:x}", value))),
        field("in_scope", val("true")),
        field("type_changed", val("false")),
    ]);
    Ok(HandlerOutput::just(MiReply::Done(vec![field("changelist", list(&[entry]))])))
}

fn delete(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    let name = cmd.args.first().ok_or("var-delete: missing name")?;
    let index = var_index(name)?;
    if index >= engine.next_transient {
        return Err(format!("Undefined variable object {name:?}"));
    }
    Ok(HandlerOutput::just(MiReply::Done(vec![field("ndeleted", val("1"))])))
}
