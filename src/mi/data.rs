//! `data-evaluate-expression` and the register-value queries,
//! grounded on `gdbLlvimIrCmdData.py`.

use crate::wire::MiCommand;

use super::engine::{register_value_list, HandlerOutput, MiEngine};
use super::reply::{field, list, val, MiReply};

pub fn handle(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    match cmd.name.as_str() {
        "data-evaluate-expression" => evaluate(engine, cmd),
        "data-list-register-names" => Ok(HandlerOutput::just(MiReply::Done(vec![field(
            "register-names",
            list(&[]),
        )]))),
        "data-list-register-values" => list_values(engine),
        _ => Err(format!("unsupported command {}", cmd.name)),
    }
}

fn evaluate(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    let expr = cmd.args.first().ok_or("data-evaluate-expression: missing expr")?;
    let expr = expr.trim_matches('"');

    if expr == "sizeof(void*)" {
        return Ok(HandlerOutput::just(MiReply::Done(vec![field("value", val("8"))])));
    }

    let index = engine
        .register_snapshot
        .iter()
        .position(|r| r.name == expr)
        .ok_or_else(|| format!("No symbol \"{expr}\" in current context."))?;
    let value = engine
        .client
        .as_mut()
        .ok_or("no target connected")?
        .read_register(index as u64)
        .map_err(|e| e.to_string())?;

    Ok(HandlerOutput::just(MiReply::Done(vec![field("value", val(format!("0x{:x}", value)))])))
}

fn list_values(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    let count = engine.register_snapshot.len();
    let mut values = Vec::with_capacity(count.saturating_sub(1));
    for i in 1..count {
        let v = engine
            .client
            .as_mut()
            .ok_or("no target connected")?
            .read_register(i as u64)
            .map_err(|e| e.to_string())?;
        values.push((i - 1, format!("0x{:x}", v)));
    }
    let rendered = register_value_list(engine, &values);
    Ok(HandlerOutput::just(MiReply::Done(vec![field("register-values", rendered)])))
}
