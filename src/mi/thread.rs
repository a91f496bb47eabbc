//! `thread-info`, grounded on `gdbLlvimIrCmdThread.py`. This bridge
//! never schedules more than the one fixed thread `1`.

use crate::wire::MiCommand;

use super::engine::{HandlerOutput, MiEngine};
use super::reply::{field, list, tuple, val, MiReply};

pub fn handle(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    match cmd.name.as_str() {
        "thread-info" => info(engine),
        _ => Err(format!("unsupported command {}", cmd.name)),
    }
}

fn info(engine: &mut MiEngine) -> Result<HandlerOutput, String> {
    let pc = engine.client.as_mut().ok_or("no target connected")?.read_register(0).map_err(|e| e.to_string())?;
    let codeline = pc / 8;
    let frame = tuple(&[
        field("level", val("0")),
        field("addr", val(format!("0x{:016x}", pc))),
        field("func", val("entry")),
        field("line", val(codeline.to_string())),
    ]);
    let thread = tuple(&[
        field("id", val("1")),
        field("target-id", val("Thread 1")),
        field("frame", frame),
        field("state", val("stopped")),
    ]);
    Ok(HandlerOutput::just(MiReply::Done(vec![
        field("threads", list(&[thread])),
        field("current-thread-id", val("1")),
    ])))
}
