//! `target-select remote host:port`, grounded on
//! `gdbLlvimIrCmdTarget.py`.

use crate::wire::MiCommand;

use super::engine::{HandlerOutput, MiEngine};
use super::reply::MiReply;

pub fn handle(engine: &mut MiEngine, cmd: &MiCommand) -> Result<HandlerOutput, String> {
    if cmd.args.first().map(String::as_str) != Some("remote") {
        return Err(format!("target-select: unsupported target kind {:?}", cmd.args.first()));
    }
    let addr = cmd.args.get(1).ok_or("target-select: missing host:port")?;
    engine.connect(addr).map_err(|e| e.to_string())?;
    Ok(HandlerOutput::just(MiReply::Done(Vec::new())))
}
