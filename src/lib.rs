//! A GDB/MI front end bridged to a GDB Remote Serial Protocol target.
//!
//! [`wire`] implements the RSP frame codec and the MI command-line
//! lexer; [`target`] is the capability trait the RSP server stub
//! drives; [`server`] is that stub; [`client`] is the RSP client the
//! MI engine drives it with; [`mi`] is the MI engine and its
//! per-command-family handlers.

pub mod client;
pub mod mi;
pub mod server;
pub mod target;
pub mod wire;

pub use client::{ClientError, RspClient, Stop};
pub use server::{RspServer, ServerError};
pub use target::{LinearTarget, Target, TargetError};
pub use wire::{MiCommand, WireError};
