//! `mi-gdb-bridge`: a thin driver binary over the protocol core. Binds
//! the embedded RSP server stub, connects the MI engine to it as a
//! client, and runs the MI engine's loop against stdio.

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mi_gdb_bridge::mi::MiEngine;
use mi_gdb_bridge::{LinearTarget, RspServer};

const POLL_TIMEOUT: Duration = Duration::from_millis(5);

/// Command-line surface modeled on the subset of GDB/MI front-end
/// flags this bridge understands, plus the two flags that configure
/// the embedded simulator it owns instead of attaching to a real one.
#[derive(Parser, Debug)]
#[command(name = "mi-gdb-bridge", version)]
struct Args {
    /// Interpreter kind requested by the front-end; repeatable.
    #[arg(long)]
    interpreter: Vec<String>,
    /// A command to run before interactive input, as if typed. Repeatable.
    #[arg(long = "ex")]
    ex: Vec<String>,
    /// Skip init-file processing. Accepted for compatibility; this
    /// bridge has no init file so it is always a no-op.
    #[arg(long)]
    nx: bool,
    /// Suppress the startup banner.
    #[arg(short = 'q')]
    quiet: bool,
    /// Open PATH as the inferior's stdio instead of inheriting ours.
    #[arg(long)]
    tty: Option<PathBuf>,
    /// Raise log verbosity one level per repetition.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
    /// TCP port the embedded RSP server stub binds (0 = ephemeral).
    #[arg(long = "listen-port", default_value_t = 0)]
    listen_port: u16,
    /// Synthetic register count for the demo target: `N` or `N@bits`.
    #[arg(long, default_value = "3@32")]
    target: String,
}

fn parse_target_spec(spec: &str) -> anyhow::Result<(usize, u32)> {
    match spec.split_once('@') {
        Some((count, bits)) => Ok((count.parse()?, bits.parse()?)),
        None => Ok((spec.parse()?, 32)),
    }
}

fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    if args.tty.is_some() {
        // A real inferior TTY pair is outside this bridge's scope (see
        // the spec's non-goals); accept the flag for compatibility and
        // keep using our own stdio.
    }

    let (count, bits) = parse_target_spec(&args.target)?;
    let target = LinearTarget::new(count, bits, 6);

    let mut server = RspServer::bind(&format!("127.0.0.1:{}", args.listen_port), target)?;
    let server_addr: SocketAddr = server.local_addr()?;
    info!(%server_addr, "RSP server stub listening");

    let server_thread = thread::spawn(move || {
        if let Err(e) = server.accept_and_run() {
            error!(error = %e, "RSP server stub exited with error");
        }
    });

    let mut engine = MiEngine::new();
    engine.connect(&server_addr.to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if !args.quiet {
        write!(out, "mi-gdb-bridge {}\r\n", env!("CARGO_PKG_VERSION"))?;
    }

    for cmd in &args.ex {
        let rendered = engine.handle_line(&format!("{cmd}\r\n"));
        out.write_all(rendered.as_bytes())?;
    }
    out.flush()?;

    let (tx, rx) = mpsc::channel::<Option<String>>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if tx.send(Some(l)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(None);
    });

    loop {
        match rx.recv_timeout(POLL_TIMEOUT) {
            Ok(Some(line)) => {
                if line.trim() == "gdb-exit" {
                    break;
                }
                let rendered = engine.handle_line(&format!("{line}\r\n"));
                out.write_all(rendered.as_bytes())?;
                out.flush()?;
            }
            Ok(None) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let rendered = engine.poll();
                if !rendered.is_empty() {
                    out.write_all(rendered.as_bytes())?;
                    out.flush()?;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.disconnect();
    let _ = server_thread.join();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn target_spec_with_explicit_bitwidth() {
        assert_eq!(parse_target_spec("4@16").unwrap(), (4, 16));
    }

    #[test]
    fn target_spec_defaults_to_32_bits() {
        assert_eq!(parse_target_spec("4").unwrap(), (4, 32));
    }

    #[test]
    fn args_parse_repeated_ex_and_tty_and_listen_port() {
        let args = Args::parse_from([
            "mi-gdb-bridge",
            "--ex",
            "break main",
            "--ex",
            "run",
            "--tty",
            "/dev/pts/4",
            "--listen-port",
            "4242",
        ]);
        assert_eq!(args.ex, vec!["break main", "run"]);
        assert_eq!(args.tty, Some(PathBuf::from("/dev/pts/4")));
        assert_eq!(args.listen_port, 4242);
    }
}
