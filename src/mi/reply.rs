//! Algebraic MI reply/async records, serialized by one formatter so
//! every call site builds fields instead of formatting strings by
//! hand.

use crate::wire::mi_escape;

/// An already-formatted `name=value` pair; `value` is whatever MI
/// value syntax the caller built (a quoted string, a `{...}` tuple, or
/// a `[...]` list).
pub type Field = (String, String);

pub fn field(name: &str, value: impl Into<String>) -> Field {
    (name.to_string(), value.into())
}

/// A plain string value, MI-quoted.
pub fn val(s: impl AsRef<str>) -> String {
    mi_escape(s.as_ref())
}

/// A `{k=v,...}` tuple value built from already-formatted fields.
pub fn tuple(fields: &[Field]) -> String {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

/// A `[v,...]` list value from already-formatted elements.
pub fn list(items: &[String]) -> String {
    format!("[{}]", items.join(","))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Stopped,
    RunningExec,
    ThreadGroupStarted,
    ThreadCreated,
    BreakpointCreated,
    BreakpointDeleted,
}

impl AsyncKind {
    fn symbol_and_name(self) -> (char, &'static str) {
        match self {
            AsyncKind::Stopped => ('*', "stopped"),
            AsyncKind::RunningExec => ('*', "running"),
            AsyncKind::ThreadGroupStarted => ('=', "thread-group-started"),
            AsyncKind::ThreadCreated => ('=', "thread-created"),
            AsyncKind::BreakpointCreated => ('=', "breakpoint-created"),
            AsyncKind::BreakpointDeleted => ('=', "breakpoint-deleted"),
        }
    }
}

/// One MI output record: a command reply or an unsolicited
/// notification. See the design note on replacing string-built
/// replies with an algebraic type serialized in one place.
#[derive(Debug, Clone)]
pub enum MiReply {
    Done(Vec<Field>),
    Running,
    Error(String),
    Connected,
    Async(AsyncKind, Vec<Field>),
}

impl MiReply {
    /// Render one CRLF-terminated output line. `token` is echoed only
    /// for result records (`^...`); async records never carry it.
    pub fn render(&self, token: Option<u64>) -> String {
        let mut out = String::new();
        match self {
            MiReply::Done(fields) => {
                push_token(&mut out, token);
                out.push_str("^done");
                push_fields(&mut out, fields);
            }
            MiReply::Running => {
                push_token(&mut out, token);
                out.push_str("^running");
            }
            MiReply::Error(msg) => {
                push_token(&mut out, token);
                out.push_str("^error,msg=");
                out.push_str(&val(msg));
            }
            MiReply::Connected => {
                push_token(&mut out, token);
                out.push_str("^connected");
            }
            MiReply::Async(kind, fields) => {
                let (sym, name) = kind.symbol_and_name();
                out.push(sym);
                out.push_str(name);
                push_fields(&mut out, fields);
            }
        }
        out.push_str("\r\n");
        out
    }
}

fn push_token(out: &mut String, token: Option<u64>) {
    if let Some(t) = token {
        out.push_str(&t.to_string());
    }
}

fn push_fields(out: &mut String, fields: &[Field]) {
    for (k, v) in fields {
        out.push(',');
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
}

pub const PROMPT: &str = "(gdb) \r\n";

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn done_with_token_and_fields() {
        let r = MiReply::Done(vec![field("value", val("8"))]);
        assert_eq!(r.render(Some(5)), "5^done,value=\"8\"\r\n");
    }

    #[test]
    fn async_never_carries_a_token() {
        let r = MiReply::Async(AsyncKind::BreakpointDeleted, vec![field("id", val("1"))]);
        assert_eq!(r.render(Some(9)), "=breakpoint-deleted,id=\"1\"\r\n");
    }

    #[test]
    fn error_escapes_the_message() {
        let r = MiReply::Error("bad \"cmd\"".to_string());
        assert_eq!(r.render(None), "^error,msg=\"bad \\\"cmd\\\"\"\r\n");
    }
}
