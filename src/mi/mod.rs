//! The MI front-end: command parsing, the seven command-family
//! handlers, and the algebraic reply type they share.

mod break_;
mod data;
mod engine;
mod exec;
mod reply;
mod stack;
mod target_select;
mod thread;
mod var;

pub use engine::{EngineState, HandlerOutput, MiEngine};
pub use reply::{AsyncKind, MiReply, PROMPT};

#[cfg(test)]
mod test {
    use super::*;
    use crate::server::RspServer;
    use crate::target::LinearTarget;
    use std::thread;

    fn spawn_server() -> String {
        let target = LinearTarget::new(3, 32, 6);
        let mut server = RspServer::bind("127.0.0.1:0", target).unwrap();
        let addr = server.local_addr().unwrap().to_string();
        thread::spawn(move || {
            let _ = server.accept_and_run();
        });
        addr
    }

    #[test]
    fn break_insert_by_function_name_emits_breakpoint_created_then_done() {
        let addr = spawn_server();
        let mut engine = MiEngine::new();
        let out = engine.handle_line(&format!("9-target-select remote {addr}\r\n"));
        assert!(out.contains("9^done"));

        let out = engine.handle_line("5-break-insert -f main\r\n");
        assert!(out.starts_with("=breakpoint-created,bkpt={number=\"0\""));
        assert!(out.contains("line=\"6\""));
        assert!(out.contains("5^done,bkpt={"));
        assert!(out.ends_with(PROMPT));
    }

    #[test]
    fn var_create_for_known_register_reports_its_value() {
        let addr = spawn_server();
        let mut engine = MiEngine::new();
        engine.handle_line(&format!("9-target-select remote {addr}\r\n"));

        let out = engine.handle_line("7-var-create - * \"r0\"\r\n");
        assert!(out.contains("7^done,name=\"var1\""));
        assert!(out.contains("numchild=\"0\""));
        assert!(out.contains("thread-id=\"1\""));
    }

    #[test]
    fn stack_list_variables_excludes_the_synthetic_pc() {
        let addr = spawn_server();
        let mut engine = MiEngine::new();
        engine.handle_line(&format!("9-target-select remote {addr}\r\n"));

        let out = engine.handle_line("4-stack-list-variables\r\n");
        assert!(!out.contains("name=\"pc\""));
        assert!(out.contains("name=\"r0\""));
    }

    #[test]
    fn data_list_register_values_excludes_the_pc_and_renumbers_from_zero() {
        let addr = spawn_server();
        let mut engine = MiEngine::new();
        engine.handle_line(&format!("9-target-select remote {addr}\r\n"));

        let out = engine.handle_line("6-data-list-register-values x\r\n");
        assert!(out.contains("6^done,register-values=[{number=\"0\""));
        assert!(!out.contains("number=\"3\""));
    }

    #[test]
    fn unrecognized_command_replies_with_escaped_error() {
        let mut engine = MiEngine::new();
        let out = engine.handle_line("3-nonsense-command\r\n");
        assert_eq!(out, "3^error,msg=\"3-nonsense-command\"\r\n(gdb) \r\n");
    }

    #[test]
    fn exec_continue_emits_running_before_running_exec_async() {
        let addr = spawn_server();
        let mut engine = MiEngine::new();
        engine.handle_line(&format!("1-target-select remote {addr}\r\n"));
        let out = engine.handle_line("2-exec-continue\r\n");
        let running_pos = out.find("2^running").unwrap();
        let star_running_pos = out.find("*running").unwrap();
        assert!(running_pos < star_running_pos);
    }
}
