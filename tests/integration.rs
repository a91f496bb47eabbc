//! End-to-end scenarios exercising the wire protocol, the RSP
//! server/client pair, and the MI engine together.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use mi_gdb_bridge::mi::MiEngine;
use mi_gdb_bridge::wire;
use mi_gdb_bridge::{LinearTarget, RspServer};

fn spawn_server(count: usize, bits: u32) -> String {
    let target = LinearTarget::new(count, bits, 6);
    let mut server = RspServer::bind("127.0.0.1:0", target).unwrap();
    let addr = server.local_addr().unwrap().to_string();
    thread::spawn(move || {
        let _ = server.accept_and_run();
    });
    addr
}

fn send_raw(conn: &mut TcpStream, payload: &[u8]) {
    conn.write_all(&wire::encode(payload)).unwrap();
}

/// Reads bytes until `buf` holds at least one complete frame/ack, then
/// returns it drained from the front.
fn recv_raw(conn: &mut TcpStream, buf: &mut Vec<u8>) -> wire::ReceivedPacket {
    loop {
        if let Some((consumed, pkt)) = wire::parse_one_frame(buf).unwrap() {
            buf.drain(..consumed);
            return pkt;
        }
        let mut chunk = [0u8; 256];
        let n = conn.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed mid-scenario");
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[test]
fn scenario_1_handshake() {
    let addr = spawn_server(3, 32);
    let mut conn = TcpStream::connect(&addr).unwrap();
    conn.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = Vec::new();

    send_raw(&mut conn, b"qSupported:multiprocess+;swbreak+;hwbreak+");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Ack);
    let reply = recv_raw(&mut conn, &mut buf);
    assert_eq!(reply, wire::ReceivedPacket::Packet(b"QStartNoAckMode+;swbreak+;hwbreak+".to_vec()));

    send_raw(&mut conn, b"vMustReplyEmpty");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Ack);
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(Vec::new()));

    send_raw(&mut conn, b"QStartNoAckMode");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Ack);
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"OK".to_vec()));

    // No further acks: both sides are now in no-ack mode.
    send_raw(&mut conn, b"?");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"S05".to_vec()));
}

#[test]
fn scenario_2_single_step_with_breakpoint() {
    let addr = spawn_server(3, 32);
    let mut conn = TcpStream::connect(&addr).unwrap();
    conn.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = Vec::new();

    send_raw(&mut conn, b"QStartNoAckMode");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Ack);
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"OK".to_vec()));

    send_raw(&mut conn, b"Z1,38,0"); // 0x38 == 7*8
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"OK".to_vec()));

    send_raw(&mut conn, b"c");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"OK".to_vec()));

    // registers retire at codelines 6, 7, 8; the successor of the
    // first retired instruction lands on the breakpoint at 7*8.
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"S05".to_vec()));
}

#[test]
fn single_step_delivers_a_stop_reply_once_its_one_cycle_budget_is_spent() {
    let addr = spawn_server(3, 32);
    let mut conn = TcpStream::connect(&addr).unwrap();
    conn.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = Vec::new();

    send_raw(&mut conn, b"QStartNoAckMode");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Ack);
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"OK".to_vec()));

    // `s` gives the target a 1-cycle budget; the instruction retires
    // on the first poll and the budget-exhaustion check on the next
    // poll is what turns into the single step's stop reply.
    send_raw(&mut conn, b"s");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"OK".to_vec()));
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"S05".to_vec()));
}

#[test]
fn scenario_3_interrupt_reaches_mi_as_stopped_sigint() {
    let addr = spawn_server(3, 32);
    let mut engine = MiEngine::new();
    let out = engine.handle_line(&format!("1-target-select remote {addr}\r\n"));
    assert!(out.contains("1^done"));

    let out = engine.handle_line("2-exec-continue\r\n");
    assert!(out.contains("2^running"));

    let out = engine.handle_line("3-exec-interrupt\r\n");
    assert!(out.contains("3^done"));

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let polled = engine.poll();
        if polled.contains("*stopped") {
            assert!(polled.contains("signal-name=\"SIGINT\""));
            assert!(polled.contains("signal-meaning=\"Interrupt\""));
            assert!(polled.contains("thread-id=\"1\""));
            assert!(polled.contains("stopped-threads=\"all\""));
            assert!(polled.contains("core=\"0\""));
            break;
        }
        assert!(std::time::Instant::now() < deadline, "no *stopped record arrived in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn scenario_4_register_read() {
    let addr = spawn_server(3, 32);
    let mut conn = TcpStream::connect(&addr).unwrap();
    conn.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = Vec::new();

    send_raw(&mut conn, b"QStartNoAckMode");
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Ack);
    assert_eq!(recv_raw(&mut conn, &mut buf), wire::ReceivedPacket::Packet(b"OK".to_vec()));

    send_raw(&mut conn, b"p0");
    let reply = recv_raw(&mut conn, &mut buf);
    assert_eq!(reply, wire::ReceivedPacket::Packet(b"3000000000000000".to_vec()));
}

#[test]
fn scenario_5_mi_break_insert() {
    let addr = spawn_server(3, 32);
    let mut engine = MiEngine::new();
    engine.handle_line(&format!("9-target-select remote {addr}\r\n"));

    let out = engine.handle_line("5-break-insert -f main\r\n");
    let expected_created =
        "=breakpoint-created,bkpt={number=\"0\",type=\"breakpoint\",disp=\"keep\",enabled=\"y\",\
addr=\"0x0000000000000030\",func=\"main\",file=\"ir\",fullname=\"ir\",line=\"6\"}\r\n";
    assert!(out.starts_with(expected_created));
    assert!(out.contains("5^done,bkpt={number=\"0\""));
    assert!(out.ends_with("(gdb) \r\n"));
}

#[test]
fn scenario_6_mi_var_create_for_known_register() {
    let addr = spawn_server(3, 32);
    let mut engine = MiEngine::new();
    engine.handle_line(&format!("9-target-select remote {addr}\r\n"));

    let out = engine.handle_line("7-var-create - * \"r2\"\r\n");
    assert!(out.contains("7^done,name=\"var3\""));
    assert!(out.contains("value=\"0x0\""));
    assert!(out.contains("numchild=\"0\""));
    assert!(out.contains("type=\"i32\""));
    assert!(out.contains("thread-id=\"1\""));
    assert!(out.contains("has_more=\"0\""));
    assert!(out.ends_with("(gdb) \r\n"));
}
