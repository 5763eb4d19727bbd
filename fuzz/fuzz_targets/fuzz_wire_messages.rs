//! Fuzz target: backend replies and remote command lines
//!
//! Both parsers see untrusted network input. Neither may panic, and a
//! command that parses must carry a sequence number and acknowledge with
//! its mode label.
//!
//! cargo fuzz run fuzz_wire_messages

#![no_main]

use aura::rpc::messages::{ACK_ERROR, ack_for, decode_reply, parse_command};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_reply(data);

    let parsed = parse_command(data);
    let ack = ack_for(&parsed);
    match parsed {
        Ok(cmd) => assert_eq!(ack, format!("received:{}", cmd.mode.label())),
        Err(_) => assert_eq!(ack, ACK_ERROR),
    }
});
