#![no_main]

//! Fuzz target for SMTP reply parsing.
//!
//! Server replies are untrusted input. Parsing must never panic, and a
//! successful parse must never claim more bytes than it was given.

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use notify_smtp::SmtpCodec;
use notify_smtp::codec::{DEFAULT_MAX_LINE_LENGTH, parse_reply};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    if let Ok(Some((reply, consumed))) = parse_reply(data, DEFAULT_MAX_LINE_LENGTH) {
        assert!(consumed <= data.len());
        assert!((200..600).contains(&reply.code().as_u16()));
        let _ = reply.to_string();
    }

    // Drive the framed decoder over the same bytes until it stalls.
    let mut codec = SmtpCodec::new();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_reply)) = codec.decode(&mut buf) {}
});
