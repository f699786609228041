#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use hazelcast_core::protocol::codecs::client::ClientAuthentication;
use hazelcast_core::protocol::codecs::error::decode_error;
use hazelcast_core::protocol::{codec_registry, ClientMessageCodec, Operation};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = ClientMessageCodec::with_registry(codec_registry());
    let mut buf = BytesMut::from(data);

    while let Ok(Some(msg)) = codec.decode(&mut buf) {
        let _ = msg.correlation_id();
        let _ = msg.partition_id();
        let _ = ClientAuthentication::decode_response(&msg);
        let _ = ClientAuthentication::decode_request(&msg);
        let _ = decode_error(&msg);
    }
    let _ = codec.decode_eof(&mut buf);
});
