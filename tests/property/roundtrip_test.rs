// tests/property/roundtrip_test.rs

//! Property-based tests for frame encoding
//! Tests that every message survives packing and decoding, however the
//! byte stream is split up on the way.

use bytes::{Bytes, BytesMut};
use netmux::core::Message;
use netmux::core::protocol::{
    TCP_HEADER_LEN, TcpFrameCodec, pack_tcp, pack_websocket, unpack_tcp, unpack_websocket,
};
use proptest::prelude::*;
use std::io::Cursor;
use tokio_util::codec::Decoder;

fn message() -> impl Strategy<Value = Message> {
    (any::<u32>(), prop::collection::vec(any::<u8>(), 0..2048))
        .prop_map(|(id, data)| Message::new(id, data))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_tcp_frame_roundtrip(msg in message()) {
        let frame = pack_tcp(&msg).unwrap();
        prop_assert_eq!(frame.len(), TCP_HEADER_LEN + msg.data().len());

        let decoded = unpack_tcp(&mut Cursor::new(frame)).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn test_websocket_frame_roundtrip(msg in message()) {
        let decoded = unpack_websocket(pack_websocket(&msg)).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn test_codec_decodes_any_chunking(
        msgs in prop::collection::vec(message(), 1..16),
        chunk in 1usize..64,
    ) {
        let mut stream = BytesMut::new();
        for msg in &msgs {
            stream.extend_from_slice(&pack_tcp(msg).unwrap());
        }
        let stream: Bytes = stream.freeze();

        let mut codec = TcpFrameCodec::new(4096);
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in stream.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(msg) = codec.decode(&mut buf).unwrap() {
                decoded.push(msg);
            }
        }

        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded, msgs);
    }

    #[test]
    fn test_remaining_never_overshoots_the_frame(msg in message(), cut in 0usize..2056) {
        let frame = pack_tcp(&msg).unwrap();
        let cut = cut.min(frame.len());
        let codec = TcpFrameCodec::default();
        let buf = BytesMut::from(&frame[..cut]);

        let remaining = codec.remaining(&buf);
        if cut < TCP_HEADER_LEN {
            prop_assert_eq!(remaining, TCP_HEADER_LEN - cut);
        } else {
            prop_assert_eq!(remaining, frame.len() - cut);
        }
        prop_assert!(cut + remaining <= frame.len());
    }
}
