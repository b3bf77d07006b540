//! Round-trip properties of the buffer codec and the encrypted framing.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use voicechat_protocol::framing::{decode_clientbound, encode_clientbound};
use voicechat_protocol::io::ByteBuf;
use voicechat_protocol::packet::{GroupSoundPacket, PacketRegistry, SocketPacket};
use voicechat_protocol::{SessionCrypto, Uuid};

fn uuid_strategy() -> impl Strategy<Value = Uuid> {
    (any::<i64>(), any::<i64>()).prop_map(|(most, least)| Uuid::new(most, least))
}

// Property: VarInt round-trips and never exceeds five bytes
proptest! {
    #[test]
    fn prop_var_int_roundtrip(value in any::<i32>()) {
        let mut buf = ByteBuf::new();
        buf.write_var_int(value);
        prop_assert!(buf.writer_index() <= 5);
        prop_assert_eq!(buf.read_var_int().unwrap(), value);
        prop_assert_eq!(buf.readable_bytes(), 0);
    }
}

// Property: strings within the cap round-trip
proptest! {
    #[test]
    fn prop_utf_roundtrip(value in "\\PC{0,64}") {
        let mut buf = ByteBuf::new();
        buf.write_utf(&value, 256).unwrap();
        // 64 chars may need up to 128 UTF-16 units
        prop_assert_eq!(buf.read_utf(128).unwrap(), value);
    }
}

// Property: UUIDs round-trip through the wire and the string form
proptest! {
    #[test]
    fn prop_uuid_roundtrip(uuid in uuid_strategy()) {
        let mut buf = ByteBuf::new();
        buf.write_uuid(uuid);
        prop_assert_eq!(buf.read_uuid().unwrap(), uuid);

        let parsed: Uuid = uuid.to_string().parse().unwrap();
        prop_assert_eq!(parsed, uuid);
    }
}

// Property: fixed-width primitives round-trip in sequence
proptest! {
    #[test]
    fn prop_primitives_roundtrip(
        a in any::<i16>(),
        b in any::<i32>(),
        c in any::<i64>(),
        d in any::<f32>().prop_filter("finite", |v| v.is_finite()),
        e in any::<f64>().prop_filter("finite", |v| v.is_finite()),
        f in any::<bool>(),
        g in any::<u8>(),
    ) {
        let mut buf = ByteBuf::new();
        buf.write_i16(a);
        buf.write_i32(b);
        buf.write_i64(c);
        buf.write_f32(d);
        buf.write_f64(e);
        buf.write_bool(f);
        buf.write_u8(g);

        prop_assert_eq!(buf.read_i16().unwrap(), a);
        prop_assert_eq!(buf.read_i32().unwrap(), b);
        prop_assert_eq!(buf.read_i64().unwrap(), c);
        prop_assert_eq!(buf.read_f32().unwrap(), d);
        prop_assert_eq!(buf.read_f64().unwrap(), e);
        prop_assert_eq!(buf.read_bool().unwrap(), f);
        prop_assert_eq!(buf.read_u8().unwrap(), g);
    }
}

// Property: byte arrays round-trip when the cap allows them
proptest! {
    #[test]
    fn prop_byte_array_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let mut buf = ByteBuf::new();
        buf.write_byte_array(&data);
        prop_assert_eq!(buf.read_byte_array(data.len()).unwrap(), data);
    }
}

// Property: framing under a fixed secret returns the original packet
proptest! {
    #[test]
    fn prop_framing_roundtrip(
        secret in uuid_strategy(),
        sender in uuid_strategy(),
        data in prop::collection::vec(any::<u8>(), 0..1500),
        sequence_number in any::<i64>(),
        category in proptest::option::of("[a-z]{1,16}"),
    ) {
        let crypto = SessionCrypto::new(secret);
        let packet = SocketPacket::GroupSound(GroupSoundPacket {
            channel_id: sender,
            sender,
            data,
            sequence_number,
            category,
        });

        let datagram = encode_clientbound(&crypto, &packet).unwrap();
        let decoded = decode_clientbound(&crypto, &PacketRegistry::clientbound(), &datagram).unwrap();
        prop_assert_eq!(decoded, Some(packet));
    }
}
