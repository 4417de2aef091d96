use osckit::{decoder, encoder};
use osckit::{Minimal, Osc10};
use osckit::{OscArray, OscBundle, OscColor, OscMessage, OscMidiMessage, OscPacket, OscTime, OscType};

// The four golden scenarios of the wire format.
const GOLDEN_INT_MESSAGE: &str = "2f666f6f000000002c6900000000002a";
const GOLDEN_TRUE_MESSAGE: &str = "2f626172000000002c540000";
const GOLDEN_EMPTY_MESSAGE: &str = "2f7800002c000000";
const GOLDEN_IMMEDIATE_BUNDLE: &str =
    "2362756e646c65000000000000000001000000102f666f6f000000002c6900000000002a";

#[test]
fn test_golden_int_message() {
    let packet = OscPacket::Message(OscMessage::new("/foo", (42i32,)));

    let bytes = encoder::encode::<Osc10>(&packet).expect("encode failed");
    assert_eq!(hex::decode(GOLDEN_INT_MESSAGE).unwrap(), bytes);

    assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).expect("decode failed"));
}

#[test]
fn test_golden_true_message() {
    // `T` carries no payload: the message ends after the tag string.
    let packet = OscPacket::Message(OscMessage::new("/bar", (true,)));

    let bytes = encoder::encode::<Osc10>(&packet).expect("encode failed");
    assert_eq!(hex::decode(GOLDEN_TRUE_MESSAGE).unwrap(), bytes);

    assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).expect("decode failed"));
}

#[test]
fn test_golden_empty_message() {
    let packet = OscPacket::Message(OscMessage::from("/x"));

    let full = encoder::encode::<Osc10>(&packet).expect("encode failed");
    assert_eq!(hex::decode(GOLDEN_EMPTY_MESSAGE).unwrap(), full);

    // Minimal emits the same bytes: the empty type tag string convention
    // is shared.
    let minimal = encoder::encode::<Minimal>(&packet).expect("encode failed");
    assert_eq!(full, minimal);

    assert_eq!(packet, decoder::decode_udp::<Osc10>(&full).expect("decode failed"));
}

#[test]
fn test_golden_immediate_bundle() {
    let packet = OscPacket::Bundle(OscBundle {
        timetag: OscTime::IMMEDIATE,
        content: vec![OscPacket::Message(OscMessage::new("/foo", (42i32,)))],
    });

    let bytes = encoder::encode::<Osc10>(&packet).expect("encode failed");
    assert_eq!(hex::decode(GOLDEN_IMMEDIATE_BUNDLE).unwrap(), bytes);

    assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).expect("decode failed"));
}

#[test]
fn test_message_with_all_types_round_trip() {
    let packet = OscPacket::Message(OscMessage {
        addr: "/synth/3/control".to_string(),
        args: vec![
            4i32.into(),
            42i64.into(),
            3.1415926f32.into(),
            3.14159265359f64.into(),
            "a string".into(),
            vec![1u8, 2u8, 3u8].into(),
            (123u32, 456u32).into(),
            'k'.into(),
            false.into(),
            true.into(),
            OscType::Nil,
            OscType::Inf,
            OscMidiMessage {
                port: 4,
                status: 41,
                data1: 42,
                data2: 129,
            }
            .into(),
            OscColor {
                red: 255,
                green: 192,
                blue: 42,
                alpha: 13,
            }
            .into(),
            OscArray {
                content: vec![
                    42i32.into(),
                    OscArray {
                        content: vec![1.23f32.into(), 3.21f32.into()],
                    }
                    .into(),
                    "inner".into(),
                ],
            }
            .into(),
        ],
    });

    let bytes = encoder::encode::<Osc10>(&packet).expect("encode failed");
    assert_eq!(0, bytes.len() % 4);
    assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).expect("decode failed"));
}

#[test]
fn test_minimal_round_trip() {
    let packet = OscPacket::Message(OscMessage {
        addr: "/basic".to_string(),
        args: vec![
            7i32.into(),
            (-1.5f32).into(),
            "plain".into(),
            vec![0u8, 255u8].into(),
        ],
    });
    let bytes = encoder::encode::<Minimal>(&packet).expect("encode failed");
    assert_eq!(0, bytes.len() % 4);
    assert_eq!(packet, decoder::decode_udp::<Minimal>(&bytes).expect("decode failed"));
}

#[test]
fn test_empty_bundle_round_trip() {
    let packet = OscPacket::Bundle(OscBundle {
        timetag: (4, 2).into(),
        content: vec![],
    });
    let bytes = encoder::encode::<Osc10>(&packet).expect("encode failed");
    assert_eq!(16, bytes.len());
    assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).expect("decode failed"));
}

#[test]
fn test_deeply_nested_bundle_round_trip() {
    // Four levels of nesting with ascending time tags; every tag must
    // survive bit-exact.
    let mut packet = OscPacket::Message(OscMessage::new("/leaf", (1i32, "deep")));
    for level in 0u32..4 {
        packet = OscPacket::Bundle(OscBundle {
            timetag: (1000 + level, 0xdead_0000 + level).into(),
            content: vec![
                packet,
                OscPacket::Message(OscMessage::from(format!("/level/{}", level).as_str())),
            ],
        });
    }

    let bytes = encoder::encode::<Osc10>(&packet).expect("encode failed");
    assert_eq!(0, bytes.len() % 4);
    assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).expect("decode failed"));
}

#[test]
fn test_alignment_invariant() {
    let messages = [
        OscMessage::from("/a"),
        OscMessage::new("/ab", ("x",)),
        OscMessage::new("/abc", (vec![1u8],)),
        OscMessage::new("/abcd/efg", ("some longer string value", 9i32)),
    ];
    for message in messages {
        let bytes = encoder::encode::<Osc10>(&OscPacket::Message(message.clone())).unwrap();
        assert_eq!(0, bytes.len() % 4, "message {:?}", message.addr);

        let bundled = OscPacket::Bundle(OscBundle {
            timetag: OscTime::IMMEDIATE,
            content: vec![OscPacket::Message(message)],
        });
        let bytes = encoder::encode::<Osc10>(&bundled).unwrap();
        assert_eq!(0, bytes.len() % 4);
    }
}
