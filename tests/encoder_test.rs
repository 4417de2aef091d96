use osckit::{decoder, encoder};
use osckit::{Minimal, Osc10, Sclang, Scsynth};
use osckit::{OscArray, OscColor, OscError, OscMessage, OscMidiMessage, OscPacket, OscTime, OscType};

fn message(args: Vec<OscType>) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: "/probe".to_string(),
        args,
    })
}

/// Encode with one dialect and read back with Osc10, which understands
/// every tag the concrete dialects can emit.
fn transcode<D: osckit::Dialect>(args: Vec<OscType>) -> Vec<OscType> {
    let bytes = encoder::encode::<D>(&message(args)).expect("encode failed");
    assert_eq!(0, bytes.len() % 4);
    match decoder::decode_udp::<Osc10>(&bytes).expect("decode failed") {
        OscPacket::Message(message) => message.args,
        OscPacket::Bundle(_) => panic!("expected a message"),
    }
}

#[test]
fn test_minimal_narrows_long_and_double() {
    let args = transcode::<Minimal>(vec![(i64::from(i32::MAX) + 7).into(), 2.5f64.into()]);
    assert_eq!(vec![OscType::Int(i32::MAX), OscType::Float(2.5)], args);
}

#[test]
fn test_minimal_stringifies_the_rest() {
    let args = transcode::<Minimal>(vec![
        OscType::Nil,
        true.into(),
        'x'.into(),
        OscType::Inf,
    ]);
    assert_eq!(
        vec![
            OscType::String("NULL".into()),
            OscType::String("true".into()),
            OscType::String("x".into()),
            OscType::String("inf".into()),
        ],
        args
    );
}

#[test]
fn test_minimal_flattens_arrays() {
    let nested = vec![OscArray {
        content: vec![1i32.into(), "two".into()],
    }
    .into()];
    let flat = vec![1i32.into(), "two".into()];
    let packet_nested = encoder::encode::<Minimal>(&message(nested)).unwrap();
    let packet_flat = encoder::encode::<Minimal>(&message(flat)).unwrap();
    assert_eq!(packet_flat, packet_nested);
}

#[test]
fn test_osc10_nan_and_infinity_coercions() {
    let args = transcode::<Osc10>(vec![
        f32::NAN.into(),
        f32::INFINITY.into(),
        f64::NAN.into(),
        f64::NEG_INFINITY.into(),
        1.5f32.into(),
    ]);
    assert_eq!(
        vec![
            OscType::Nil,
            OscType::Inf,
            OscType::Nil,
            OscType::Inf,
            OscType::Float(1.5),
        ],
        args
    );
}

#[test]
fn test_osc10_keeps_arrays() {
    let packet = message(vec![OscArray {
        content: vec![1i32.into(), 2i32.into()],
    }
    .into()]);
    let bytes = encoder::encode::<Osc10>(&packet).unwrap();
    // "/probe\0\0" then ",[ii]\0\0\0"
    assert_eq!(&bytes[8..16], b",[ii]\0\0\0");
    assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).unwrap());
}

#[test]
fn test_sclang_booleans_and_nil() {
    let args = transcode::<Sclang>(vec![true.into(), false.into(), OscType::Nil]);
    assert_eq!(
        vec![OscType::Bool(true), OscType::Bool(false), OscType::Nil],
        args
    );
}

#[test]
fn test_sclang_clamps_longs() {
    let args = transcode::<Sclang>(vec![i64::MIN.into()]);
    assert_eq!(vec![OscType::Int(i32::MIN)], args);
}

#[test]
fn test_sclang_rejects_time_and_color() {
    let time = message(vec![OscTime::from((1, 2)).into()]);
    assert!(matches!(
        encoder::encode::<Sclang>(&time),
        Err(OscError::UnsupportedTag('t'))
    ));

    let color = message(vec![OscColor {
        red: 1,
        green: 2,
        blue: 3,
        alpha: 4,
    }
    .into()]);
    assert!(matches!(
        encoder::encode::<Sclang>(&color),
        Err(OscError::UnsupportedTag('r'))
    ));
}

#[test]
fn test_scsynth_booleans_are_ints_and_nil_is_a_string() {
    let args = transcode::<Scsynth>(vec![true.into(), false.into(), OscType::Nil]);
    assert_eq!(
        vec![
            OscType::Int(1),
            OscType::Int(0),
            OscType::String("NULL".into()),
        ],
        args
    );
}

#[test]
fn test_scsynth_rejects_exotic_tags() {
    let midi = message(vec![OscMidiMessage {
        port: 0,
        status: 0x90,
        data1: 60,
        data2: 100,
    }
    .into()]);
    assert!(matches!(
        encoder::encode::<Scsynth>(&midi),
        Err(OscError::UnsupportedTag('m'))
    ));
}

#[test]
fn test_blob_padding() {
    for (len, expected_span) in [(0usize, 4), (1, 8), (3, 8), (4, 8), (5, 12)] {
        let blob: Vec<u8> = (0..len as u8).collect();
        let bytes = encoder::encode::<Osc10>(&message(vec![blob.clone().into()])).unwrap();
        // address (8) + tags (4) + size prefix and padded payload
        assert_eq!(8 + 4 + expected_span, bytes.len(), "blob of {} bytes", len);
        match decoder::decode_udp::<Osc10>(&bytes).unwrap() {
            OscPacket::Message(m) => assert_eq!(vec![OscType::Blob(blob)], m.args),
            _ => unreachable!(),
        }
    }
}
