use osckit::slip::{self, SlipDecoder, END, ESC, ESC_END, ESC_ESC};
use osckit::{decoder, OscError, OscPacket};

#[test]
fn test_encode_frame_wraps_in_end_bytes() {
    assert_eq!(slip::encode_frame(&[1, 2, 3]), vec![END, 1, 2, 3, END]);
}

#[test]
fn test_escape_bytes_on_the_wire() {
    // A payload of [END, ESC] must appear as C0 DB DC DB DD C0.
    let encoded = slip::encode_frame(&[0xC0, 0xDB]);
    assert_eq!(encoded, vec![END, ESC, ESC_END, ESC, ESC_ESC, END]);

    let mut decoder = SlipDecoder::new();
    let frames = decoder.push(&encoded).unwrap();
    assert_eq!(frames, vec![vec![0xC0, 0xDB]]);
}

#[test]
fn test_split_across_reads() {
    let mut slip_decoder = SlipDecoder::new();

    // First read carries the opening END and one payload byte.
    let frames = slip_decoder.push(&[0xC0, 0x2f]).unwrap();
    assert!(frames.is_empty());

    // Second read completes the frame.
    let frames = slip_decoder
        .push(&[0x61, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0xC0])
        .unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), 8);

    match decoder::decode(&frames[0]).unwrap() {
        OscPacket::Message(msg) => {
            assert_eq!(msg.addr, "/a");
            assert!(msg.args.is_empty());
        }
        _ => panic!("Expected an OscMessage!"),
    }
}

#[test]
fn test_chunking_does_not_change_the_frame_stream() {
    let payloads: Vec<Vec<u8>> = vec![
        vec![1, 2, 3],
        vec![0xC0, 0xDB, 0xC0],
        (0u8..=255).collect(),
        vec![42],
    ];
    let stream: Vec<u8> = payloads
        .iter()
        .flat_map(|p| slip::encode_frame(p))
        .collect();

    // Whole stream at once.
    let mut whole = SlipDecoder::new();
    let baseline = whole.push(&stream).unwrap();
    assert_eq!(baseline, payloads);

    // Byte by byte.
    let mut dribble = SlipDecoder::new();
    let mut collected = Vec::new();
    for byte in &stream {
        collected.extend(dribble.push(std::slice::from_ref(byte)).unwrap());
    }
    assert_eq!(collected, payloads);

    // A few awkward chunk sizes.
    for chunk_len in [2, 3, 7, 64] {
        let mut chunked = SlipDecoder::new();
        let mut collected = Vec::new();
        for chunk in stream.chunks(chunk_len) {
            collected.extend(chunked.push(chunk).unwrap());
        }
        assert_eq!(collected, payloads, "chunk size {chunk_len}");
    }
}

#[test]
fn test_empty_frames_are_ignored() {
    let mut decoder = SlipDecoder::new();

    // An empty payload encodes to two ENDs and decodes to nothing.
    let frames = decoder.push(&slip::encode_frame(&[])).unwrap();
    assert!(frames.is_empty());

    // Runs of END bytes produce no spurious frames either.
    let frames = decoder.push(&[END, END, END, END]).unwrap();
    assert!(frames.is_empty());

    let frames = decoder.push(&[END, 9, END, END, 8, END]).unwrap();
    assert_eq!(frames, vec![vec![9], vec![8]]);
}

#[test]
fn test_noise_before_first_frame_is_discarded() {
    let mut decoder = SlipDecoder::new();
    let frames = decoder.push(&[1, 2, 3, END, 7, 7, END]).unwrap();
    assert_eq!(frames, vec![vec![7, 7]]);
}

#[test]
fn test_bad_escape() {
    let mut decoder = SlipDecoder::new();
    let err = decoder.push(&[END, 1, ESC, 0x00]).unwrap_err();
    assert!(matches!(err, OscError::BadEscape(0x00)));
}

#[test]
fn test_frame_too_large() {
    let mut decoder = SlipDecoder::with_max_frame(16);
    let mut stream = vec![END];
    stream.extend_from_slice(&[0x55; 17]);
    assert!(matches!(
        decoder.push(&stream),
        Err(OscError::FrameTooLarge(16))
    ));
}

#[test]
fn test_escaped_bytes_count_against_the_cap() {
    // 4 escaped bytes decode to 4 payload bytes; cap of 4 is exact.
    let mut decoder = SlipDecoder::with_max_frame(4);
    let mut stream = vec![END];
    for _ in 0..4 {
        stream.extend_from_slice(&[ESC, ESC_END]);
    }
    stream.push(END);
    let frames = decoder.push(&stream).unwrap();
    assert_eq!(frames, vec![vec![0xC0; 4]]);
}
