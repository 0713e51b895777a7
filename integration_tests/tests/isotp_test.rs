use integration_tests::prelude::*;

fn make_bus<'a>(tx: &'a RecordingTransmitter, io: &'a SimIo) -> CanBus<'a> {
    CanBus::new(BusId::Bus0, tx, io)
}

#[test]
fn test_single_frame() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = make_bus(&tx, &io);

    bus.send_isotp(0x7E0, &[0xDE, 0xAD, 0xBE]);

    let sent = tx.sent();
    assert_eq!(1, sent.len());
    assert_eq!(0x7E0, sent[0].id.raw());
    assert_eq!(4, sent[0].dlc);
    // Type code in the low nibble, payload length in the high nibble
    assert_eq!(&[0x30, 0xDE, 0xAD, 0xBE], sent[0].data());
}

#[test]
fn test_seven_bytes_still_fit_one_frame() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = make_bus(&tx, &io);

    bus.send_isotp(0x7E0, &[1, 2, 3, 4, 5, 6, 7]);

    let sent = tx.sent();
    assert_eq!(1, sent.len());
    assert_eq!(8, sent[0].dlc);
    assert_eq!(0x70, sent[0].data[0]);
}

#[test]
fn test_two_frame_payload() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = make_bus(&tx, &io);

    let payload: Vec<u8> = (1..=11).collect();
    bus.send_isotp(0x7E0, &payload);

    let sent = tx.sent();
    assert_eq!(2, sent.len());

    // First frame: 12-bit length and the first 6 payload bytes
    assert_eq!(8, sent[0].dlc);
    assert_eq!(0x01, sent[0].data[0]);
    assert_eq!(11, sent[0].data[1]);
    assert_eq!(&[1, 2, 3, 4, 5, 6], &sent[0].data[2..8]);

    // Consecutive frame carries the remaining 5 bytes with sequence number 0
    assert_eq!(6, sent[1].dlc);
    assert_eq!(0x02, sent[1].data[0]);
    assert_eq!(&[7, 8, 9, 10, 11], &sent[1].data[1..6]);
}

#[test]
fn test_sequence_numbers_advance() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = make_bus(&tx, &io);

    let payload: Vec<u8> = (0..20).collect();
    bus.send_isotp(0x7E0, &payload);

    let sent = tx.sent();
    assert_eq!(3, sent.len());
    assert_eq!(0x01, sent[0].data[0]);
    assert_eq!(20, sent[0].data[1]);
    assert_eq!(0x02, sent[1].data[0]);
    assert_eq!(8, sent[1].dlc);
    assert_eq!(&[6, 7, 8, 9, 10, 11, 12], &sent[1].data[1..8]);
    // Second consecutive frame: sequence 1 in the high nibble
    assert_eq!(0x12, sent[2].data[0]);
    assert_eq!(8, sent[2].dlc);
    assert_eq!(&[13, 14, 15, 16, 17, 18, 19], &sent[2].data[1..8]);
}

#[test]
fn test_long_payload_sequence_wraps() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = make_bus(&tx, &io);

    // 6 + 17 * 7 = 125 bytes: the 17th consecutive frame wraps back to sequence 0
    let payload = vec![0xA5u8; 125];
    bus.send_isotp(0x7E0, &payload);

    let sent = tx.sent();
    assert_eq!(18, sent.len());
    assert_eq!(0x02, sent[1].data[0]);
    assert_eq!(0xF2, sent[16].data[0]);
    assert_eq!(0x02, sent[17].data[0]);
}

#[test]
fn test_twelve_bit_length_header() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = make_bus(&tx, &io);

    let payload = vec![0u8; 300];
    bus.send_isotp(0x7E0, &payload);

    let sent = tx.sent();
    // 300 = 0x12C: the high length byte adds into byte 0, matching fielded receivers
    assert_eq!(0x02, sent[0].data[0]);
    assert_eq!(0x2C, sent[0].data[1]);
}
