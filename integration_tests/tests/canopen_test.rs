use integration_tests::prelude::*;

#[test]
fn test_sdo_request_routed_to_matching_node() {
    let _ = env_logger::try_init();
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = CanBus::new(BusId::Bus0, &tx, &io);

    let node = RecordingObserver::new_canopen(0x26);
    let other = RecordingObserver::new_canopen(0x30);
    bus.attach(&node, 0x626, 0x7FF, false).unwrap();
    bus.attach(&other, 0x630, 0x7FF, false).unwrap();

    let wire = SdoFrame::with_data(0x26, SdoCommand::Write, 0x1017, 0, &[0xE8, 0x03])
        .to_request_frame();
    bus.process(&wire);

    let requests = node.sdo_requests();
    assert_eq!(1, requests.len());
    assert_eq!(0x26, requests[0].node_id);
    assert_eq!(SdoCommand::Write, requests[0].cmd);
    assert_eq!(0x1017, requests[0].index);
    assert_eq!(&[0xE8, 0x03], requests[0].data());
    assert!(other.sdo_requests().is_empty());
    // Semantic routing, not the raw frame path
    assert!(node.frames().is_empty());
}

#[test]
fn test_sdo_response_routed_separately() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = CanBus::new(BusId::Bus0, &tx, &io);

    let node = RecordingObserver::new_canopen(0x26);
    bus.attach(&node, 0x5A6, 0x7FF, false).unwrap();

    let wire = SdoFrame::new(0x26, SdoCommand::WriteAck, 0x2000, 1).to_response_frame();
    bus.process(&wire);

    assert!(node.sdo_requests().is_empty());
    let responses = node.sdo_responses();
    assert_eq!(1, responses.len());
    assert_eq!(SdoCommand::WriteAck, responses[0].cmd);
    assert_eq!(0x2000, responses[0].index);
}

#[test]
fn test_pdo_range_routing() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = CanBus::new(BusId::Bus0, &tx, &io);

    let node = RecordingObserver::new_canopen(0x26);
    bus.attach(&node, 0x626, 0x7FF, false).unwrap();

    // In the PDO window regardless of the subscription filter
    bus.process(&CanFrame::new(CanId::std(0x205), &[1, 2, 3, 4]));
    // Below and above the window
    bus.process(&CanFrame::new(CanId::std(0x080), &[0]));
    bus.process(&CanFrame::new(CanId::std(0x701), &[5]));

    let pdos = node.pdos();
    assert_eq!(1, pdos.len());
    assert_eq!(0x205, pdos[0].id.raw());
    assert_eq!(&[1, 2, 3, 4], pdos[0].data());
}

#[test]
fn test_nmt_senders() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = CanBus::new(BusId::Bus0, &tx, &io);

    bus.send_node_start(0x26);
    bus.send_node_stop(0x26);
    bus.send_node_preop(0x26);
    bus.send_node_reset(0);

    let sent = tx.sent();
    assert_eq!(4, sent.len());
    for frame in &sent {
        assert_eq!(0, frame.id.raw());
        assert_eq!(2, frame.dlc);
    }
    assert_eq!([0x01, 0x26], [sent[0].data[0], sent[0].data[1]]);
    assert_eq!([0x02, 0x26], [sent[1].data[0], sent[1].data[1]]);
    assert_eq!([0x80, 0x26], [sent[2].data[0], sent[2].data[1]]);
    // Node 0 addresses all nodes
    assert_eq!([0x81, 0x00], [sent[3].data[0], sent[3].data[1]]);
}

#[test]
fn test_heartbeat_uses_master_id() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = CanBus::new(BusId::Bus0, &tx, &io);

    bus.send_heartbeat();
    bus.set_master_id(0x10);
    bus.send_heartbeat();

    let sent = tx.sent();
    assert_eq!(2, sent.len());
    assert_eq!(0x705, sent[0].id.raw());
    assert_eq!(&[0x05], sent[0].data());
    assert_eq!(0x710, sent[1].id.raw());
    assert_eq!(&[0x05], sent[1].data());
}

#[test]
fn test_send_pdo_validation() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = CanBus::new(BusId::Bus0, &tx, &io);

    bus.send_pdo(0x200, &[1, 2]).unwrap();
    assert!(bus.send_pdo(0x600, &[1]).is_err());
    assert!(bus.send_pdo(0x100, &[1]).is_err());
    assert!(bus.send_pdo(0x200, &[0; 9]).is_err());

    let sent = tx.sent();
    assert_eq!(1, sent.len());
    assert_eq!(0x200, sent[0].id.raw());
    assert_eq!(&[1, 2], sent[0].data());
}

#[test]
fn test_sdo_send_wire_format() {
    let tx = RecordingTransmitter::new();
    let io = SimIo::new();
    let bus = CanBus::new(BusId::Bus0, &tx, &io);

    bus.send_sdo_request(&SdoFrame::new(0x26, SdoCommand::Read, 0x2002, 4));
    bus.send_sdo_response(&SdoFrame::with_data(
        0x26,
        SdoCommand::WriteAck,
        0x2002,
        4,
        &[],
    ));

    let sent = tx.sent();
    assert_eq!(2, sent.len());
    assert_eq!(0x626, sent[0].id.raw());
    assert_eq!([0x40, 0x02, 0x20, 0x04, 0, 0, 0, 0], sent[0].data);
    assert_eq!(0x5A6, sent[1].id.raw());
    assert_eq!(0x60, sent[1].data[0]);
}
