//! End-to-end behaviour of the communicator over a simulated serial link.

use {
    crossbeam_channel::unbounded,
    masterlink::{
        BackgroundConsumer, ChannelHandler, CommunicatorConfig, Direction, Error, ErrorKind, Fields,
        MasterCommunicator, Mode, SimulatedDevice, SimulatedPort, Svt, Transport, api,
    },
    parking_lot::Mutex,
    std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::{Duration, Instant},
    },
};

const WAIT: Duration = Duration::from_secs(2);

fn config() -> CommunicatorConfig {
    CommunicatorConfig::default()
        .with_read_timeout(Duration::from_millis(20))
        .with_maintenance_drain(Duration::from_millis(100))
        .with_transport_backoff(Duration::from_millis(20), Duration::from_millis(80))
}

fn setup_with(config: CommunicatorConfig) -> (MasterCommunicator, SimulatedDevice) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (port, device) = SimulatedPort::pair("sim0");
    let transport = Transport::new(Box::new(port)).unwrap();
    let communicator = MasterCommunicator::new(transport, config);
    communicator.start().unwrap();
    (communicator, device)
}

fn setup() -> (MasterCommunicator, SimulatedDevice) {
    setup_with(config())
}

fn light_on(number: u8) -> Fields {
    Fields::new()
        .with("action_type", api::BA_LIGHT_ON)
        .with("action_number", number)
}

fn ba_reply(cid: u8, resp: &str) -> Vec<u8> {
    api::basic_action()
        .create_output(cid, &Fields::new().with("resp", resp))
        .unwrap()
}

/// Answer every BA request with "OK", wrapped in `before` and `after`.
fn answer_ba(device: &SimulatedDevice, before: &'static [u8], after: &'static [u8]) {
    device.on_request(move |request| {
        request.starts_with(b"STRBA").then(|| {
            let mut reply = before.to_vec();
            reply.extend(ba_reply(request[5], "OK"));
            reply.extend_from_slice(after);
            reply
        })
    });
}

fn humidity_reply(cid: u8, valid: bool) -> Vec<u8> {
    let mut fields = Fields::new();
    for i in 0..32u8 {
        let raw = if valid { i } else { 2 * i };
        fields.insert(&format!("hum{i}"), Svt::from_raw(raw));
    }
    let crc = if valid { [b'C', 1, 240] } else { [b'C', 0, 0] };
    fields.insert("crc", crc.to_vec());
    api::sensor_humidity_list()
        .create_output(cid, &fields)
        .unwrap()
}

#[test]
fn test_command_round_trip() {
    let (communicator, device) = setup();
    answer_ba(&device, b"", b"");

    let reply = communicator
        .do_command(api::basic_action(), &light_on(5))
        .unwrap();
    assert_eq!(reply.get_str("resp").as_deref(), Some("OK"));

    let written = device.written();
    assert_eq!(written.len(), 21);
    assert_eq!(&written[..6], b"STRBA\x01");
    assert_eq!(written[6], api::BA_LIGHT_ON);
    assert_eq!(written[7], 5);
    assert!(written.ends_with(b"\r\n"));
}

#[test]
fn test_concurrent_commands_are_serialized() {
    const THREADS: usize = 4;
    const CALLS: usize = 5;

    let (communicator, device) = setup();
    let communicator = Arc::new(communicator);

    // The device answers each request only after checking that no second
    // request was written while the first was unanswered
    let overlap = Arc::new(AtomicUsize::new(0));
    let answering = {
        let device = device.clone();
        let overlap = Arc::clone(&overlap);
        thread::spawn(move || {
            for i in 0..THREADS * CALLS {
                let end = (i + 1) * 21;
                assert!(device.wait_for_written(end, Duration::from_secs(10)));
                thread::sleep(Duration::from_millis(5));
                let written = device.written();
                if written.len() > end {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                let request = &written[end - 21..end];
                // Echo the action number back as the reply text
                let resp = format!("{:02}", request[7]);
                device.inject(&ba_reply(request[5], &resp));
            }
        })
    };

    let callers: Vec<_> = (0..THREADS)
        .map(|t| {
            let communicator = Arc::clone(&communicator);
            thread::spawn(move || {
                for c in 0..CALLS {
                    let number = u8::try_from(t * 10 + c).unwrap();
                    let reply = communicator
                        .do_command_with_timeout(
                            api::basic_action(),
                            &light_on(number),
                            Duration::from_secs(10),
                        )
                        .unwrap();
                    assert_eq!(reply.get_str("resp"), Some(format!("{number:02}")));
                }
            })
        })
        .collect();

    for caller in callers {
        caller.join().unwrap();
    }
    answering.join().unwrap();
    assert_eq!(overlap.load(Ordering::SeqCst), 0);
}

#[test]
fn test_timeout_frees_the_slot() {
    let (communicator, device) = setup();

    let started = Instant::now();
    let err = communicator
        .do_command_with_timeout(
            api::basic_action(),
            &light_on(1),
            Duration::from_millis(150),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CommunicationTimedOut { command: "BA", .. }
    ));
    assert!(started.elapsed() >= Duration::from_millis(150));

    answer_ba(&device, b"", b"");
    let reply = communicator
        .do_command(api::basic_action(), &light_on(2))
        .unwrap();
    assert_eq!(reply.get_str("resp").as_deref(), Some("OK"));
}

#[test]
fn test_late_reply_is_discarded() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();

    assert!(
        communicator
            .do_command_with_timeout(
                api::basic_action(),
                &light_on(1),
                Duration::from_millis(100),
            )
            .is_err()
    );

    // The first call (cid 1) gave up; its reply must not reach anyone
    device.inject(&ba_reply(1, "NO"));
    answer_ba(&device, b"", b"");
    let reply = communicator
        .do_command(api::basic_action(), &light_on(2))
        .unwrap();
    assert_eq!(reply.get_str("resp").as_deref(), Some("OK"));
    assert_eq!(
        communicator
            .get_passthrough_data(Duration::from_millis(100))
            .unwrap(),
        None
    );
}

#[test]
fn test_resynchronizes_after_garbage() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    answer_ba(&device, b"junk", b"");

    let reply = communicator
        .do_command(api::basic_action(), &light_on(1))
        .unwrap();
    assert_eq!(reply.get_str("resp").as_deref(), Some("OK"));
    assert_eq!(
        communicator.get_passthrough_data(WAIT).unwrap(),
        Some(b"junk".to_vec())
    );
}

#[test]
fn test_crc_failure_fails_fast() {
    let (communicator, device) = setup();
    let calls = AtomicUsize::new(0);
    device.on_request(move |request| {
        request.starts_with(b"STRhh").then(|| {
            let valid = calls.fetch_add(1, Ordering::SeqCst) > 0;
            humidity_reply(request[5], valid)
        })
    });

    let started = Instant::now();
    let err = communicator
        .do_command_with_timeout(
            api::sensor_humidity_list(),
            &Fields::new(),
            Duration::from_secs(5),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CrcCheckFailed {
            command: "hh",
            expected: 992,
            actual: 0,
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Checksum);
    assert!(started.elapsed() < Duration::from_secs(2));

    let reply = communicator
        .do_command(api::sensor_humidity_list(), &Fields::new())
        .unwrap();
    assert_eq!(reply.get_svt("hum31"), Some(Svt::from_raw(31)));
}

#[test]
fn test_passthrough_keeps_arrival_order() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    answer_ba(&device, b"hello", b"");

    communicator
        .do_command(api::basic_action(), &light_on(1))
        .unwrap();
    device.inject(b"world");

    assert_eq!(
        communicator.get_passthrough_data(WAIT).unwrap(),
        Some(b"hello".to_vec())
    );
    assert_eq!(
        communicator.get_passthrough_data(WAIT).unwrap(),
        Some(b"world".to_vec())
    );
}

#[test]
fn test_unclaimed_bytes_of_one_read_form_one_chunk() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    answer_ba(&device, b"hello", b" world");

    communicator
        .do_command(api::basic_action(), &light_on(1))
        .unwrap();
    assert_eq!(
        communicator.get_passthrough_data(WAIT).unwrap(),
        Some(b"hello world".to_vec())
    );
}

#[test]
fn test_passthrough_requires_enable() {
    let (communicator, _device) = setup();
    assert!(matches!(
        communicator.get_passthrough_data(Duration::ZERO),
        Err(Error::PassthroughDisabled)
    ));
    assert!(matches!(
        communicator.send_passthrough_data(b"x"),
        Err(Error::PassthroughDisabled)
    ));
}

#[test]
fn test_send_passthrough_data_writes_raw() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    communicator.send_passthrough_data(b"raw bytes").unwrap();
    assert_eq!(device.written(), b"raw bytes");
}

#[test]
fn test_maintenance_round_trip() {
    let (communicator, device) = setup();
    let communicator = Arc::new(communicator);

    let outstanding = {
        let communicator = Arc::clone(&communicator);
        thread::spawn(move || {
            communicator.do_command_with_timeout(
                api::basic_action(),
                &light_on(1),
                Duration::from_secs(5),
            )
        })
    };
    assert!(device.wait_for_written(21, WAIT));

    communicator.start_maintenance_mode().unwrap();
    assert!(matches!(
        outstanding.join().unwrap(),
        Err(Error::InMaintenanceMode)
    ));
    assert_eq!(communicator.mode(), Mode::Maintenance);

    // The CLI switch is the CM request with correlation id 0
    let written = device.written();
    assert_eq!(&written[21..27], b"STRCM\x00");
    assert_eq!(written.len(), 42);

    assert!(matches!(
        communicator.do_command(api::basic_action(), &light_on(2)),
        Err(Error::InMaintenanceMode)
    ));
    assert!(matches!(
        communicator.start_maintenance_mode(),
        Err(Error::InMaintenanceMode)
    ));

    device.inject(b"master> ");
    assert_eq!(
        communicator.get_maintenance_data(WAIT).unwrap(),
        Some(b"master> ".to_vec())
    );
    communicator.send_maintenance_data(b"help\r\n").unwrap();
    assert!(device.written().ends_with(b"help\r\n"));

    communicator.stop_maintenance_mode().unwrap();
    assert!(device.written().ends_with(b"exit\r\n"));
    assert_eq!(communicator.mode(), Mode::Normal);

    answer_ba(&device, b"", b"");
    assert!(
        communicator
            .do_command(api::basic_action(), &light_on(3))
            .is_ok()
    );
}

#[test]
fn test_maintenance_calls_outside_maintenance() {
    let (communicator, _device) = setup();
    assert!(matches!(
        communicator.get_maintenance_data(Duration::ZERO),
        Err(Error::NotInMaintenanceMode)
    ));
    assert!(matches!(
        communicator.send_maintenance_data(b"x"),
        Err(Error::NotInMaintenanceMode)
    ));
    assert!(matches!(
        communicator.stop_maintenance_mode(),
        Err(Error::NotInMaintenanceMode)
    ));
}

#[test]
fn test_consumers_all_run_in_order() {
    let (communicator, device) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&seen);
    communicator.register_consumer(BackgroundConsumer::from_fn(
        api::output_list(),
        0,
        move |_| {
            first.lock().push("first");
            Err("first consumer fails".into())
        },
    ));
    let (tx, rx) = unbounded();
    let second = Arc::clone(&seen);
    communicator.register_consumer(BackgroundConsumer::from_fn(
        api::output_list(),
        0,
        move |fields| {
            second.lock().push("second");
            tx.send(fields.clone())?;
            Ok(())
        },
    ));

    let event = api::output_list()
        .create_output(0, &Fields::new().with("outputs", vec![(5u8, 60u8)]))
        .unwrap();
    device.inject(&event);

    let fields = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(fields.get_outputs("outputs"), Some(&[(5u8, 60u8)][..]));
    assert_eq!(*seen.lock(), ["first", "second"]);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_panicking_consumer_does_not_stop_the_reader() {
    let (communicator, device) = setup();
    communicator.register_consumer(BackgroundConsumer::from_fn(
        api::output_list(),
        0,
        |_| panic!("consumer bug"),
    ));
    let (tx, rx) = crossbeam_channel::bounded(4);
    communicator.register_consumer(BackgroundConsumer::new(
        api::output_list(),
        0,
        ChannelHandler::new(tx),
    ));

    let event = api::output_list()
        .create_output(0, &Fields::new().with("outputs", Vec::<(u8, u8)>::new()))
        .unwrap();
    device.inject(&event);
    device.inject(&event);

    assert!(rx.recv_timeout(WAIT).is_ok());
    assert!(rx.recv_timeout(WAIT).is_ok());
}

#[test]
fn test_consumer_passthrough_flag_forwards_frame() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    let (tx, rx) = crossbeam_channel::bounded(4);
    communicator.register_consumer(
        BackgroundConsumer::new(api::output_list(), 0, ChannelHandler::new(tx))
            .with_passthrough(true),
    );

    let event = api::output_list()
        .create_output(0, &Fields::new().with("outputs", vec![(1u8, 100u8)]))
        .unwrap();
    let mut stream = b"hello".to_vec();
    stream.extend_from_slice(&event);
    stream.extend_from_slice(b" world");
    device.inject(&stream);

    assert!(rx.recv_timeout(WAIT).is_ok());
    assert_eq!(communicator.get_passthrough_data(WAIT).unwrap(), Some(stream));
}

#[test]
fn test_passthrough_only_mode() {
    let (communicator, device) = setup();
    communicator.start_passthrough_only().unwrap();
    assert_eq!(communicator.mode(), Mode::PassthroughOnly);
    assert!(communicator.passthrough_enabled());

    assert!(matches!(
        communicator.do_command(api::basic_action(), &light_on(1)),
        Err(Error::InPassthroughMode)
    ));
    assert!(matches!(
        communicator.start_maintenance_mode(),
        Err(Error::InPassthroughMode)
    ));

    // Frames are not parsed in this mode
    let frame = ba_reply(1, "OK");
    device.inject(&frame);
    assert_eq!(communicator.get_passthrough_data(WAIT).unwrap(), Some(frame));

    communicator.stop_passthrough_only().unwrap();
    answer_ba(&device, b"", b"");
    assert!(
        communicator
            .do_command(api::basic_action(), &light_on(1))
            .is_ok()
    );
}

#[test]
fn test_transport_error_fails_pending_and_recovers() {
    let (communicator, device) = setup();
    let communicator = Arc::new(communicator);

    let outstanding = {
        let communicator = Arc::clone(&communicator);
        thread::spawn(move || {
            let started = Instant::now();
            let result = communicator.do_command_with_timeout(
                api::basic_action(),
                &light_on(1),
                Duration::from_secs(5),
            );
            (result, started.elapsed())
        })
    };
    assert!(device.wait_for_written(21, WAIT));
    device.fail_next_reads(2);

    let (result, elapsed) = outstanding.join().unwrap();
    assert!(matches!(
        result,
        Err(Error::CommunicationTimedOut { command: "BA", .. })
    ));
    assert!(elapsed < Duration::from_secs(5));

    answer_ba(&device, b"", b"");
    assert!(
        communicator
            .do_command(api::basic_action(), &light_on(2))
            .is_ok()
    );
}

#[test]
fn test_byte_accounting() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    answer_ba(&device, b"", b"");

    communicator
        .do_command(api::basic_action(), &light_on(1))
        .unwrap();
    device.inject(b"hello");
    assert!(communicator.get_passthrough_data(WAIT).unwrap().is_some());

    let stats = communicator.get_communication_statistics();
    assert_eq!(stats.bytes_written, 21);
    assert_eq!(stats.bytes_read, 23);
    assert_eq!(stats.calls_succeeded.len(), 1);
    assert!(stats.calls_timedout.is_empty());
}

#[test]
fn test_health_signal() {
    let (communicator, device) = setup_with(config().with_offline_threshold(2));
    assert!(communicator.is_online());
    assert!(communicator.seconds_since_last_success().abs() < f64::EPSILON);

    for number in 0..2 {
        assert!(
            communicator
                .do_command_with_timeout(
                    api::basic_action(),
                    &light_on(number),
                    Duration::from_millis(50),
                )
                .is_err()
        );
    }
    assert!(!communicator.is_online());
    let stats = communicator.get_communication_statistics();
    assert_eq!(stats.consecutive_failures, 2);
    assert!(!stats.online);

    answer_ba(&device, b"", b"");
    communicator
        .do_command(api::basic_action(), &light_on(3))
        .unwrap();
    assert!(communicator.is_online());
    assert!(communicator.seconds_since_last_success() < 1.0);
}

#[test]
fn test_encoding_error_leaves_slot_free() {
    let (communicator, device) = setup();
    let err = communicator
        .do_command(api::basic_action(), &Fields::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
    assert!(device.written().is_empty());

    answer_ba(&device, b"", b"");
    assert!(
        communicator
            .do_command(api::basic_action(), &light_on(1))
            .is_ok()
    );
}

#[test]
fn test_lifecycle() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (port, _device) = SimulatedPort::pair("sim0");
    let communicator =
        MasterCommunicator::new(Transport::new(Box::new(port)).unwrap(), config());

    assert!(matches!(
        communicator.do_command(api::basic_action(), &light_on(1)),
        Err(Error::NotRunning)
    ));

    communicator.start().unwrap();
    communicator.start().unwrap();
    assert!(communicator.is_running());

    communicator.stop();
    communicator.stop();
    assert!(!communicator.is_running());
    assert!(matches!(
        communicator.do_command(api::basic_action(), &light_on(1)),
        Err(Error::NotRunning)
    ));
}

#[test]
fn test_init_master_sequence() {
    let (communicator, device) = setup_with(config().with_init_master(true));
    assert!(communicator.is_running());

    let mut expected = vec![b' '; 18];
    expected.extend_from_slice(b"\r\nexit\r\n");
    expected.extend_from_slice(&[b' '; 10]);
    assert_eq!(device.written(), expected);
}

#[test]
fn test_debug_buffer_records_traffic() {
    let (communicator, device) = setup();
    answer_ba(&device, b"", b"");
    communicator
        .do_command(api::basic_action(), &light_on(1))
        .unwrap();

    let entries = communicator.debug_buffer();
    let request = format!("    STRBA{}", ".".repeat(16));
    assert!(entries.iter().any(|e| e.direction == Direction::Write && e.data.ends_with(&request)));
    assert!(entries.iter().any(|e| e.direction == Direction::Read));
}

#[test]
fn test_unbounded_timeouts_wait_without_deadline() {
    let (communicator, device) = setup();
    answer_ba(&device, b"", b"");

    let reply = communicator
        .do_command_with_timeout(api::basic_action(), &light_on(1), Duration::MAX)
        .unwrap();
    assert_eq!(reply.get_str("resp").as_deref(), Some("OK"));

    communicator.enable_passthrough();
    device.inject(b"later");
    assert_eq!(
        communicator.get_passthrough_data(Duration::MAX).unwrap(),
        Some(b"later".to_vec())
    );
}

#[test]
fn test_passthrough_only_lets_outstanding_reply_arrive() {
    let (communicator, device) =
        setup_with(config().with_maintenance_drain(Duration::from_millis(500)));
    let communicator = Arc::new(communicator);

    let outstanding = {
        let communicator = Arc::clone(&communicator);
        thread::spawn(move || {
            communicator.do_command_with_timeout(
                api::basic_action(),
                &light_on(1),
                Duration::from_secs(5),
            )
        })
    };
    assert!(device.wait_for_written(21, WAIT));

    let replying = {
        let device = device.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            device.inject(&ba_reply(1, "OK"));
        })
    };
    communicator.start_passthrough_only().unwrap();
    replying.join().unwrap();

    let reply = outstanding.join().unwrap().unwrap();
    assert_eq!(reply.get_str("resp").as_deref(), Some("OK"));
    assert_eq!(
        communicator
            .get_passthrough_data(Duration::from_millis(100))
            .unwrap(),
        None
    );

    device.inject(b"device data");
    assert_eq!(
        communicator.get_passthrough_data(WAIT).unwrap(),
        Some(b"device data".to_vec())
    );
}

#[test]
fn test_corrupt_event_is_discarded() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    let (tx, rx) = crossbeam_channel::bounded(4);
    communicator.register_consumer(BackgroundConsumer::new(
        api::sensor_humidity_list(),
        0,
        ChannelHandler::new(tx),
    ));

    let mut stream = humidity_reply(0, false);
    stream.extend(humidity_reply(0, true));
    device.inject(&stream);

    let fields = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(fields.get_svt("hum31"), Some(Svt::from_raw(31)));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(
        communicator
            .get_passthrough_data(Duration::from_millis(100))
            .unwrap(),
        None
    );
}

#[test]
fn test_checksum_failures_take_master_offline() {
    let (communicator, device) = setup_with(config().with_offline_threshold(2));
    device.on_request(|request| {
        request
            .starts_with(b"STRhh")
            .then(|| humidity_reply(request[5], false))
    });

    for _ in 0..2 {
        let err = communicator
            .do_command(api::sensor_humidity_list(), &Fields::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Checksum);
    }
    assert!(!communicator.is_online());
    let stats = communicator.get_communication_statistics();
    assert_eq!(stats.consecutive_failures, 2);
    assert!(stats.calls_timedout.is_empty());
}

#[test]
fn test_stalled_frame_prefix_reaches_passthrough() {
    let (communicator, device) = setup();
    communicator.enable_passthrough();
    let (tx, _rx) = crossbeam_channel::bounded(4);
    communicator.register_consumer(BackgroundConsumer::new(
        api::output_list(),
        0,
        ChannelHandler::new(tx),
    ));

    // "O" could start an OL event; it must not be held back forever
    device.inject(b"hello O");
    let mut received = Vec::new();
    while received.len() < 7 {
        let Some(chunk) = communicator.get_passthrough_data(WAIT).unwrap() else {
            break;
        };
        received.extend(chunk);
    }
    assert_eq!(received, b"hello O");
}
