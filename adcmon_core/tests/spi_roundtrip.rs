//! Register interface behavior over the mock device.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use adcmon_core::mocks::MockAdc;
use adcmon_core::spi::{Core, GAIN_RANGE, OFFSET_RANGE, RegisterIo};
use adcmon_core::{AdcError, Capturer};
use adcmon_traits::Zdok;
use adcmon_traits::clock::testing::TestClock;
use rstest::rstest;

fn regio(dev: Arc<Mutex<MockAdc>>) -> RegisterIo<MockAdc> {
    RegisterIo::new(dev, Arc::new(TestClock::new()), Duration::from_micros(1_000))
}

#[rstest]
#[case(0.0)]
#[case(42.5)]
#[case(-42.5)]
#[case(99.9)]
#[case(-99.9)]
fn offset_survives_write_then_read_within_one_code_step(#[case] value: f32) {
    let dev = Arc::new(Mutex::new(MockAdc::default()));
    let io = regio(Arc::clone(&dev));

    io.set_offset(Zdok::Zero, Core::B, value).unwrap();
    let read = io.offset(Zdok::Zero, Core::B).unwrap();

    let step = OFFSET_RANGE / 255.0;
    assert!(
        (read - value).abs() <= step / 2.0 + 1e-5,
        "wrote {value}, read {read}"
    );
}

#[test]
fn writes_land_on_the_requested_zdok_only() {
    let dev = Arc::new(Mutex::new(MockAdc::default()));
    let io = regio(Arc::clone(&dev));

    io.set_gain(Zdok::One, Core::A, 10.0).unwrap();

    let step = GAIN_RANGE / 255.0;
    let one = io.gain(Zdok::One, Core::A).unwrap();
    let zero = io.gain(Zdok::Zero, Core::A).unwrap();
    assert!((one - 10.0).abs() <= step / 2.0 + 1e-5);
    assert_eq!(zero, 0.0);
}

#[test]
fn mismatched_echo_is_a_register_mismatch() {
    let mut mock = MockAdc::default();
    mock.mismatch_echo = true;
    let io = regio(Arc::new(Mutex::new(mock)));

    let err = io.offset(Zdok::Zero, Core::A).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AdcError>(),
        Some(AdcError::RegisterMismatch)
    ));
}

#[test]
fn register_writes_strobe_the_apply_register() {
    let dev = Arc::new(Mutex::new(MockAdc::default()));
    let io = regio(Arc::clone(&dev));

    io.set_phase(Zdok::Zero, Core::D, 5.0).unwrap();

    let guard = dev.lock().unwrap();
    // cal-ctrl (0x10) carries the phase strobe, chansel (0x0f) core D.
    assert_eq!(guard.register(Zdok::Zero, 0x10), 2 << 6);
    assert_eq!(guard.register(Zdok::Zero, 0x0f), 4);
}

#[test]
fn ogp_bank_roundtrip_applies_every_core() {
    let dev = Arc::new(Mutex::new(MockAdc::default()));
    let io = regio(Arc::clone(&dev));

    let bank = [
        [10.0, -3.0, 1.0],
        [-10.0, 3.0, -1.0],
        [25.0, 0.0, 7.0],
        [-25.0, 12.0, -7.0],
    ];
    io.write_ogp(Zdok::Zero, &bank).unwrap();
    let read = io.read_ogp(Zdok::Zero).unwrap();

    for core in 0..4 {
        for (field, range) in [(0, OFFSET_RANGE), (1, GAIN_RANGE), (2, 28.0)] {
            let step = range / 255.0;
            assert!(
                (read[core][field] - bank[core][field]).abs() <= step / 2.0 + 1e-5,
                "core {core} field {field}"
            );
        }
    }
}

#[test]
fn register_io_and_capturer_share_one_lock() {
    // Both paths must construct over the same Arc so the capture lock also
    // serializes SPI traffic.
    let dev = Arc::new(Mutex::new(MockAdc::with_snapshot(vec![1, 2, 3, 4])));
    let clock: Arc<TestClock> = Arc::new(TestClock::new());
    let cap = Capturer::new(
        Arc::clone(&dev),
        clock.clone(),
        100,
        Duration::from_micros(100),
    );
    let io = RegisterIo::new(cap.device(), clock, Duration::from_micros(1_000));

    io.set_offset(Zdok::Zero, Core::A, 1.0).unwrap();
    let snap = cap.capture(Zdok::Zero).unwrap();
    assert_eq!(snap.len(), 4);
}
