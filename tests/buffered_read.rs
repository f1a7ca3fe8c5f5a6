mod common;

use braille_gio::{GioError, Methods, Options};
use common::{mock_endpoint, MockBackend, Step};
use proptest::prelude::*;
use std::time::Duration;

#[test]
fn error_after_partial_read_is_reported_next() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    state.push_data(&[1, 2, 3]);
    state.push(Step::Fail);

    let mut buffer = [0u8; 8];
    assert_eq!(endpoint.read(&mut buffer, true).unwrap(), 3);
    assert_eq!(&buffer[..3], &[1, 2, 3]);

    assert!(matches!(endpoint.read(&mut buffer, true), Err(GioError::Io(_))));
    assert_eq!(endpoint.read(&mut buffer, true).unwrap(), 0);
}

#[test]
fn error_with_nothing_read_is_returned_at_once() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    state.push(Step::Fail);
    state.push_data(&[9]);

    assert!(endpoint.read_byte(false).is_err());
    assert_eq!(endpoint.read_byte(false).unwrap(), Some(9));
}

#[test]
fn would_block_ends_the_read_quietly() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    state.push_data(&[4]);
    state.push(Step::WouldBlock);
    state.push_data(&[5]);

    let mut buffer = [0u8; 4];
    assert_eq!(endpoint.read(&mut buffer, false).unwrap(), 1);
    assert_eq!(endpoint.read(&mut buffer, false).unwrap(), 1);
    assert_eq!(buffer[0], 5);
}

#[test]
fn only_the_first_fill_may_skip_waiting() {
    let mut backend = MockBackend::new(Methods::STREAM);
    backend.options = Options::default().with_input_timeout(Duration::from_millis(40));
    let (registry, state) = backend.registry();
    let mut endpoint = registry.connect("mock:", None).unwrap();
    state.lock().read_timeouts.clear();

    state.push_data(&[1]);
    state.push_data(&[2]);
    let mut buffer = [0u8; 2];
    assert_eq!(endpoint.read(&mut buffer, false).unwrap(), 2);
    assert_eq!(
        state.lock().read_timeouts,
        vec![Duration::ZERO, Duration::from_millis(40)]
    );

    state.lock().read_timeouts.clear();
    state.push_data(&[3]);
    assert_eq!(endpoint.read_byte(true).unwrap(), Some(3));
    assert_eq!(state.lock().read_timeouts, vec![Duration::from_millis(40)]);
}

#[test]
fn surplus_input_is_served_from_cache() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    state.push_data(b"abcdef");

    assert_eq!(endpoint.read_byte(false).unwrap(), Some(b'a'));
    assert_eq!(endpoint.pending_input(), 5);
    assert!(state.lock().steps.is_empty());

    let mut rest = [0u8; 5];
    assert_eq!(endpoint.read(&mut rest, false).unwrap(), 5);
    assert_eq!(&rest, b"bcdef");
}

#[test]
fn discard_input_empties_cache_and_transport() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    state.push_data(&[1, 2, 3]);
    state.push_data(&[4; 100]);
    endpoint.read_byte(false).unwrap();

    endpoint.discard_input().unwrap();
    assert_eq!(endpoint.pending_input(), 0);
    assert!(state.lock().steps.is_empty());
}

#[test]
fn reading_requires_the_read_method() {
    let (mut endpoint, _state) = mock_endpoint(Methods::WRITE_DATA | Methods::DISCONNECT);
    assert!(endpoint.read_byte(false).unwrap_err().is_unsupported());
}

fn steps() -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        4 => prop::collection::vec(any::<u8>(), 1..100).prop_map(Step::Data),
        1 => Just(Step::Nothing),
        1 => Just(Step::WouldBlock),
        1 => Just(Step::Fail),
    ];
    prop::collection::vec(step, 0..20)
}

proptest! {
    #[test]
    fn reads_deliver_every_byte_in_order(
        script in steps(),
        sizes in prop::collection::vec(1usize..80, 1..10),
        wait in any::<bool>(),
    ) {
        let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
        let expected: Vec<u8> = script
            .iter()
            .filter_map(|step| match step {
                Step::Data(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect();
        let limit = 4 * (script.len() + expected.len()) + 10;
        state.lock().steps.extend(script);

        let mut received = Vec::new();
        for size in sizes.iter().cycle().take(limit) {
            if received.len() == expected.len() && state.lock().steps.is_empty() {
                break;
            }
            let mut buffer = vec![0u8; *size];
            if let Ok(count) = endpoint.read(&mut buffer, wait) {
                prop_assert!(count <= *size);
                received.extend_from_slice(&buffer[..count]);
            }
        }

        prop_assert_eq!(received, expected);
    }
}
