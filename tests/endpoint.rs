mod common;

use braille_gio::{
    ApplicationData, ControlRequest, Descriptor, GioError, Methods, Options, Recipient,
    Registry, ResourceType, SerialParameters,
};
use common::{mock_endpoint, MockBackend, MockResource, Step};
use proptest::prelude::*;
use std::time::{Duration, Instant};

#[test]
fn connect_uses_backend_options() {
    let mut backend = MockBackend::new(Methods::STREAM);
    backend.options = Options::default().with_input_timeout(Duration::from_millis(250));
    let (registry, _state) = backend.registry();

    let endpoint = registry.connect("mock:display", None).unwrap();
    assert_eq!(endpoint.resource_type(), ResourceType::Other("mock"));
    assert_eq!(endpoint.options().input_timeout, Duration::from_millis(250));
    assert_eq!(endpoint.bytes_per_second(), 0);
    assert_eq!(endpoint.pending_input(), 0);
}

#[test]
fn unknown_identifier_is_rejected() {
    let (registry, _state) = MockBackend::new(Methods::STREAM).registry();
    assert!(matches!(
        registry.connect("usb:", None),
        Err(GioError::UnsupportedIdentifier(id)) if id == "usb:"
    ));
}

#[test]
fn descriptor_requires_explicit_support() {
    let descriptor = Descriptor::default();

    let (registry, _state) = MockBackend::new(Methods::STREAM).registry();
    assert!(registry.connect("mock:", Some(&descriptor)).is_err());

    let mut backend = MockBackend::new(Methods::STREAM);
    backend.supported = Some(true);
    let (registry, _state) = backend.registry();
    assert!(registry.connect("mock:", Some(&descriptor)).is_ok());
}

#[test]
fn failed_prepare_disconnects_and_keeps_its_error() {
    let mut backend = MockBackend::new(Methods::STREAM);
    backend.fail_prepare = true;
    let (registry, state) = backend.registry();
    state.lock().fail_disconnect = true;

    let err = registry.connect("mock:", None).err().unwrap();
    assert!(matches!(err, GioError::NotFound(ref what) if what == "prepare"), "{err}");
    assert_eq!(state.lock().disconnects, 1);
}

#[test]
fn ready_delay_blocks_connect() {
    let mut backend = MockBackend::new(Methods::STREAM);
    backend.options = Options::default().with_ready_delay(Duration::from_millis(30));
    let (registry, _state) = backend.registry();

    let start = Instant::now();
    let _endpoint = registry.connect("mock:", None).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn stale_input_is_discarded_on_connect() {
    let (registry, state) = MockBackend::new(Methods::STREAM).registry();
    state.push_data(b"garbage");

    let mut endpoint = registry.connect("mock:", None).unwrap();
    assert!(state.lock().steps.is_empty());
    assert_eq!(endpoint.read_byte(false).unwrap(), None);
}

#[test]
fn connect_fails_when_stale_input_errors() {
    let (registry, state) = MockBackend::new(Methods::STREAM).registry();
    state.push(Step::Fail);
    assert!(matches!(registry.connect("mock:", None), Err(GioError::Io(_))));
    assert_eq!(state.lock().disconnects, 1);
}

#[test]
fn write_only_backends_skip_the_discard() {
    let (registry, state) = MockBackend::new(Methods::WRITE_DATA | Methods::DISCONNECT).registry();
    state.push_data(b"x");
    let _endpoint = registry.connect("mock:", None).unwrap();
    assert_eq!(state.lock().steps.len(), 1);
}

#[test]
fn unsupported_operations_leave_state_alone() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    let request = ControlRequest::vendor(Recipient::Device, 1, 2, 3);

    assert!(endpoint.hid_report_size(1).unwrap_err().is_unsupported());
    assert!(endpoint.write_hid_report(&[1, 2]).unwrap_err().is_unsupported());
    assert!(endpoint.tell_resource(&request, b"x").unwrap_err().is_unsupported());
    assert!(endpoint.ask_resource(&request, &mut [0; 2]).unwrap_err().is_unsupported());
    assert!(endpoint.reconfigure(&SerialParameters::default()).unwrap_err().is_unsupported());
    assert!(endpoint.monitor_input(None).unwrap_err().is_unsupported());
    assert!(endpoint.resource_name().unwrap_err().is_unsupported());
    assert!(endpoint.resource_identifier().unwrap_err().is_unsupported());

    let state = state.lock();
    assert_eq!(state.hid_item_fetches, 0);
    assert!(state.reports.is_empty());
    assert!(state.requests.is_empty());
    assert!(state.reconfigured.is_none());
    assert_eq!(endpoint.bytes_per_second(), 0);
}

#[test]
fn disconnect_reports_backend_result() {
    let (endpoint, state) = mock_endpoint(Methods::STREAM);
    endpoint.disconnect().unwrap();
    assert_eq!(state.lock().disconnects, 1);

    let (endpoint, state) = mock_endpoint(Methods::STREAM);
    state.lock().fail_disconnect = true;
    assert!(endpoint.disconnect().is_err());
    assert_eq!(state.lock().disconnects, 1);
}

#[test]
fn dropping_an_endpoint_disconnects_once() {
    let (endpoint, state) = mock_endpoint(Methods::STREAM);
    drop(endpoint);
    assert_eq!(state.lock().disconnects, 1);

    let (endpoint, state) = mock_endpoint(Methods::STREAM);
    endpoint.disconnect().unwrap();
    assert_eq!(state.lock().disconnects, 1);
}

#[test]
fn write_timeouts_fail_unless_ignored() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    state.lock().write_times_out = true;
    assert!(endpoint.write(b"abc").unwrap_err().is_timeout());

    let mut backend = MockBackend::new(Methods::STREAM);
    backend.options.ignore_write_timeouts = true;
    let (registry, state) = backend.registry();
    let mut endpoint = registry.connect("mock:", None).unwrap();
    state.lock().write_times_out = true;
    assert_eq!(endpoint.write(b"abc").unwrap(), 3);
}

#[test]
fn writes_reach_the_backend() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    assert_eq!(endpoint.write(b"\x1bI").unwrap(), 2);
    assert_eq!(state.lock().written, b"\x1bI");
}

#[test]
fn reconfigure_updates_rate() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM | Methods::RECONFIGURE);
    let parameters = SerialParameters::default().with_baud(19200);

    endpoint.reconfigure(&parameters).unwrap();
    assert_eq!(state.lock().reconfigured.as_ref(), Some(&parameters));
    assert_eq!(endpoint.bytes_per_second(), 1920);
    assert_eq!(endpoint.milliseconds_to_transfer(192), 101);
}

#[test]
fn await_input_answers_from_cache() {
    let (mut endpoint, state) = mock_endpoint(Methods::STREAM);
    assert!(!endpoint.await_input(Duration::ZERO).unwrap());

    state.push_data(&[1, 2]);
    assert_eq!(endpoint.read_byte(false).unwrap(), Some(1));
    assert!(endpoint.await_input(Duration::ZERO).unwrap());
    assert_eq!(endpoint.read_byte(false).unwrap(), Some(2));
    assert!(!endpoint.await_input(Duration::ZERO).unwrap());
}

#[test]
fn control_transfers_and_names() {
    let methods = Methods::STREAM
        | Methods::TELL_RESOURCE
        | Methods::RESOURCE_NAME
        | Methods::RESOURCE_IDENTIFIER;
    let (mut endpoint, state) = mock_endpoint(methods);
    let request = ControlRequest::vendor(Recipient::Interface, 0x0A, 0x0102, 0);

    assert_eq!(endpoint.tell_resource(&request, &[9, 9]).unwrap(), 2);
    assert_eq!(state.lock().requests, vec![request]);
    assert_eq!(endpoint.resource_name().unwrap(), "Mock Display");
    assert_eq!(endpoint.resource_identifier().unwrap(), "mock:0");
}

#[test]
fn application_data_comes_from_options() {
    let mut backend = MockBackend::new(Methods::STREAM);
    backend.options = Options::default().with_application_data(ApplicationData::new(7u8));
    let (registry, _state) = backend.registry();
    let endpoint = registry.connect("mock:", None).unwrap();
    assert_eq!(endpoint.application_data().and_then(|d| d.downcast_ref::<u8>()), Some(&7));
}

#[test]
fn resource_object_is_the_backend_resource() {
    let (endpoint, _state) = mock_endpoint(Methods::STREAM);
    assert!(endpoint.resource_object().unwrap_err().is_unsupported());

    let (endpoint, _state) = mock_endpoint(Methods::STREAM | Methods::RESOURCE_OBJECT);
    let object = endpoint.resource_object().unwrap();
    assert!(object.downcast_ref::<MockResource>().is_some());
}

/// Two backends share qualifier `a`; they are told apart by name.
fn selection_registry(supported: Option<bool>) -> Registry {
    let mut registry = Registry::new();
    for (name, qualifier) in [("a1", "a"), ("b", "b"), ("a2", "a"), ("c", "c")] {
        let mut backend = MockBackend::new(Methods::STREAM);
        backend.name = name;
        backend.qualifier = qualifier;
        backend.supported = supported;
        registry.push(backend);
    }
    registry
}

#[test]
fn earlier_backend_wins_a_shared_qualifier() {
    let descriptor = Descriptor::default();
    for (supported, descriptor) in [(None, None), (Some(true), Some(&descriptor))] {
        let registry = selection_registry(supported);
        let (backend, rest) = registry.select("a:x", descriptor).unwrap();
        assert_eq!(backend.resource_type(), ResourceType::Other("a1"));
        assert_eq!(rest, "x");

        let endpoint = registry.connect("a:x", descriptor).unwrap();
        assert_eq!(endpoint.resource_type(), ResourceType::Other("a1"));
    }
}

#[test]
fn unsupported_earlier_backend_yields_to_the_next() {
    let descriptor = Descriptor::default();
    let mut registry = Registry::new();
    for (name, supported) in [("a1", Some(false)), ("a2", Some(true)), ("a3", Some(true))] {
        let mut backend = MockBackend::new(Methods::STREAM);
        backend.name = name;
        backend.qualifier = "a";
        backend.supported = supported;
        registry.push(backend);
    }

    let (backend, _) = registry.select("a:", Some(&descriptor)).unwrap();
    assert_eq!(backend.resource_type(), ResourceType::Other("a2"));
    let (backend, _) = registry.select("a:", None).unwrap();
    assert_eq!(backend.resource_type(), ResourceType::Other("a1"));
}

proptest! {
    #[test]
    fn selection_is_deterministic(qualifier in "[abcd]", rest in "[a-z0-9/]{0,8}") {
        let registry = selection_registry(None);
        let identifier = format!("{qualifier}:{rest}");

        let first = registry.select(&identifier, None).map(|(b, r)| (b.resource_type(), r.to_owned()));
        let second = registry.select(&identifier, None).map(|(b, r)| (b.resource_type(), r.to_owned()));

        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(&a, &b);
                let expected = match qualifier.as_str() {
                    "a" => "a1",
                    "b" => "b",
                    _ => "c",
                };
                prop_assert_eq!(a.0, ResourceType::Other(expected));
                prop_assert_eq!(a.1, rest);
            }
            (Err(_), Err(_)) => prop_assert_eq!(qualifier.as_str(), "d"),
            _ => prop_assert!(false, "selection changed between calls"),
        }
    }
}
