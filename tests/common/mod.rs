#![allow(dead_code)]

use braille_gio::config::{Descriptor, SerialParameters};
use braille_gio::{
    Backend, ControlRequest, Endpoint, GioError, Methods, MonitorCallback, Options, Registry,
    Resource, ResourceType, Result,
};
use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const QUALIFIER: &str = "mock";

/// What the next backend read produces.
#[derive(Clone, Debug)]
pub enum Step {
    Data(Vec<u8>),
    Nothing,
    WouldBlock,
    Fail,
}

#[derive(Default)]
pub struct MockState {
    pub steps: VecDeque<Step>,
    pub read_timeouts: Vec<Duration>,
    pub written: Vec<u8>,
    pub write_times_out: bool,
    pub hid_items: Vec<u8>,
    pub hid_items_fail: bool,
    pub hid_item_fetches: usize,
    pub reports: Vec<(u8, Vec<u8>)>,
    pub features: Vec<(u8, Vec<u8>)>,
    pub monitor: Option<MonitorCallback>,
    pub input_ready: bool,
    pub disconnects: usize,
    pub fail_disconnect: bool,
    pub reconfigured: Option<SerialParameters>,
    pub requests: Vec<ControlRequest>,
}

#[derive(Clone, Default)]
pub struct Shared(Arc<Mutex<MockState>>);

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    pub fn push(&self, step: Step) {
        self.lock().steps.push_back(step);
    }

    pub fn push_data(&self, data: &[u8]) {
        self.push(Step::Data(data.to_vec()));
    }
}

pub struct MockResource {
    state: Shared,
}

impl Resource for MockResource {
    fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.disconnects += 1;
        if state.fail_disconnect {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        Ok(())
    }

    fn reconfigure(&mut self, parameters: &SerialParameters) -> Result<()> {
        self.state.lock().reconfigured = Some(parameters.clone());
        Ok(())
    }

    fn read_data(&mut self, buffer: &mut [u8], initial: Duration, _subsequent: Duration) -> Result<usize> {
        let mut state = self.state.lock();
        state.read_timeouts.push(initial);
        match state.steps.pop_front() {
            Some(Step::Data(mut data)) => {
                let count = data.len().min(buffer.len());
                buffer[..count].copy_from_slice(&data[..count]);
                if count < data.len() {
                    state.steps.push_front(Step::Data(data.split_off(count)));
                }
                Ok(count)
            }
            Some(Step::WouldBlock) => Err(GioError::WouldBlock),
            Some(Step::Fail) => Err(io::Error::from(io::ErrorKind::ConnectionReset).into()),
            Some(Step::Nothing) | None => Ok(0),
        }
    }

    fn write_data(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.state.lock();
        if state.write_times_out {
            return Err(GioError::TimedOut);
        }
        state.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn await_input(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(self.state.lock().input_ready)
    }

    fn monitor_input(&mut self, callback: Option<MonitorCallback>) -> Result<()> {
        self.state.lock().monitor = callback;
        Ok(())
    }

    fn tell(&mut self, request: &ControlRequest, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.state.lock().requests.push(*request);
        Ok(data.len())
    }

    fn hid_items(&mut self, _timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.hid_item_fetches += 1;
        if state.hid_items_fail {
            return Err(GioError::TimedOut);
        }
        Ok(state.hid_items.clone())
    }

    fn set_hid_report(&mut self, identifier: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.state.lock().reports.push((identifier, data.to_vec()));
        Ok(data.len())
    }

    fn get_hid_report(&mut self, identifier: u8, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
        buffer.fill(identifier.wrapping_add(1));
        buffer[0] = identifier;
        Ok(buffer.len())
    }

    fn set_hid_feature(&mut self, identifier: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.state.lock().features.push((identifier, data.to_vec()));
        Ok(data.len())
    }

    fn get_hid_feature(&mut self, identifier: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.get_hid_report(identifier, buffer, timeout)
    }

    fn name(&mut self, _timeout: Duration) -> Result<String> {
        Ok("Mock Display".to_owned())
    }

    fn identifier(&self) -> Result<String> {
        Ok(format!("{QUALIFIER}:0"))
    }

    fn object(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

pub struct MockBackend {
    pub state: Shared,
    /// Reported as `ResourceType::Other(name)`.
    pub name: &'static str,
    pub qualifier: &'static str,
    pub methods: Methods,
    pub options: Options,
    pub supported: Option<bool>,
    pub fail_prepare: bool,
}

impl MockBackend {
    pub fn new(methods: Methods) -> Self {
        Self {
            state: Shared::default(),
            name: QUALIFIER,
            qualifier: QUALIFIER,
            methods,
            options: Options::default(),
            supported: None,
            fail_prepare: false,
        }
    }

    /// Registry holding just this backend, plus a handle on its state.
    pub fn registry(self) -> (Registry, Shared) {
        let state = self.state.clone();
        let mut registry = Registry::new();
        registry.push(self);
        (registry, state)
    }
}

impl Backend for MockBackend {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Other(self.name)
    }

    fn is_supported(&self, _descriptor: &Descriptor) -> Option<bool> {
        self.supported
    }

    fn test_identifier<'a>(&self, identifier: &'a str) -> Option<&'a str> {
        braille_gio::identifier::strip_qualifier(identifier, self.qualifier)
    }

    fn options(&self, _descriptor: Option<&Descriptor>) -> Option<Options> {
        Some(self.options.clone())
    }

    fn methods(&self) -> Methods {
        self.methods
    }

    fn connect(&self, _identifier: &str, _descriptor: Option<&Descriptor>) -> Result<Box<dyn Resource>> {
        Ok(Box::new(MockResource {
            state: self.state.clone(),
        }))
    }

    fn prepare_endpoint(&self, _endpoint: &mut Endpoint, _descriptor: Option<&Descriptor>) -> Result<()> {
        if self.fail_prepare {
            return Err(GioError::NotFound("prepare".to_owned()));
        }
        Ok(())
    }
}

/// Connect a mock endpoint implementing `methods` with default options.
pub fn mock_endpoint(methods: Methods) -> (Endpoint, Shared) {
    let (registry, state) = MockBackend::new(methods).registry();
    let endpoint = registry.connect("mock:", None).unwrap();
    (endpoint, state)
}
