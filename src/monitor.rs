//! Input-ready notification for an endpoint.
//!
//! When the backend can signal input itself ([`Methods::MONITOR_INPUT`]) its native callback
//! is used. Otherwise an alarm on the application's [`Scheduler`] polls
//! [`Endpoint::await_input`] at a fixed interval. Either way the handler sees the same
//! [`InputEvent`] and returns whether monitoring should continue.
//!
//! [`Methods::MONITOR_INPUT`]: crate::resource::Methods::MONITOR_INPUT

use crate::endpoint::Endpoint;
use crate::error::{GioError, Result};
use crate::options::ApplicationData;
use crate::resource::MonitorCallback;
use crate::scheduler::{AlarmFired, AlarmId, Scheduler};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// What an input handler is told.
#[derive(Debug)]
pub struct InputEvent<'a> {
    pub application_data: Option<&'a ApplicationData>,
    /// Set when waiting for input failed.
    pub error: Option<&'a GioError>,
}

/// Returns `true` to keep monitoring.
pub type InputHandler = Box<dyn FnMut(&InputEvent<'_>) -> bool + Send>;

type SharedHandler = Arc<Mutex<InputHandler>>;

fn call(handler: &SharedHandler, event: &InputEvent<'_>) -> bool {
    let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
    (*handler)(event)
}

enum Strategy {
    Native,
    Polling { alarm: AlarmId },
}

/// Keeps input monitoring alive for as long as it exists.
pub struct InputMonitor {
    endpoint: Weak<RefCell<Endpoint>>,
    scheduler: Rc<dyn Scheduler>,
    strategy: Strategy,
}

impl InputMonitor {
    /// Start monitoring. Uses the backend's native monitor if it has one, otherwise polls
    /// every `poll_interval`.
    pub fn new(
        endpoint: &Rc<RefCell<Endpoint>>,
        scheduler: Rc<dyn Scheduler>,
        poll_interval: Duration,
        handler: InputHandler,
    ) -> Result<Self> {
        let handler: SharedHandler = Arc::new(Mutex::new(handler));

        let native = {
            let mut ep = endpoint.borrow_mut();
            let application_data = ep.application_data().cloned();
            let shared = Arc::clone(&handler);
            let callback: MonitorCallback = Box::new(move |error: Option<&GioError>| {
                call(
                    &shared,
                    &InputEvent {
                        application_data: application_data.as_ref(),
                        error,
                    },
                )
            });
            ep.monitor_input(Some(callback))
        };

        let strategy = match native {
            Ok(()) => {
                debug!("native input monitor installed");
                Strategy::Native
            }
            Err(e) if e.is_unsupported() => Strategy::Polling {
                alarm: Self::start_polling(endpoint, scheduler.as_ref(), poll_interval, handler),
            },
            Err(e) => return Err(e),
        };

        Ok(Self {
            endpoint: Rc::downgrade(endpoint),
            scheduler,
            strategy,
        })
    }

    fn start_polling(
        endpoint: &Rc<RefCell<Endpoint>>,
        scheduler: &dyn Scheduler,
        poll_interval: Duration,
        handler: SharedHandler,
    ) -> AlarmId {
        let weak = Rc::downgrade(endpoint);
        let alarm = scheduler.new_relative_alarm(
            poll_interval,
            Box::new(move |fired: &AlarmFired<'_>| {
                let Some(endpoint) = weak.upgrade() else {
                    fired.scheduler.cancel_request(fired.id);
                    return;
                };
                // the endpoint is busy elsewhere; try again next tick
                let Ok(mut borrowed) = endpoint.try_borrow_mut() else {
                    return;
                };
                let (ready, error) = match borrowed.await_input(Duration::ZERO) {
                    Ok(ready) => (ready, None),
                    Err(e) => (true, Some(e)),
                };
                let application_data = borrowed.application_data().cloned();
                // the handler usually reads from the endpoint
                drop(borrowed);

                if !ready {
                    fired.scheduler.reset_alarm_interval(fired.id, poll_interval);
                    return;
                }

                trace!(error = error.is_some(), "input ready");
                let event = InputEvent {
                    application_data: application_data.as_ref(),
                    error: error.as_ref(),
                };
                if call(&handler, &event) {
                    // more input is likely; look again right away
                    fired.scheduler.reset_alarm_interval(fired.id, Duration::ZERO);
                } else {
                    fired.scheduler.cancel_request(fired.id);
                }
            }),
        );
        scheduler.reset_alarm_interval(alarm, poll_interval);
        debug!(?poll_interval, "polling for input");
        alarm
    }

    pub fn is_native(&self) -> bool {
        matches!(self.strategy, Strategy::Native)
    }
}

impl Drop for InputMonitor {
    fn drop(&mut self) {
        match self.strategy {
            Strategy::Polling { alarm } => self.scheduler.cancel_request(alarm),
            Strategy::Native => {
                if let Some(endpoint) = self.endpoint.upgrade() {
                    if let Ok(mut endpoint) = endpoint.try_borrow_mut() {
                        if let Err(e) = endpoint.monitor_input(None) {
                            debug!(error = %e, "input monitor removal failed");
                        }
                    }
                }
            }
        }
    }
}
