//! Test doubles: pins, timer and UART recording into one shared trace

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::ble::{BleEvent, BleUart, ConnHandle};
use crate::pins::{OutputPin, Timer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trace {
    /// pin name, driven high, at ms
    Pin(&'static str, bool, u64),
    /// conn, line, at ms
    Notify(ConnHandle, String, u64),
    Disconnect(ConnHandle),
    Advertising(String),
}

#[derive(Default)]
struct BenchState {
    now: u64,
    trace: Vec<Trace>,
    events: VecDeque<BleEvent>,
    failing_low: HashSet<&'static str>,
    fail_notify: bool,
    panic_on_delay: bool,
}

/// Shared handle; clones observe the same clock and trace
#[derive(Clone, Default)]
pub struct Bench(Rc<RefCell<BenchState>>);

impl Bench {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&self, name: &'static str) -> FakePin {
        FakePin {
            name,
            bench: self.clone(),
            fail_high: false,
        }
    }

    pub fn pin_failing_high(&self, name: &'static str) -> FakePin {
        FakePin {
            name,
            bench: self.clone(),
            fail_high: true,
        }
    }

    pub fn timer(&self) -> FakeTimer {
        FakeTimer(self.clone())
    }

    pub fn uart(&self) -> FakeUart {
        FakeUart(self.clone())
    }

    pub fn now(&self) -> u64 {
        self.0.borrow().now
    }

    pub fn advance(&self, ms: u64) {
        self.0.borrow_mut().now += ms;
    }

    pub fn push(&self, event: BleEvent) {
        self.0.borrow_mut().events.push_back(event);
    }

    pub fn fail_low(&self, name: &'static str, fail: bool) {
        let mut state = self.0.borrow_mut();
        if fail {
            state.failing_low.insert(name);
        } else {
            state.failing_low.remove(name);
        }
    }

    pub fn fail_notify(&self, fail: bool) {
        self.0.borrow_mut().fail_notify = fail;
    }

    pub fn panic_on_delay(&self, panic: bool) {
        self.0.borrow_mut().panic_on_delay = panic;
    }

    pub fn clear_trace(&self) {
        self.0.borrow_mut().trace.clear();
    }

    pub fn trace(&self) -> Vec<Trace> {
        self.0.borrow().trace.clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.0
            .borrow()
            .trace
            .iter()
            .filter_map(|entry| match entry {
                Trace::Notify(_, line, _) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// (high, at) for every successful write to `name`
    pub fn pin_edges(&self, name: &str) -> Vec<(bool, u64)> {
        self.0
            .borrow()
            .trace
            .iter()
            .filter_map(|entry| match entry {
                Trace::Pin(pin, high, at) if *pin == name => Some((*high, *at)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, entry: Trace) {
        self.0.borrow_mut().trace.push(entry);
    }
}

pub struct FakePin {
    name: &'static str,
    bench: Bench,
    fail_high: bool,
}

impl OutputPin for FakePin {
    type Error = &'static str;

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.fail_high {
            return Err("pin driver fault");
        }
        let now = self.bench.now();
        self.bench.record(Trace::Pin(self.name, true, now));
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.bench.0.borrow().failing_low.contains(self.name) {
            return Err("pin stuck high");
        }
        let now = self.bench.now();
        self.bench.record(Trace::Pin(self.name, false, now));
        Ok(())
    }
}

pub struct FakeTimer(Bench);

impl Timer for FakeTimer {
    fn now_ms(&self) -> u64 {
        self.0.now()
    }

    fn delay_ms(&mut self, ms: u32) {
        let panic = self.0.0.borrow().panic_on_delay;
        if panic {
            panic!("interrupted during delay");
        }
        self.0.advance(u64::from(ms));
    }
}

pub struct FakeUart(Bench);

impl BleUart for FakeUart {
    type Error = &'static str;

    fn start_advertising(&mut self, device_name: &str) -> Result<(), Self::Error> {
        self.0.record(Trace::Advertising(device_name.to_string()));
        Ok(())
    }

    fn poll_event(&mut self) -> Option<BleEvent> {
        self.0.0.borrow_mut().events.pop_front()
    }

    fn notify(&mut self, conn: ConnHandle, line: &str) -> Result<(), Self::Error> {
        if self.0.0.borrow().fail_notify {
            return Err("not connected");
        }
        let now = self.0.now();
        self.0.record(Trace::Notify(conn, line.to_string(), now));
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), Self::Error> {
        self.0.record(Trace::Disconnect(conn));
        Ok(())
    }
}
