//! In-process backend for tests
//!
//! Streams opened here never touch hardware. Tests push microphone audio
//! with [`MockBackend::feed_input`] and pull rendered output with
//! [`MockBackend::render_output`].

use std::sync::{Arc, Mutex};

use super::backend::{
    AudioBackend, InputCallback, RenderCallback, StreamControl, StreamHandle, StreamInfo,
};
use crate::error::{AudioError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockFailure {
    Denied,
    Unavailable,
}

impl MockFailure {
    fn to_error(self) -> AudioError {
        match self {
            MockFailure::Denied => AudioError::PermissionDenied("mock: access refused".into()),
            MockFailure::Unavailable => AudioError::CaptureUnavailable("mock: no device".into()),
        }
    }
}

struct Input {
    id: u64,
    paused: bool,
    callback: InputCallback,
}

struct Output {
    id: u64,
    callback: RenderCallback,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    failure: Option<MockFailure>,
    opened: u64,
}

pub struct MockBackend {
    info: StreamInfo,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            info: StreamInfo {
                sample_rate,
                channels: 1,
            },
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Make every following open fail
    pub fn fail_with(&self, failure: MockFailure) {
        self.state.lock().unwrap().failure = Some(failure);
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().failure = None;
    }

    /// Deliver samples to every live, unpaused input stream
    pub fn feed_input(&self, samples: &[f32]) {
        let mut state = self.state.lock().unwrap();
        for input in state.inputs.iter_mut().filter(|i| !i.paused) {
            (input.callback)(samples);
        }
    }

    /// Pull `frames` samples from the first live output stream
    pub fn render_output(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames];
        let mut state = self.state.lock().unwrap();
        if let Some(output) = state.outputs.first_mut() {
            (output.callback)(&mut buffer, self.info.sample_rate);
        }
        buffer
    }

    pub fn live_inputs(&self) -> usize {
        self.state.lock().unwrap().inputs.len()
    }

    pub fn live_outputs(&self) -> usize {
        self.state.lock().unwrap().outputs.len()
    }

    /// Number of streams successfully opened so far
    pub fn opened(&self) -> u64 {
        self.state.lock().unwrap().opened
    }

    fn allocate(&self, state: &mut MockState) -> Result<u64> {
        if let Some(failure) = state.failure {
            return Err(failure.to_error());
        }
        state.next_id += 1;
        state.opened += 1;
        Ok(state.next_id)
    }
}

impl AudioBackend for MockBackend {
    fn open_input(&self, on_samples: InputCallback) -> Result<StreamHandle> {
        let mut state = self.state.lock().unwrap();
        let id = self.allocate(&mut state)?;
        state.inputs.push(Input {
            id,
            paused: false,
            callback: on_samples,
        });
        Ok(StreamHandle::new(
            self.info,
            Box::new(MockStream {
                id,
                state: Arc::clone(&self.state),
            }),
        ))
    }

    fn open_output(&self, render: RenderCallback) -> Result<StreamHandle> {
        let mut state = self.state.lock().unwrap();
        let id = self.allocate(&mut state)?;
        state.outputs.push(Output {
            id,
            callback: render,
        });
        Ok(StreamHandle::new(
            self.info,
            Box::new(MockStream {
                id,
                state: Arc::clone(&self.state),
            }),
        ))
    }
}

struct MockStream {
    id: u64,
    state: Arc<Mutex<MockState>>,
}

impl MockStream {
    fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(input) = state.inputs.iter_mut().find(|i| i.id == self.id) {
            input.paused = paused;
        }
    }
}

impl StreamControl for MockStream {
    fn pause(&self) -> Result<()> {
        self.set_paused(true);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.set_paused(false);
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.inputs.retain(|i| i.id != self.id);
            state.outputs.retain(|o| o.id != self.id);
        }
    }
}
