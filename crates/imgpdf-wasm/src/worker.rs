//! A pool worker backed by a browser Web Worker.
//!
//! The worker script is expected to call `start_convert_worker()` after
//! loading this module, see `js/convert-worker.js`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use imgpdf_core::{ConvertRequest, Reply, Worker, WorkerError};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{console, ErrorEvent, Event, MessageEvent, WorkerOptions, WorkerType};

use crate::message;

type Slot = Rc<RefCell<Option<Reply<Vec<u8>>>>>;

/// One Web Worker running the conversion module.
///
/// Holds the reply for the task it is working on. The message and error
/// handlers are installed once and report into that slot.
pub struct WebWorker {
    inner: web_sys::Worker,
    current: Slot,
    stopped: Cell<bool>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

impl WebWorker {
    /// Start a module worker from `script_url`.
    pub fn spawn(script_url: &str) -> Result<Self, JsValue> {
        let options = WorkerOptions::new();
        options.set_type(WorkerType::Module);
        let inner = web_sys::Worker::new_with_options(script_url, &options)?;
        let current: Slot = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&current);
        let on_message = Closure::wrap(Box::new(move |event: MessageEvent| {
            // Release the borrow before reporting: the pool may hand this
            // worker its next task from inside `report`.
            let reply = slot.borrow_mut().take();
            match reply {
                Some(reply) => reply.report(message::decode_response(event.data())),
                None => console::warn_1(&JsValue::from_str(
                    "conversion worker replied with no task pending",
                )),
            }
        }) as Box<dyn FnMut(MessageEvent)>);

        let slot = Rc::clone(&current);
        // A script that fails to load fires a plain `Event`; only uncaught
        // exceptions inside the worker carry an `ErrorEvent`.
        let on_error = Closure::wrap(Box::new(move |event: Event| {
            event.prevent_default();
            let message = error_message(&event);
            let reply = slot.borrow_mut().take();
            match reply {
                Some(reply) => reply.reject(WorkerError::Failed(message)),
                None => console::error_2(
                    &JsValue::from_str("conversion worker error"),
                    &JsValue::from_str(&message),
                ),
            }
        }) as Box<dyn FnMut(Event)>);

        inner.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        inner.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        Ok(Self {
            inner,
            current,
            stopped: Cell::new(false),
            _on_message: on_message,
            _on_error: on_error,
        })
    }

    /// Whether a task is in flight on this worker.
    pub fn is_busy(&self) -> bool {
        self.current.borrow().is_some()
    }
}

fn error_message(event: &Event) -> String {
    event
        .dyn_ref::<ErrorEvent>()
        .map(ErrorEvent::message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| "conversion worker failed to load".to_string())
}

impl Worker<ConvertRequest, Vec<u8>> for WebWorker {
    fn send(&self, input: ConvertRequest, reply: Reply<Vec<u8>>) {
        if self.stopped.get() {
            reply.reject(WorkerError::Stopped);
            return;
        }
        let message = match message::encode_request(&input) {
            Ok(message) => message,
            Err(err) => {
                reply.reject(WorkerError::Failed(message::describe(&err)));
                return;
            }
        };

        *self.current.borrow_mut() = Some(reply);
        if let Err(err) = self.inner.post_message(&message) {
            let reply = self.current.borrow_mut().take();
            if let Some(reply) = reply {
                reply.reject(WorkerError::Failed(message::describe(&err)));
            }
        }
    }

    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        self.inner.set_onmessage(None);
        self.inner.set_onerror(None);
        self.inner.terminate();
        let abandoned = self.current.borrow_mut().take();
        drop(abandoned);
    }
}

impl Drop for WebWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
