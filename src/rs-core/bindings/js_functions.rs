use crate::wasm_bindgen;

/// # js_functions
///
/// This file lists all JavaScript functions that are callable from Rust as well as
/// struct and enumeration used by those functions.
///
/// Those functions are only reachable when running in a JavaScript environment. Calling them
/// from a native build will panic, which is why they are only ever called through the
/// `JsConsoleSink` logger sink, the `JsMediaBuffer` and the `wasm32` version of the
/// `MonotonicClock`.

#[wasm_bindgen]
extern "C" {
    // Log the given text in the JavaScript console, with the log level given.
    pub fn jsLog(log_level: LogLevel, log: &str);

    // Returns the current monotonically-increasing timestamp, in milliseconds, as
    // returned by `performance.now()`.
    #[wasm_bindgen(js_namespace = performance, js_name = now)]
    pub fn jsPerformanceNow() -> f64;

    // Push media data to the buffer identified by `buffer_id`.
    //
    // Returns the name of the error encountered if the operation could not be
    // started. Its end has then to be signaled through the corresponding
    // `SourceBufferSink`.
    pub fn jsAppendBuffer(buffer_id: u32, data: &[u8]) -> Option<String>;

    // Remove media data between `start` and `end`, in seconds, from the buffer
    // identified by `buffer_id`.
    //
    // Same return value than `jsAppendBuffer`.
    pub fn jsRemoveBuffer(buffer_id: u32, start: f64, end: f64) -> Option<String>;
}

/// Levels with which a log can be emitted.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub enum LogLevel {
    /// Log level reserved for very important errors and highly unexpected events.
    Error = 0,

    /// Log level reserved for less important errors and unexpected events.
    Warn = 1,

    /// Log level reserved for important events
    Info = 2,

    /// Log level used when debugging. Small-ish yet impactful events should be logged with it.
    Debug = 3,
}
