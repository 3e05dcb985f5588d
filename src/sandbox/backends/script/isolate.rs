//! One evaluation in a fresh V8 isolate.
//!
//! The user's source becomes the body of an `AsyncFunction` whose only
//! parameter is the console shim, so top-level `await` and `return` work. The
//! surrounding bootstrap prunes the global object down to the allow-list,
//! records console calls as tagged JSON descriptors and resolves to a
//! serialized [`RunReport`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::{debug, info};
use v8::{Context, ContextScope, HandleScope, Script};

use super::console::RunReport;
use crate::error::{PolyrunError, Result};

static V8_PLATFORM: Lazy<()> = Lazy::new(|| {
    let platform = v8::new_default_platform(0, false).make_shared();
    v8::V8::initialize_platform(platform);
    v8::V8::initialize();
    info!("V8 platform initialized");
});

pub fn init_platform() {
    Lazy::force(&V8_PLATFORM);
}

/// How an evaluation ended.
#[derive(Debug)]
pub enum Evaluation {
    Completed(RunReport),
    /// Execution was stopped by [`Terminator::fire`].
    Terminated,
}

/// Cross-thread kill switch for the isolate running one evaluation.
///
/// The deadline task calls [`fire`](Self::fire); the evaluating thread
/// [`arm`](Self::arm)s it with the isolate handle once the isolate exists.
/// Whichever happens second performs the termination.
#[derive(Default)]
pub struct Terminator {
    fired: AtomicBool,
    handle: Mutex<Option<v8::IsolateHandle>>,
}

impl Terminator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns false when the deadline already passed.
    fn arm(&self, handle: v8::IsolateHandle) -> bool {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if self.fired.load(Ordering::SeqCst) {
            return false;
        }
        *slot = Some(handle);
        true
    }

    fn disarm(&self) {
        self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn fire(&self) {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        self.fired.store(true, Ordering::SeqCst);
        if let Some(handle) = slot.take() {
            let terminated = handle.terminate_execution();
            debug!(terminated, "Terminating isolate");
        }
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Build the bootstrap script around `source`.
fn bootstrap(source: &str, allowed_globals: &[String]) -> Result<String> {
    let source = serde_json::to_string(source)?;
    let allowed = serde_json::to_string(allowed_globals)?;

    Ok(format!(
        r#"(function () {{
  const JSON_ = JSON;
  const String_ = String;
  const isArray = Array.isArray;
  const ownNames = Object.getOwnPropertyNames;
  const AsyncFunction = Object.getPrototypeOf(async function () {{}}).constructor;

  const allowed = {allowed};
  for (const name of ownNames(globalThis)) {{
    if (allowed.indexOf(name) === -1) {{
      try {{ delete globalThis[name]; }} catch (_) {{}}
    }}
  }}

  const isErrorLike = (v) =>
    v !== null && typeof v === 'object' &&
    typeof v.name === 'string' && typeof v.message === 'string' && 'stack' in v;

  const describe = (v) => {{
    if (v === undefined) return {{ t: 'undefined' }};
    if (v === null) return {{ t: 'null' }};
    if (typeof v === 'function') return {{ t: 'function', name: v.name || 'anonymous' }};
    if (isErrorLike(v)) return {{ t: 'error', name: v.name, message: v.message }};
    if (typeof v === 'string') return {{ t: 'string', value: v }};
    if (typeof v === 'object') {{
      try {{
        const text = JSON_.stringify(v, null, 2);
        if (typeof text === 'string') return {{ t: 'json', value: text }};
      }} catch (_) {{}}
      return {{ t: 'text', value: String_(v) }};
    }}
    return {{ t: 'text', value: String_(v) }};
  }};

  const entries = [];
  const record = (level) => (...args) => {{
    entries.push({{ level, args: args.map(describe) }});
  }};
  const table = (data, ...rest) => {{
    const entry = {{ level: 'table', args: [data, ...rest].map(describe) }};
    if (isArray(data)) {{
      try {{ entry.rows = JSON_.parse(JSON_.stringify(data)); }} catch (_) {{}}
    }}
    entries.push(entry);
  }};
  const console = {{
    log: record('log'),
    info: record('info'),
    debug: record('debug'),
    warn: record('warn'),
    error: record('error'),
    table,
  }};

  const report = {{ entries, returned: null, error: null }};
  // Syntax errors carry no stack frame inside the user's code.
  const fail = (e, compiling) => {{
    report.error = isErrorLike(e)
      ? {{ name: String_(e.name), message: String_(e.message), stack: compiling ? '' : String_(e.stack || '') }}
      : {{ name: 'Uncaught', message: describeText(e), stack: '' }};
    return JSON_.stringify(report);
  }};
  const describeText = (e) => {{
    const d = describe(e);
    return d.value !== undefined ? d.value : d.t;
  }};

  let run;
  try {{
    run = new AsyncFunction('console', {source});
  }} catch (e) {{
    return fail(e, true);
  }}
  return run(console).then(
    (value) => {{
      if (value !== undefined) report.returned = describe(value);
      return JSON_.stringify(report);
    }},
    (e) => fail(e, false),
  );
}})()"#
    ))
}

/// Evaluate `source` to completion on the current thread.
///
/// Blocks until the user's function settles or `terminator` fires. Runs on a
/// `spawn_blocking` thread; the isolate never leaves it.
pub fn evaluate(
    source: &str,
    allowed_globals: &[String],
    terminator: &Terminator,
) -> Result<Evaluation> {
    init_platform();
    let wrapper = bootstrap(source, allowed_globals)?;

    let isolate = &mut v8::Isolate::new(v8::CreateParams::default());
    if !terminator.arm(isolate.thread_safe_handle()) {
        return Ok(Evaluation::Terminated);
    }
    let outcome = run_wrapper(isolate, &wrapper, terminator);
    terminator.disarm();
    outcome
}

fn run_wrapper(
    isolate: &mut v8::OwnedIsolate,
    wrapper: &str,
    terminator: &Terminator,
) -> Result<Evaluation> {
    let scope = std::pin::pin!(HandleScope::new(isolate));
    let scope = &mut scope.init();
    let v8_context = Context::new(scope, Default::default());
    let scope = &mut ContextScope::new(scope, v8_context);

    let code = v8::String::new(scope, wrapper)
        .ok_or_else(|| PolyrunError::Execution("Failed to create V8 string".into()))?;

    let script = Script::compile(scope, code, None)
        .ok_or_else(|| PolyrunError::Execution("Failed to compile evaluator bootstrap".into()))?;

    let Some(result) = script.run(scope) else {
        if terminator.fired() {
            return Ok(Evaluation::Terminated);
        }
        return Err(PolyrunError::Execution("Evaluator bootstrap threw".into()));
    };

    let result = if result.is_promise() {
        let promise = v8::Local::<v8::Promise>::try_from(result)
            .map_err(|_| PolyrunError::Execution("Failed to cast to Promise".into()))?;

        // Drains every queued job, including `await` chains. There is no event
        // loop behind it, so anything still pending afterwards never settles.
        scope.perform_microtask_checkpoint();

        match promise.state() {
            v8::PromiseState::Fulfilled => promise.result(scope),
            v8::PromiseState::Pending if terminator.fired() => {
                return Ok(Evaluation::Terminated);
            }
            v8::PromiseState::Pending => {
                return Ok(Evaluation::Completed(RunReport {
                    error: Some(super::console::ThrownError {
                        name: "Error".to_string(),
                        message: "Top-level await never settled".to_string(),
                        stack: String::new(),
                    }),
                    ..Default::default()
                }));
            }
            v8::PromiseState::Rejected => {
                let exception = promise.result(scope);
                let message = exception
                    .to_string(scope)
                    .map(|s| s.to_rust_string_lossy(scope))
                    .unwrap_or_default();
                return Err(PolyrunError::Execution(message));
            }
        }
    } else {
        result
    };

    if terminator.fired() {
        return Ok(Evaluation::Terminated);
    }

    let report = result
        .to_string(scope)
        .map(|s| s.to_rust_string_lossy(scope))
        .ok_or_else(|| PolyrunError::Execution("Evaluator returned no report".into()))?;

    Ok(Evaluation::Completed(serde_json::from_str(&report)?))
}
