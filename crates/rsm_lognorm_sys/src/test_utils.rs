//! In-process fake of the normalization shim.
//!
//! `FAKE_API` exposes the same table as a loaded library, backed by a small
//! rule engine that understands `rule=<tags>:<pattern>` lines with `%name:rest%`
//! and `%name:word%` fields. Like the real engine, rule errors are reported
//! through the error callback while the load call itself still returns 0.
//! Notifications carry the context pointer as their token.
//!
//! Bookkeeping is thread-local: counters and fault switches only see calls
//! made on the current thread.

use std::cell::{Cell, RefCell};
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;

use crate::ffi::{LN_WRONGPARSER, NormalizedStruct, NotificationCallback, OptionsStruct};
use crate::library::LognormApi;

/// Version string reported by the fake.
pub const FAKE_VERSION: &str = "2.0.6";

/// Status returned by `loadSamples` when the file cannot be read.
pub const LOAD_FILE_ERROR: c_int = 1;

static VERSION: &CStr = c"2.0.6";

/// Export table of the fake engine.
pub static FAKE_API: LognormApi = LognormApi {
    version: fake_version,
    init_ctx: fake_init_ctx,
    exit_ctx: fake_exit_ctx,
    set_ctx_opts: fake_set_ctx_opts,
    has_advanced_stats: fake_has_advanced_stats,
    load_samples: fake_load_samples,
    load_samples_from_string: fake_load_samples_from_string,
    rulebase_version: fake_rulebase_version,
    normalize: fake_normalize,
    read_result: fake_read_result,
    destroy_result: fake_destroy_result,
    set_debug_cb: fake_set_debug_cb,
    set_err_msg_cb: fake_set_err_msg_cb,
};

/// Fault switches for the current thread.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// `initCtx` returns null.
    pub fail_init: bool,
    /// Status returned by `exitCtx` (the context is freed regardless).
    pub exit_status: c_int,
    /// Status returned by `setDebugCB`.
    pub debug_cb_status: c_int,
    /// Status returned by `setErrMsgCB`.
    pub err_msg_cb_status: c_int,
    /// `normalize` returns status 0 with a null result reference.
    pub null_result: bool,
    /// Overrides the version reported by `rulebaseVersion`.
    pub rulebase_version: Option<c_int>,
}

/// Restores the default fault switches when dropped.
#[must_use = "faults are cleared when the guard is dropped"]
pub struct FaultGuard(());

impl Drop for FaultGuard {
    fn drop(&mut self) {
        FAULTS.with(|f| *f.borrow_mut() = Faults::default());
    }
}

thread_local! {
    static FAULTS: RefCell<Faults> = RefCell::new(Faults::default());
    static LIVE_CONTEXTS: Cell<isize> = const { Cell::new(0) };
    static LIVE_RESULTS: Cell<isize> = const { Cell::new(0) };
}

/// Installs fault switches for the current thread until the guard drops.
pub fn inject(faults: Faults) -> FaultGuard {
    FAULTS.with(|f| *f.borrow_mut() = faults);
    FaultGuard(())
}

/// Contexts created on this thread and not yet released.
pub fn live_contexts() -> isize {
    LIVE_CONTEXTS.with(Cell::get)
}

/// Result references handed out on this thread and not yet destroyed.
pub fn live_results() -> isize {
    LIVE_RESULTS.with(Cell::get)
}

fn faults() -> Faults {
    FAULTS.with(|f| f.borrow().clone())
}

fn bump(counter: &'static std::thread::LocalKey<Cell<isize>>, delta: isize) {
    counter.with(|c| c.set(c.get() + delta));
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Rest(String),
    Word(String),
}

#[derive(Debug)]
struct Rule {
    mockup: String,
    segments: Vec<Segment>,
    origin: String,
    line: usize,
}

#[derive(Default)]
struct FakeContext {
    options: OptionsStruct,
    rules: Vec<Rule>,
    version: c_int,
    debug: Option<NotificationCallback>,
    error: Option<NotificationCallback>,
}

impl FakeContext {
    fn debug(&self, message: &str) {
        if let Some(cb) = self.debug {
            self.emit(cb, message);
        }
    }

    fn error(&self, message: &str) {
        if let Some(cb) = self.error {
            self.emit(cb, message);
        }
    }

    fn emit(&self, cb: NotificationCallback, message: &str) {
        // Interior NULs cannot come from rule text read through a C string.
        let Ok(text) = CString::new(message) else {
            return;
        };
        let token = (self as *const Self).cast_mut().cast();
        // SAFETY: The callback contract only requires the message to be
        // valid for the duration of the call.
        unsafe { cb(token, text.as_ptr(), message.len()) };
    }

    fn load(&mut self, text: &str, origin: &str) {
        let mut version = 1;
        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == "version=2" {
                if self.rules.is_empty() && index == 0 {
                    version = 2;
                } else {
                    self.error(&format!(
                        "{origin}[{line_no}]: version specifier must be the first line"
                    ));
                }
                continue;
            }
            let Some(body) = line.strip_prefix("rule=") else {
                self.error(&format!(
                    "{origin}[{line_no}]: invalid record type detected: '{line}'"
                ));
                continue;
            };
            let Some((_tags, mockup)) = body.split_once(':') else {
                self.error(&format!(
                    "{origin}[{line_no}]: invalid rule: missing ':' after tags in '{line}'"
                ));
                continue;
            };
            match parse_mockup(mockup) {
                Ok(segments) => {
                    self.debug(&format!("{origin}[{line_no}]: added rule '{mockup}'"));
                    self.rules.push(Rule {
                        mockup: mockup.to_string(),
                        segments,
                        origin: origin.to_string(),
                        line: line_no,
                    });
                }
                Err(reason) => self.error(&format!("{origin}[{line_no}]: {reason}")),
            }
        }
        if !self.rules.is_empty() {
            self.version = version;
        }
    }

    fn normalize(&self, text: &str) -> (c_int, String) {
        self.debug(&format!("normalizing '{text}'"));
        for rule in &self.rules {
            if let Some(fields) = match_segments(&rule.segments, text) {
                return (0, self.render(rule, fields, text));
            }
        }
        let body = format!(
            "{{ \"originalmsg\": {}, \"unparsed-data\": {} }}",
            quote(text),
            quote(text)
        );
        (LN_WRONGPARSER, body)
    }

    fn render(&self, rule: &Rule, fields: Vec<(String, String)>, text: &str) -> String {
        let mut entries: Vec<String> = fields
            .iter()
            .map(|(name, value)| format!("{}: {}", quote(name), quote(value)))
            .collect();
        if self.options.add_exec_path != 0 {
            entries.push(format!(
                "\"exec-path\": {}",
                quote(&format!("[{}]", rule.mockup))
            ));
        }
        if self.options.add_original_msg != 0 {
            entries.push(format!("\"originalmsg\": {}", quote(text)));
        }
        let mut rule_meta = Vec::new();
        if self.options.add_rule != 0 {
            rule_meta.push(format!("\"mockup\": {}", quote(&rule.mockup)));
        }
        if self.options.add_rule_location != 0 {
            rule_meta.push(format!(
                "\"location\": {{ \"file\": {}, \"line\": {} }}",
                quote(&rule.origin),
                rule.line
            ));
        }
        if !rule_meta.is_empty() {
            entries.push(format!(
                "\"metadata\": {{ \"rule\": {{ {} }} }}",
                rule_meta.join(", ")
            ));
        }
        if entries.is_empty() {
            "{ }".to_string()
        } else {
            format!("{{ {} }}", entries.join(", "))
        }
    }
}

fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn parse_mockup(mockup: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = mockup;
    while !rest.is_empty() {
        match rest.find('%') {
            Some(0) => {
                let after = &rest[1..];
                let end = after
                    .find('%')
                    .ok_or_else(|| format!("unterminated field in '{mockup}'"))?;
                let field = &after[..end];
                let (name, kind) = field
                    .split_once(':')
                    .ok_or_else(|| format!("field '{field}' has no type"))?;
                segments.push(match kind {
                    "rest" => Segment::Rest(name.to_string()),
                    "word" => Segment::Word(name.to_string()),
                    other => return Err(format!("unknown field type '{other}'")),
                });
                rest = &after[end + 1..];
            }
            Some(pos) => {
                segments.push(Segment::Literal(rest[..pos].to_string()));
                rest = &rest[pos..];
            }
            None => {
                segments.push(Segment::Literal(rest.to_string()));
                rest = "";
            }
        }
    }
    Ok(segments)
}

fn match_segments(segments: &[Segment], text: &str) -> Option<Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut rest = text;
    for segment in segments {
        match segment {
            Segment::Literal(lit) => rest = rest.strip_prefix(lit.as_str())?,
            Segment::Rest(name) => {
                fields.push((name.clone(), rest.to_string()));
                rest = "";
            }
            Segment::Word(name) => {
                let end = rest.find(' ').unwrap_or(rest.len());
                if end == 0 {
                    return None;
                }
                fields.push((name.clone(), rest[..end].to_string()));
                rest = &rest[end..];
            }
        }
    }
    rest.is_empty().then_some(fields)
}

struct FakeResult {
    json: CString,
}

/// # Safety
/// `ctx` must be null or a pointer returned by `fake_init_ctx`.
unsafe fn context<'a>(ctx: *mut c_void) -> Option<&'a mut FakeContext> {
    // SAFETY: Guaranteed by the caller.
    unsafe { ctx.cast::<FakeContext>().as_mut() }
}

/// # Safety
/// `text` must be null or a valid NUL-terminated string.
unsafe fn string_arg(text: *const c_char) -> Option<String> {
    if text.is_null() {
        return None;
    }
    // SAFETY: Guaranteed by the caller.
    Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
}

unsafe extern "C" fn fake_version() -> *const c_char {
    VERSION.as_ptr()
}

unsafe extern "C" fn fake_init_ctx() -> *mut c_void {
    if faults().fail_init {
        return ptr::null_mut();
    }
    bump(&LIVE_CONTEXTS, 1);
    Box::into_raw(Box::<FakeContext>::default()).cast()
}

unsafe extern "C" fn fake_exit_ctx(ctx: *mut c_void) -> c_int {
    if ctx.is_null() {
        return -1;
    }
    // SAFETY: Non-null contexts only come from `fake_init_ctx`.
    drop(unsafe { Box::from_raw(ctx.cast::<FakeContext>()) });
    bump(&LIVE_CONTEXTS, -1);
    faults().exit_status
}

unsafe extern "C" fn fake_set_ctx_opts(ctx: *mut c_void, opts: *const OptionsStruct) {
    // SAFETY: Pointers come from the wrapper under the shim contract.
    if let (Some(ctx), Some(opts)) = (unsafe { context(ctx) }, unsafe { opts.as_ref() }) {
        ctx.options = *opts;
    }
}

unsafe extern "C" fn fake_has_advanced_stats() -> c_int {
    0
}

unsafe extern "C" fn fake_load_samples(ctx: *mut c_void, path: *const c_char) -> c_int {
    // SAFETY: Pointers come from the wrapper under the shim contract.
    let (Some(ctx), Some(path)) = (unsafe { context(ctx) }, unsafe { string_arg(path) }) else {
        return -1;
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            ctx.load(&text, &format!("rulebase file {path}"));
            0
        }
        Err(e) => {
            ctx.error(&format!("cannot open rulebase file {path}: {e}"));
            LOAD_FILE_ERROR
        }
    }
}

unsafe extern "C" fn fake_load_samples_from_string(ctx: *mut c_void, text: *const c_char) -> c_int {
    // SAFETY: Pointers come from the wrapper under the shim contract.
    let (Some(ctx), Some(text)) = (unsafe { context(ctx) }, unsafe { string_arg(text) }) else {
        return -1;
    };
    ctx.load(&text, "rulebase file <string>");
    0
}

unsafe extern "C" fn fake_rulebase_version(ctx: *mut c_void) -> c_int {
    if let Some(forced) = faults().rulebase_version {
        return forced;
    }
    // SAFETY: Pointer comes from the wrapper under the shim contract.
    unsafe { context(ctx) }.map_or(0, |ctx| ctx.version)
}

unsafe extern "C" fn fake_normalize(ctx: *mut c_void, text: *const c_char) -> NormalizedStruct {
    // SAFETY: Pointers come from the wrapper under the shim contract.
    let (Some(ctx), Some(text)) = (unsafe { context(ctx) }, unsafe { string_arg(text) }) else {
        return NormalizedStruct {
            rv: -1,
            jref: ptr::null_mut(),
        };
    };
    if faults().null_result {
        return NormalizedStruct {
            rv: 0,
            jref: ptr::null_mut(),
        };
    }
    let (rv, json) = ctx.normalize(&text);
    let Ok(json) = CString::new(json) else {
        return NormalizedStruct {
            rv: -1,
            jref: ptr::null_mut(),
        };
    };
    bump(&LIVE_RESULTS, 1);
    NormalizedStruct {
        rv,
        jref: Box::into_raw(Box::new(FakeResult { json })).cast(),
    }
}

unsafe extern "C" fn fake_read_result(jref: *mut c_void) -> *const c_char {
    // SAFETY: Non-null references only come from `fake_normalize`.
    match unsafe { jref.cast::<FakeResult>().as_ref() } {
        Some(result) => result.json.as_ptr(),
        None => ptr::null(),
    }
}

unsafe extern "C" fn fake_destroy_result(jref: *mut c_void) {
    if jref.is_null() {
        return;
    }
    // SAFETY: Non-null references only come from `fake_normalize`.
    drop(unsafe { Box::from_raw(jref.cast::<FakeResult>()) });
    bump(&LIVE_RESULTS, -1);
}

unsafe extern "C" fn fake_set_debug_cb(
    ctx: *mut c_void,
    cb: Option<NotificationCallback>,
) -> c_int {
    let status = faults().debug_cb_status;
    if status != 0 {
        return status;
    }
    // SAFETY: Pointer comes from the wrapper under the shim contract.
    match unsafe { context(ctx) } {
        Some(ctx) => {
            ctx.debug = cb;
            0
        }
        None => -1,
    }
}

unsafe extern "C" fn fake_set_err_msg_cb(
    ctx: *mut c_void,
    cb: Option<NotificationCallback>,
) -> c_int {
    let status = faults().err_msg_cb_status;
    if status != 0 {
        return status;
    }
    // SAFETY: Pointer comes from the wrapper under the shim contract.
    match unsafe { context(ctx) } {
        Some(ctx) => {
            ctx.error = cb;
            0
        }
        None => -1,
    }
}
