//! The instantiated guest and its entry-point wrappers.
//!
//! [`Guest`] owns the store, the captured exports, and the marshalling
//! plumbing for the three conversion entry points. Calls are serialized
//! through a mutex: the guest executes synchronously and is single-threaded,
//! so one call must complete before the next is issued.
//!
//! Two wire conventions are in play, per entry point:
//! - `markdown_to_html(ptr, len, options) -> handle` returns its result
//!   object directly as a heap handle;
//! - the string-returning entry points use a return-by-slot convention:
//!   the host reserves 16 bytes of guest shadow stack, the guest writes a
//!   `(ptr, len)` pair there, and the host decodes then frees the buffer.

use parking_lot::Mutex;
use tracing::{instrument, warn};
use wasmtime::{Instance, Store, TypedFunc};

use vellum_common::{
    BridgeError, GuestThrow, MarkdownHtml, MarkdownOptions, PlaintextOptions,
};
use vellum_core::{BridgeState, GuestAllocator, GuestLog, HostValue, MemoryViews, codec};

const EXPORT_MEMORY: &str = "memory";
const EXPORT_FREE: &str = "__wbindgen_free";
const EXPORT_STACK_POINTER: &str = "__wbindgen_add_to_stack_pointer";
const EXPORT_MARKDOWN_TO_HTML: &str = "markdown_to_html";
const EXPORT_MARKDOWN_TO_PLAINTEXT: &str = "markdown_to_plaintext";
const EXPORT_MJML_TO_HTML: &str = "mjml_to_html";

/// How a guest throw should be classified for a given entry point.
///
/// A throw while converting MJML is a normal conversion failure the guest
/// reports through its error channel; a throw from the Markdown entry points
/// means the guest aborted (it could not parse its options) and the call is
/// a deterministic fault.
#[derive(Debug, Clone, Copy)]
enum ThrowSeverity {
    Fatal,
    Recoverable,
}

#[derive(Clone)]
struct GuestExports {
    free: TypedFunc<(u32, u32, u32), ()>,
    add_to_stack_pointer: TypedFunc<i32, u32>,
    markdown_to_html: TypedFunc<(u32, u32, u32), u32>,
    markdown_to_plaintext: TypedFunc<(u32, u32, u32, u32), ()>,
    mjml_to_html: TypedFunc<(u32, u32, u32), ()>,
}

struct GuestInstance {
    store: Store<BridgeState>,
    views: MemoryViews,
    alloc: GuestAllocator,
    exports: GuestExports,
}

/// A loaded, ready-to-call guest module.
///
/// Obtained from [`ModuleLoader::load`](crate::ModuleLoader::load); the
/// loader hands out the same instance to every caller for the life of the
/// process.
pub struct Guest {
    inner: Mutex<GuestInstance>,
}

impl Guest {
    /// Capture the exports of a freshly instantiated guest.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingExport`] if any required export is
    /// absent or mistyped.
    pub(crate) fn new(mut store: Store<BridgeState>, instance: &Instance) -> Result<Self, BridgeError> {
        let memory = instance
            .get_memory(&mut store, EXPORT_MEMORY)
            .ok_or_else(|| BridgeError::missing_export(EXPORT_MEMORY))?;
        let alloc = GuestAllocator::from_instance(&mut store, instance)?;

        let exports = GuestExports {
            free: typed_export(instance, &mut store, EXPORT_FREE)?,
            add_to_stack_pointer: typed_export(instance, &mut store, EXPORT_STACK_POINTER)?,
            markdown_to_html: typed_export(instance, &mut store, EXPORT_MARKDOWN_TO_HTML)?,
            markdown_to_plaintext: typed_export(instance, &mut store, EXPORT_MARKDOWN_TO_PLAINTEXT)?,
            mjml_to_html: typed_export(instance, &mut store, EXPORT_MJML_TO_HTML)?,
        };

        Ok(Self {
            inner: Mutex::new(GuestInstance {
                store,
                views: MemoryViews::new(memory),
                alloc,
                exports,
            }),
        })
    }

    /// Convert Markdown to HTML.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Conversion`] when the guest reports an error list
    /// - [`BridgeError::GuestFault`] when the guest aborts the call
    /// - [`BridgeError::Marshalling`] when the result cannot be decoded
    #[instrument(skip(self, markdown, options), fields(markdown_len = markdown.len()))]
    pub fn markdown_to_html(
        &self,
        markdown: &str,
        options: &MarkdownOptions,
    ) -> Result<MarkdownHtml, BridgeError> {
        let mut guard = self.inner.lock();
        let g = &mut *guard;

        let (ptr, len) = codec::encode(&mut g.store, &g.alloc, &g.views, markdown)?;
        let options_handle = g
            .store
            .data_mut()
            .heap
            .put(markdown_options_value(options));

        let entry = g.exports.markdown_to_html.clone();
        let result = entry.call(&mut g.store, (ptr, len, options_handle));
        g.store.data_mut().bump_memory_epoch();

        let handle = result.map_err(|e| classify_trap(&e, ThrowSeverity::Fatal))?;
        let value = g.store.data_mut().heap.take(handle)?;
        let json = value.into_json()?;

        if let Some(errors) = json.get("errors").and_then(serde_json::Value::as_array) {
            let message = errors
                .iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BridgeError::conversion(message));
        }

        serde_json::from_value(json).map_err(|e| {
            BridgeError::marshalling(format!("unexpected conversion output shape: {e}"))
        })
    }

    /// Convert Markdown to plaintext.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::GuestFault`] when the guest aborts the call
    /// - [`BridgeError::Marshalling`] on invalid UTF-8 from the guest
    #[instrument(skip(self, markdown, options), fields(markdown_len = markdown.len()))]
    pub fn markdown_to_plaintext(
        &self,
        markdown: &str,
        options: &PlaintextOptions,
    ) -> Result<String, BridgeError> {
        let mut guard = self.inner.lock();
        let g = &mut *guard;

        let (ptr, len) = codec::encode(&mut g.store, &g.alloc, &g.views, markdown)?;
        let options_handle = g
            .store
            .data_mut()
            .heap
            .put(plaintext_options_value(options));

        call_string_entry(g, ThrowSeverity::Fatal, move |g, retptr| {
            let entry = g.exports.markdown_to_plaintext.clone();
            entry.call(&mut g.store, (retptr, ptr, len, options_handle))
        })
    }

    /// Convert MJML to HTML.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Conversion`] when the guest rejects the input,
    ///   carrying the guest's message
    /// - [`BridgeError::Marshalling`] on invalid UTF-8 from the guest
    #[instrument(skip(self, mjml), fields(mjml_len = mjml.len()))]
    pub fn mjml_to_html(&self, mjml: &str) -> Result<String, BridgeError> {
        let mut guard = self.inner.lock();
        let g = &mut *guard;

        let (ptr, len) = codec::encode(&mut g.store, &g.alloc, &g.views, mjml)?;

        call_string_entry(g, ThrowSeverity::Recoverable, move |g, retptr| {
            let entry = g.exports.mjml_to_html.clone();
            entry.call(&mut g.store, (retptr, ptr, len))
        })
    }

    /// Drain the logs the guest emitted so far.
    pub fn take_logs(&self) -> Vec<GuestLog> {
        std::mem::take(&mut self.inner.lock().store.data_mut().logs)
    }
}

impl std::fmt::Debug for Guest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guest").finish_non_exhaustive()
    }
}

fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<BridgeState>,
    name: &str,
) -> Result<TypedFunc<P, R>, BridgeError>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|_| BridgeError::missing_export(name))
}

/// Run a return-by-slot entry point: reserve 16 bytes of guest shadow
/// stack, let the guest write a `(ptr, len)` pair, decode the string, free
/// the guest buffer, restore the stack.
fn call_string_entry<F>(
    g: &mut GuestInstance,
    severity: ThrowSeverity,
    invoke: F,
) -> Result<String, BridgeError>
where
    F: FnOnce(&mut GuestInstance, u32) -> Result<(), wasmtime::Error>,
{
    let retptr = g
        .exports
        .add_to_stack_pointer
        .call(&mut g.store, -16)
        .map_err(|e| classify_trap(&e, severity))?;

    let call_result = invoke(g, retptr);
    g.store.data_mut().bump_memory_epoch();

    let outcome = match call_result {
        Err(e) => Err(classify_trap(&e, severity)),
        Ok(()) => read_and_free_string(g, retptr),
    };

    // Restore the shadow stack regardless of outcome.
    let restore = g.exports.add_to_stack_pointer.call(&mut g.store, 16);
    if let Err(e) = restore {
        warn!(error = %e, "failed to restore guest stack pointer");
    }

    outcome
}

fn read_and_free_string(g: &mut GuestInstance, retptr: u32) -> Result<String, BridgeError> {
    let ptr = g.views.read_i32(&g.store, retptr)? as u32;
    let len = g.views.read_i32(&g.store, retptr + 4)? as u32;

    let text = codec::decode(&g.store, &g.views, ptr, len);

    // The guest buffer is freed whether or not decoding succeeded.
    if let Err(e) = g.exports.free.call(&mut g.store, (ptr, len, 1)) {
        warn!(error = %e, "guest free failed");
    }
    g.store.data_mut().bump_memory_epoch();

    text
}

fn classify_trap(err: &wasmtime::Error, severity: ThrowSeverity) -> BridgeError {
    if let Some(thrown) = err.downcast_ref::<GuestThrow>() {
        return match severity {
            ThrowSeverity::Fatal => BridgeError::guest_fault(thrown.message.clone()),
            ThrowSeverity::Recoverable => BridgeError::conversion(thrown.message.clone()),
        };
    }
    if let Some(bridge) = err.downcast_ref::<BridgeError>() {
        return bridge.clone();
    }
    BridgeError::guest_fault(format!("guest trapped: {err}"))
}

/// Marshal Markdown → HTML options into the guest-facing object.
///
/// Smart punctuation defaults to enabled on this path; explicit settings
/// win. Unset options are omitted so the guest sees an absent key.
fn markdown_options_value(options: &MarkdownOptions) -> HostValue {
    let mut entries = vec![(
        "enable_smart_punctuation".to_string(),
        HostValue::Bool(options.enable_smart_punctuation.unwrap_or(true)),
    )];
    if let Some(url) = &options.canonical_root_url {
        entries.push(("canonical_root_url".into(), HostValue::Str(url.clone())));
    }
    if let Some(term) = &options.search_term {
        entries.push(("search_term".into(), HostValue::Str(term.clone())));
    }
    HostValue::Object(entries)
}

/// Marshal Markdown → plaintext options. No implicit defaults on this path.
fn plaintext_options_value(options: &PlaintextOptions) -> HostValue {
    let mut entries = Vec::new();
    if let Some(url) = &options.canonical_root_url {
        entries.push((
            "canonical_root_url".to_string(),
            HostValue::Str(url.clone()),
        ));
    }
    if let Some(enabled) = options.enable_smart_punctuation {
        entries.push((
            "enable_smart_punctuation".to_string(),
            HostValue::Bool(enabled),
        ));
    }
    HostValue::Object(entries)
}
