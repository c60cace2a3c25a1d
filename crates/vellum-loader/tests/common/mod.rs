//! Shared fixtures for the loader test suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use url::Url;

use vellum_common::{FetchError, RetryConfig};
use vellum_loader::Fetch;

/// A scripted transport: pops queued responses, then falls back.
pub struct FakeFetcher {
    responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
    fallback: Option<Vec<u8>>,
    calls: AtomicU32,
}

impl FakeFetcher {
    /// Answer with the queued responses in order, then fail.
    pub fn scripted(responses: Vec<Result<Vec<u8>, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Answer with the queued responses in order, then `fallback` forever.
    pub fn scripted_then(
        responses: Vec<Result<Vec<u8>, FetchError>>,
        fallback: Vec<u8>,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: Some(fallback),
            calls: AtomicU32::new(0),
        }
    }

    /// Always answer with the same bytes.
    pub fn always_ok(bytes: Vec<u8>) -> Self {
        Self::scripted_then(Vec::new(), bytes)
    }

    /// Always fail with a connection error.
    pub fn always_failing() -> Self {
        Self::scripted(Vec::new())
    }

    /// Number of fetch calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        match &self.fallback {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(FetchError::Request {
                url: url.to_string(),
                message: "connection refused".into(),
            }),
        }
    }
}

/// A retry policy that does not sleep, for fast tests.
pub fn zero_backoff() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
    }
}

/// A stand-in guest implementing the full export surface the bridge needs.
///
/// Behavior, chosen to exercise every outcome of the entry wrappers:
/// - `markdown_to_html`: empty input → `{errors: ["empty document"]}`;
///   one-byte input → throws "bad options"; otherwise a result object
///   echoing the input as `html` with empty headings and fixed statistics.
/// - `markdown_to_plaintext`: echoes the input through the return slot.
/// - `mjml_to_html`: empty input → throws "invalid mjml"; otherwise echoes.
pub const STUB_GUEST_WAT: &str = r#"
    (module
        (import "__wbindgen_placeholder__" "__wbg_new_72fb9a18b5ae2624"
            (func $new_object (result i32)))
        (import "__wbindgen_placeholder__" "__wbg_new_16b304a2cfa7ff4a"
            (func $new_array (result i32)))
        (import "__wbindgen_placeholder__" "__wbg_set_f975102236d3c502"
            (func $object_set (param i32 i32 i32)))
        (import "__wbindgen_placeholder__" "__wbg_set_d4638f722068f043"
            (func $array_set (param i32 i32 i32)))
        (import "__wbindgen_placeholder__" "__wbindgen_string_new"
            (func $string_new (param i32 i32) (result i32)))
        (import "__wbindgen_placeholder__" "__wbindgen_number_new"
            (func $number_new (param f64) (result i32)))
        (import "__wbindgen_placeholder__" "__wbindgen_object_drop_ref"
            (func $drop_ref (param i32)))
        (import "__wbindgen_placeholder__" "__wbindgen_throw"
            (func $throw (param i32 i32)))

        (memory (export "memory") 1)

        (data (i32.const 16) "html")
        (data (i32.const 24) "headings")
        (data (i32.const 36) "statistics")
        (data (i32.const 48) "reading_time")
        (data (i32.const 64) "word_count")
        (data (i32.const 80) "errors")
        (data (i32.const 88) "empty document")
        (data (i32.const 104) "bad options")
        (data (i32.const 120) "invalid mjml")

        (global $sp (mut i32) (i32.const 512))
        (global $hp (mut i32) (i32.const 1024))

        (func (export "__wbindgen_add_to_stack_pointer")
                (param $delta i32) (result i32)
            (global.set $sp (i32.add (global.get $sp) (local.get $delta)))
            (global.get $sp))

        (func $reserve
            (block $done
                (loop $more
                    (br_if $done
                        (i32.le_u (global.get $hp)
                                  (i32.mul (memory.size) (i32.const 65536))))
                    (drop (memory.grow (i32.const 1)))
                    (br $more))))

        (func $malloc (export "__wbindgen_malloc")
                (param $size i32) (param $align i32) (result i32)
            (local $ptr i32)
            (local.set $ptr (global.get $hp))
            (global.set $hp
                (i32.and
                    (i32.add (i32.add (global.get $hp) (local.get $size))
                             (i32.const 7))
                    (i32.const -8)))
            (call $reserve)
            (local.get $ptr))

        (func (export "__wbindgen_realloc")
                (param $ptr i32) (param $old i32) (param $new i32)
                (param $align i32) (result i32)
            (local $dst i32)
            (if (result i32) (i32.le_u (local.get $new) (local.get $old))
                (then (local.get $ptr))
                (else
                    (local.set $dst
                        (call $malloc (local.get $new) (local.get $align)))
                    (memory.copy (local.get $dst) (local.get $ptr) (local.get $old))
                    (local.get $dst))))

        (func (export "__wbindgen_free") (param i32 i32 i32))

        (func (export "markdown_to_html")
                (param $ptr i32) (param $len i32) (param $opts i32) (result i32)
            (local $obj i32) (local $inner i32)
            (call $drop_ref (local.get $opts))
            (if (i32.eqz (local.get $len))
                (then
                    (local.set $obj (call $new_object))
                    (local.set $inner (call $new_array))
                    (call $array_set (local.get $inner) (i32.const 0)
                        (call $string_new (i32.const 88) (i32.const 14)))
                    (call $object_set (local.get $obj)
                        (call $string_new (i32.const 80) (i32.const 6))
                        (local.get $inner))
                    (return (local.get $obj))))
            (if (i32.eq (local.get $len) (i32.const 1))
                (then (call $throw (i32.const 104) (i32.const 11))))
            (local.set $obj (call $new_object))
            (call $object_set (local.get $obj)
                (call $string_new (i32.const 16) (i32.const 4))
                (call $string_new (local.get $ptr) (local.get $len)))
            (call $object_set (local.get $obj)
                (call $string_new (i32.const 24) (i32.const 8))
                (call $new_array))
            (local.set $inner (call $new_object))
            (call $object_set (local.get $inner)
                (call $string_new (i32.const 48) (i32.const 12))
                (call $number_new (f64.const 1)))
            (call $object_set (local.get $inner)
                (call $string_new (i32.const 64) (i32.const 10))
                (call $number_new (f64.const 2)))
            (call $object_set (local.get $obj)
                (call $string_new (i32.const 36) (i32.const 10))
                (local.get $inner))
            (local.get $obj))

        (func (export "markdown_to_plaintext")
                (param $retptr i32) (param $ptr i32) (param $len i32)
                (param $opts i32)
            (call $drop_ref (local.get $opts))
            (i32.store (local.get $retptr) (local.get $ptr))
            (i32.store (i32.add (local.get $retptr) (i32.const 4))
                       (local.get $len)))

        (func (export "mjml_to_html")
                (param $retptr i32) (param $ptr i32) (param $len i32)
            (if (i32.eqz (local.get $len))
                (then (call $throw (i32.const 120) (i32.const 12))))
            (i32.store (local.get $retptr) (local.get $ptr))
            (i32.store (i32.add (local.get $retptr) (i32.const 4))
                       (local.get $len)))
    )
"#;

/// Assemble the stand-in guest to binary form.
pub fn stub_guest_wasm() -> Vec<u8> {
    wat::parse_str(STUB_GUEST_WAT).expect("stub guest WAT should assemble")
}

/// Write the stand-in guest next to a temp dir and return its file URL.
pub fn stub_guest_file(dir: &std::path::Path) -> Url {
    let path = dir.join("stub_guest.wasm");
    std::fs::write(&path, stub_guest_wasm()).unwrap();
    Url::from_file_path(&path).unwrap()
}
