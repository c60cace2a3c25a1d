//! Integration tests driving the import catalogue from real guest code.
//!
//! A small WAT guest imports the catalogue and exercises it the way the
//! production guest does: building result objects through handles, passing
//! strings in both directions (including the host calling back into the
//! guest allocator mid-import), logging, randomness, and throwing.

use serde_json::json;
use wasmtime::{Linker, Store};

use vellum_common::{EngineConfig, GuestThrow};
use vellum_core::{
    BridgeState, CompiledModule, HostValue, MemoryViews, WasmEngine, codec, create_store,
};
use vellum_host::register_all;

const DRIVER_WAT: &str = r#"
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
        (import "__wbindgen_placeholder__" "__wbindgen_string_get"
            (func $string_get (param i32 i32)))
        (import "__wbindgen_placeholder__" "__wbg_log_24068652cee20220"
            (func $log (param i32 i32)))
        (import "__wbindgen_placeholder__" "__wbindgen_object_drop_ref"
            (func $drop_ref (param i32)))
        (import "__wbindgen_placeholder__" "__wbg_newwithlength_e9b4878cebadb3d3"
            (func $new_with_length (param i32) (result i32)))
        (import "__wbindgen_placeholder__" "__wbg_self_ce0dbfc45cf2f5be"
            (func $probe_self (result i32)))
        (import "__wbindgen_placeholder__" "__wbg_crypto_1d1f22824a6a080c"
            (func $probe_crypto (param i32) (result i32)))
        (import "__wbindgen_placeholder__" "__wbg_getRandomValues_3aa56aa6edec874c"
            (func $get_random_values (param i32 i32)))
        (import "__wbindgen_placeholder__" "__wbindgen_throw"
            (func $throw (param i32 i32)))

        (memory (export "memory") 1)

        (data (i32.const 16) "html")
        (data (i32.const 24) "<p>hi</p>")
        (data (i32.const 40) "headings")
        (data (i32.const 56) "Hello")
        (data (i32.const 64) "word_count")
        (data (i32.const 80) "from guest")
        (data (i32.const 96) "boom")

        (global $hp (mut i32) (i32.const 1024))

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

        ;; Builds { html: "<p>hi</p>", headings: ["Hello"], word_count: 42 }
        ;; the way the production guest builds its result object.
        (func (export "build_result") (result i32)
            (local $obj i32) (local $arr i32)
            (local.set $obj (call $new_object))
            (call $object_set (local.get $obj)
                (call $string_new (i32.const 16) (i32.const 4))
                (call $string_new (i32.const 24) (i32.const 9)))
            (local.set $arr (call $new_array))
            (call $array_set (local.get $arr) (i32.const 0)
                (call $string_new (i32.const 56) (i32.const 5)))
            (call $object_set (local.get $obj)
                (call $string_new (i32.const 40) (i32.const 8))
                (local.get $arr))
            (call $object_set (local.get $obj)
                (call $string_new (i32.const 64) (i32.const 10))
                (call $number_new (f64.const 42)))
            (local.get $obj))

        ;; Asks the host to write a heap string back into guest memory.
        (func (export "echo_through_heap") (param $retptr i32) (param $handle i32)
            (call $string_get (local.get $retptr) (local.get $handle)))

        (func (export "emit_log")
            (call $log (i32.const 80) (i32.const 10)))

        (func (export "drop_handle") (param $handle i32)
            (call $drop_ref (local.get $handle)))

        (func (export "random_bytes") (result i32)
            (local $arr i32)
            (local.set $arr (call $new_with_length (i32.const 16)))
            (call $get_random_values
                (call $probe_crypto (call $probe_self))
                (local.get $arr))
            (local.get $arr))

        (func (export "explode")
            (call $throw (i32.const 96) (i32.const 4)))
    )
"#;

fn instantiate() -> (Store<BridgeState>, wasmtime::Instance) {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), DRIVER_WAT).unwrap();

    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker).unwrap();

    let mut store = create_store(&engine);
    let instance = linker.instantiate(&mut store, module.module()).unwrap();
    (store, instance)
}

#[test]
fn test_guest_builds_result_object() {
    let (mut store, instance) = instantiate();

    let build = instance
        .get_typed_func::<(), u32>(&mut store, "build_result")
        .unwrap();
    let handle = build.call(&mut store, ()).unwrap();

    let value = store.data_mut().heap.take(handle).unwrap();
    assert_eq!(
        value.into_json().unwrap(),
        json!({
            "html": "<p>hi</p>",
            "headings": ["Hello"],
            "word_count": 42,
        })
    );

    // Every intermediate handle was consumed by the setters.
    assert_eq!(store.data().heap.live_count(), 4);
}

#[test]
fn test_string_roundtrip_through_string_get() {
    let (mut store, instance) = instantiate();

    let handle = store
        .data_mut()
        .heap
        .put(HostValue::Str("wasm says héllo 🌍".into()));

    let echo = instance
        .get_typed_func::<(u32, u32), ()>(&mut store, "echo_through_heap")
        .unwrap();

    // Return area below the guest's heap base.
    let retptr = 256u32;
    echo.call(&mut store, (retptr, handle)).unwrap();

    let memory = instance.get_memory(&mut store, "memory").unwrap();
    let views = MemoryViews::new(memory);
    let ptr = views.read_i32(&store, retptr).unwrap() as u32;
    let len = views.read_i32(&store, retptr + 4).unwrap() as u32;

    let decoded = codec::decode(&store, &views, ptr, len).unwrap();
    assert_eq!(decoded, "wasm says héllo 🌍");
}

#[test]
fn test_guest_log_is_captured() {
    let (mut store, instance) = instantiate();

    let emit = instance
        .get_typed_func::<(), ()>(&mut store, "emit_log")
        .unwrap();
    emit.call(&mut store, ()).unwrap();

    let logs = &store.data().logs;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "from guest");
}

#[test]
fn test_guest_drop_frees_slot() {
    let (mut store, instance) = instantiate();

    let handle = store.data_mut().heap.put(HostValue::Number(7.0));
    assert_eq!(store.data().heap.live_count(), 5);

    let drop_handle = instance
        .get_typed_func::<u32, ()>(&mut store, "drop_handle")
        .unwrap();
    drop_handle.call(&mut store, handle).unwrap();

    assert_eq!(store.data().heap.live_count(), 4);
}

#[test]
fn test_randomness_fills_buffer() {
    let (mut store, instance) = instantiate();

    let random = instance
        .get_typed_func::<(), u32>(&mut store, "random_bytes")
        .unwrap();
    let handle = random.call(&mut store, ()).unwrap();

    let value = store.data_mut().heap.take(handle).unwrap();
    let HostValue::Bytes(bytes) = value else {
        panic!("expected a byte buffer, got {value:?}");
    };
    assert_eq!(bytes.len(), 16);
}

#[test]
fn test_guest_throw_carries_typed_payload() {
    let (mut store, instance) = instantiate();

    let explode = instance
        .get_typed_func::<(), ()>(&mut store, "explode")
        .unwrap();
    let err = explode.call(&mut store, ()).unwrap_err();

    let thrown = err
        .downcast_ref::<GuestThrow>()
        .expect("trap should carry the guest throw payload");
    assert_eq!(thrown.message, "boom");
}
