//! The import table: host functions the guest is permitted to call.
//!
//! Everything here is registered under the guest ABI's import module name.
//! The function names carry the ABI's mangling (a short hash suffix per
//! function); they are wire-format constants of the guest build this bridge
//! targets, collected in one place so retargeting a different build is a
//! single-file change.
//!
//! Guest-visible arguments are only handles and primitive numbers; host
//! values never cross the boundary directly. A host function that fails
//! returns an error, which unwinds the guest call as a trap carrying the
//! typed payload; the entry-point wrappers downcast and classify it.

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::info;
use wasmtime::{Caller, Linker};

use vellum_common::{BridgeError, GuestThrow};
use vellum_core::value::{debug_string, loose_eq};
use vellum_core::{BridgeState, HostValue};

use crate::marshal::{
    guest_views, pass_str_to_guest, property_key, read_guest_str, write_str_out,
};

/// The import module name the guest links against.
pub const IMPORT_MODULE: &str = "__wbindgen_placeholder__";

/// Register the complete host function catalogue on a linker.
///
/// # Errors
///
/// Returns an error if function registration fails (e.g. a duplicate
/// definition on the same linker).
pub fn register_all(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    register_object_builders(linker)?;
    register_property_access(linker)?;
    register_primitives(linker)?;
    register_typed_arrays(linker)?;
    register_scope_probes(linker)?;
    register_randomness(linker)?;
    register_diagnostics(linker)?;
    register_lifecycle(linker)?;
    Ok(())
}

fn register_error(name: &str, err: &wasmtime::Error) -> BridgeError {
    BridgeError::invalid_config(format!("failed to register {name}: {err}"))
}

/// Object and array construction and mutation.
///
/// The keyed/indexed setters take ownership of the key and value handles,
/// matching the ABI: the guest hands values over and never frees them.
pub fn register_object_builders(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_new_72fb9a18b5ae2624",
            |mut caller: Caller<'_, BridgeState>| -> u32 {
                caller.data_mut().heap.put(HostValue::Object(Vec::new()))
            },
        )
        .map_err(|e| register_error("object constructor", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_new_16b304a2cfa7ff4a",
            |mut caller: Caller<'_, BridgeState>| -> u32 {
                caller.data_mut().heap.put(HostValue::Array(Vec::new()))
            },
        )
        .map_err(|e| register_error("array constructor", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_set_f975102236d3c502",
            |mut caller: Caller<'_, BridgeState>,
             obj: u32,
             key: u32,
             value: u32|
             -> Result<(), wasmtime::Error> {
                let state = caller.data_mut();
                let key = state.heap.take(key)?;
                let value = state.heap.take(value)?;
                let key = property_key(&key)?;
                state.heap.get_mut(obj)?.set_property(key, value)?;
                Ok(())
            },
        )
        .map_err(|e| register_error("keyed setter", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_set_d4638f722068f043",
            |mut caller: Caller<'_, BridgeState>,
             arr: u32,
             index: u32,
             value: u32|
             -> Result<(), wasmtime::Error> {
                let state = caller.data_mut();
                let value = state.heap.take(value)?;
                state.heap.get_mut(arr)?.set_index(index, value)?;
                Ok(())
            },
        )
        .map_err(|e| register_error("indexed setter", &e))?;

    Ok(())
}

/// Property lookup, membership and type tests.
pub fn register_property_access(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_getwithrefkey_edc2c8960f0f1191",
            |mut caller: Caller<'_, BridgeState>,
             obj: u32,
             key: u32|
             -> Result<u32, wasmtime::Error> {
                let state = caller.data_mut();
                let key = state.heap.get(key)?.clone();
                let value = state.heap.get(obj)?.property(&key);
                Ok(state.heap.put(value))
            },
        )
        .map_err(|e| register_error("property getter", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_in",
            |caller: Caller<'_, BridgeState>, key: u32, obj: u32| -> Result<u32, wasmtime::Error> {
                let heap = &caller.data().heap;
                let key = heap.get(key)?;
                Ok(u32::from(heap.get(obj)?.has_property(key)))
            },
        )
        .map_err(|e| register_error("membership test", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_is_object",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                Ok(u32::from(caller.data().heap.get(handle)?.is_object_like()))
            },
        )
        .map_err(|e| register_error("object test", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_is_undefined",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                Ok(u32::from(matches!(
                    caller.data().heap.get(handle)?,
                    HostValue::Undefined
                )))
            },
        )
        .map_err(|e| register_error("undefined test", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_is_string",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                Ok(u32::from(matches!(
                    caller.data().heap.get(handle)?,
                    HostValue::Str(_)
                )))
            },
        )
        .map_err(|e| register_error("string test", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_is_function",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                // Functions never cross this bridge.
                caller.data().heap.get(handle)?;
                Ok(0)
            },
        )
        .map_err(|e| register_error("function test", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_boolean_get",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                // 0 = false, 1 = true, 2 = not a boolean.
                Ok(match caller.data().heap.get(handle)? {
                    HostValue::Bool(b) => u32::from(*b),
                    _ => 2,
                })
            },
        )
        .map_err(|e| register_error("boolean extraction", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_number_get",
            |mut caller: Caller<'_, BridgeState>,
             retptr: u32,
             handle: u32|
             -> Result<(), wasmtime::Error> {
                let number = match caller.data().heap.get(handle)? {
                    HostValue::Number(n) => Some(*n),
                    _ => None,
                };
                let views = guest_views(&mut caller)?;
                views.write_f64(&mut caller, retptr + 8, number.unwrap_or(0.0))?;
                views.write_i32(&mut caller, retptr, i32::from(number.is_some()))?;
                Ok(())
            },
        )
        .map_err(|e| register_error("number extraction", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_string_get",
            |mut caller: Caller<'_, BridgeState>,
             retptr: u32,
             handle: u32|
             -> Result<(), wasmtime::Error> {
                let text = match caller.data().heap.get(handle)? {
                    HostValue::Str(s) => Some(s.clone()),
                    _ => None,
                };
                let (ptr, len) = match text {
                    Some(text) => pass_str_to_guest(&mut caller, &text)?,
                    None => (0, 0),
                };
                write_str_out(&mut caller, retptr, ptr, len)?;
                Ok(())
            },
        )
        .map_err(|e| register_error("string extraction", &e))?;

    Ok(())
}

/// Primitive construction and comparison.
pub fn register_primitives(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_string_new",
            |mut caller: Caller<'_, BridgeState>,
             ptr: u32,
             len: u32|
             -> Result<u32, wasmtime::Error> {
                let text = read_guest_str(&mut caller, ptr, len)?;
                Ok(caller.data_mut().heap.put(HostValue::Str(text)))
            },
        )
        .map_err(|e| register_error("string constructor", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_number_new",
            |mut caller: Caller<'_, BridgeState>, value: f64| -> u32 {
                caller.data_mut().heap.put(HostValue::Number(value))
            },
        )
        .map_err(|e| register_error("number constructor", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_error_new",
            |mut caller: Caller<'_, BridgeState>,
             ptr: u32,
             len: u32|
             -> Result<u32, wasmtime::Error> {
                let message = read_guest_str(&mut caller, ptr, len)?;
                Ok(caller.data_mut().heap.put(HostValue::Error(message)))
            },
        )
        .map_err(|e| register_error("error constructor", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_jsval_loose_eq",
            |caller: Caller<'_, BridgeState>, a: u32, b: u32| -> Result<u32, wasmtime::Error> {
                if a == b {
                    // Same slot: reference equality.
                    return Ok(1);
                }
                let heap = &caller.data().heap;
                Ok(u32::from(loose_eq(heap.get(a)?, heap.get(b)?)))
            },
        )
        .map_err(|e| register_error("loose equality", &e))?;

    Ok(())
}

/// Typed-array bridging: `Uint8Array` views over guest memory, host-owned
/// byte buffers, and the copies between them.
pub fn register_typed_arrays(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_memory",
            |mut caller: Caller<'_, BridgeState>| -> u32 {
                caller.data_mut().heap.put(HostValue::Memory)
            },
        )
        .map_err(|e| register_error("memory getter", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_buffer_12d079cc21e14bdb",
            |mut caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                let state = caller.data_mut();
                match state.heap.get(handle)? {
                    HostValue::Memory => {}
                    other => {
                        return Err(BridgeError::marshalling(format!(
                            "buffer getter expects a memory object, got {}",
                            other.type_name()
                        ))
                        .into());
                    }
                }
                Ok(state.heap.put(HostValue::Buffer))
            },
        )
        .map_err(|e| register_error("buffer getter", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_new_63b92bc8671ed464",
            |mut caller: Caller<'_, BridgeState>, source: u32| -> Result<u32, wasmtime::Error> {
                let views = guest_views(&mut caller)?;
                let mem_len = views.len(&caller) as u32;
                let value = match caller.data().heap.get(source)?.clone() {
                    // A view over the whole backing buffer.
                    HostValue::Buffer => HostValue::View {
                        ptr: 0,
                        len: mem_len,
                    },
                    HostValue::Bytes(bytes) => HostValue::Bytes(bytes),
                    HostValue::View { ptr, len } => {
                        HostValue::Bytes(views.read_bytes(&caller, ptr, len)?.to_vec())
                    }
                    other => {
                        return Err(BridgeError::marshalling(format!(
                            "cannot construct byte view from {}",
                            other.type_name()
                        ))
                        .into());
                    }
                };
                Ok(caller.data_mut().heap.put(value))
            },
        )
        .map_err(|e| register_error("byte view constructor", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_newwithlength_e9b4878cebadb3d3",
            |mut caller: Caller<'_, BridgeState>, len: u32| -> u32 {
                caller
                    .data_mut()
                    .heap
                    .put(HostValue::Bytes(vec![0; len as usize]))
            },
        )
        .map_err(|e| register_error("sized byte buffer constructor", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_subarray_a1f73cd4b5b42fe1",
            |mut caller: Caller<'_, BridgeState>,
             handle: u32,
             start: u32,
             end: u32|
             -> Result<u32, wasmtime::Error> {
                let state = caller.data_mut();
                let value = match state.heap.get(handle)? {
                    HostValue::View { ptr, len } => {
                        let end = end.min(*len);
                        let start = start.min(end);
                        HostValue::View {
                            ptr: ptr + start,
                            len: end - start,
                        }
                    }
                    HostValue::Bytes(bytes) => {
                        let end = (end as usize).min(bytes.len());
                        let start = (start as usize).min(end);
                        HostValue::Bytes(bytes[start..end].to_vec())
                    }
                    other => {
                        return Err(BridgeError::marshalling(format!(
                            "subarray expects a byte view, got {}",
                            other.type_name()
                        ))
                        .into());
                    }
                };
                Ok(state.heap.put(value))
            },
        )
        .map_err(|e| register_error("subarray", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_length_c20a40f15020d68a",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                Ok(match caller.data().heap.get(handle)? {
                    HostValue::View { len, .. } => *len,
                    HostValue::Bytes(bytes) => bytes.len() as u32,
                    HostValue::Array(items) => items.len() as u32,
                    HostValue::Str(s) => s.encode_utf16().count() as u32,
                    other => {
                        return Err(BridgeError::marshalling(format!(
                            "length of {} is undefined",
                            other.type_name()
                        ))
                        .into());
                    }
                })
            },
        )
        .map_err(|e| register_error("length getter", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_set_a47bac70306a19a7",
            |mut caller: Caller<'_, BridgeState>,
             dst: u32,
             src: u32,
             offset: u32|
             -> Result<(), wasmtime::Error> {
                let views = guest_views(&mut caller)?;
                let data: Vec<u8> = match caller.data().heap.get(src)? {
                    HostValue::Bytes(bytes) => bytes.clone(),
                    HostValue::View { ptr, len } => views.read_bytes(&caller, *ptr, *len)?.to_vec(),
                    other => {
                        return Err(BridgeError::marshalling(format!(
                            "byte copy source must be a byte view, got {}",
                            other.type_name()
                        ))
                        .into());
                    }
                };
                match caller.data().heap.get(dst)?.clone() {
                    HostValue::View { ptr, len } => {
                        let within = offset
                            .checked_add(data.len() as u32)
                            .is_some_and(|end| end <= len);
                        if !within {
                            return Err(
                                BridgeError::marshalling("byte copy out of view bounds").into()
                            );
                        }
                        views.write_bytes(&mut caller, ptr + offset, &data)?;
                    }
                    HostValue::Bytes(_) => {
                        let state = caller.data_mut();
                        let HostValue::Bytes(buffer) = state.heap.get_mut(dst)? else {
                            unreachable!()
                        };
                        let start = offset as usize;
                        let end = start.checked_add(data.len()).filter(|e| *e <= buffer.len());
                        let Some(end) = end else {
                            return Err(
                                BridgeError::marshalling("byte copy out of buffer bounds").into()
                            );
                        };
                        buffer[start..end].copy_from_slice(&data);
                    }
                    other => {
                        return Err(BridgeError::marshalling(format!(
                            "byte copy target must be a byte view, got {}",
                            other.type_name()
                        ))
                        .into());
                    }
                }
                Ok(())
            },
        )
        .map_err(|e| register_error("byte copy", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_instanceof_Uint8Array_2b3bbecd033d19f6",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                Ok(u32::from(matches!(
                    caller.data().heap.get(handle)?,
                    HostValue::Bytes(_) | HostValue::View { .. }
                )))
            },
        )
        .map_err(|e| register_error("Uint8Array instanceof", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_instanceof_ArrayBuffer_836825be07d4c9d2",
            |caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                Ok(u32::from(matches!(
                    caller.data().heap.get(handle)?,
                    HostValue::Buffer
                )))
            },
        )
        .map_err(|e| register_error("ArrayBuffer instanceof", &e))?;

    Ok(())
}

/// Environment probing.
///
/// The guest sniffs its surroundings to pick a randomness source:
/// `self`/`window`/`globalThis`/`global` all resolve to the scope sentinel,
/// and the process-related probes resolve to `undefined` so the guest always
/// takes the web-style `crypto.getRandomValues` path.
pub fn register_scope_probes(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    for name in [
        "__wbg_self_ce0dbfc45cf2f5be",
        "__wbg_window_c6fb939a7f436783",
        "__wbg_globalThis_d1e6af4856ba331b",
        "__wbg_global_207b558942527489",
    ] {
        linker
            .func_wrap(
                IMPORT_MODULE,
                name,
                |mut caller: Caller<'_, BridgeState>| -> u32 {
                    caller.data_mut().heap.put(HostValue::Scope)
                },
            )
            .map_err(|e| register_error("scope probe", &e))?;
    }

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_crypto_1d1f22824a6a080c",
            |mut caller: Caller<'_, BridgeState>, scope: u32| -> Result<u32, wasmtime::Error> {
                let state = caller.data_mut();
                let value = match state.heap.get(scope)? {
                    HostValue::Scope => HostValue::Crypto,
                    _ => HostValue::Undefined,
                };
                Ok(state.heap.put(value))
            },
        )
        .map_err(|e| register_error("crypto probe", &e))?;

    for name in [
        "__wbg_process_4a72847cc503995b",
        "__wbg_versions_f686565e586dd935",
        "__wbg_node_104a2ff8d6ea03a2",
        "__wbg_msCrypto_eb05e62b530a1508",
    ] {
        linker
            .func_wrap(
                IMPORT_MODULE,
                name,
                |mut caller: Caller<'_, BridgeState>, _handle: u32| -> u32 {
                    caller.data_mut().heap.put(HostValue::Undefined)
                },
            )
            .map_err(|e| register_error("environment probe", &e))?;
    }

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_require_cca90b1a94a0255b",
            |mut caller: Caller<'_, BridgeState>| -> u32 {
                caller.data_mut().heap.put(HostValue::Undefined)
            },
        )
        .map_err(|e| register_error("require probe", &e))?;

    Ok(())
}

/// Cryptographic randomness.
pub fn register_randomness(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_getRandomValues_3aa56aa6edec874c",
            |mut caller: Caller<'_, BridgeState>,
             _crypto: u32,
             target: u32|
             -> Result<(), wasmtime::Error> {
                fill_random(&mut caller, target)?;
                Ok(())
            },
        )
        .map_err(|e| register_error("getRandomValues", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_randomFillSync_5c9c955aa56b6049",
            |mut caller: Caller<'_, BridgeState>,
             _crypto: u32,
             target: u32|
             -> Result<(), wasmtime::Error> {
                // This entry takes ownership of the target handle.
                fill_random(&mut caller, target)?;
                caller.data_mut().heap.take(target)?;
                Ok(())
            },
        )
        .map_err(|e| register_error("randomFillSync", &e))?;

    Ok(())
}

fn fill_random(caller: &mut Caller<'_, BridgeState>, target: u32) -> Result<(), BridgeError> {
    match caller.data().heap.get(target)?.clone() {
        HostValue::View { ptr, len } => {
            let mut buffer = vec![0u8; len as usize];
            OsRng.fill_bytes(&mut buffer);
            let views = guest_views(caller)?;
            views.write_bytes(caller, ptr, &buffer)?;
        }
        HostValue::Bytes(_) => {
            let state = caller.data_mut();
            let HostValue::Bytes(buffer) = state.heap.get_mut(target)? else {
                unreachable!()
            };
            OsRng.fill_bytes(buffer);
        }
        other => {
            return Err(BridgeError::marshalling(format!(
                "randomness target must be a byte view, got {}",
                other.type_name()
            )));
        }
    }
    Ok(())
}

/// Diagnostics: guest logging and host-side value formatting.
///
/// Guest log lines are re-emitted through `tracing` and captured in
/// [`BridgeState::logs`] so embedders can inspect them after a call.
pub fn register_diagnostics(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbg_log_24068652cee20220",
            |mut caller: Caller<'_, BridgeState>,
             ptr: u32,
             len: u32|
             -> Result<(), wasmtime::Error> {
                let message = read_guest_str(&mut caller, ptr, len)?;
                info!(guest_log = true, "{}", message);
                caller.data_mut().log(message);
                Ok(())
            },
        )
        .map_err(|e| register_error("guest log", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_debug_string",
            |mut caller: Caller<'_, BridgeState>,
             retptr: u32,
             handle: u32|
             -> Result<(), wasmtime::Error> {
                let rendered = debug_string(caller.data().heap.get(handle)?);
                let (ptr, len) = pass_str_to_guest(&mut caller, &rendered)?;
                write_str_out(&mut caller, retptr, ptr, len)?;
                Ok(())
            },
        )
        .map_err(|e| register_error("debug string", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_throw",
            |mut caller: Caller<'_, BridgeState>,
             ptr: u32,
             len: u32|
             -> Result<(), wasmtime::Error> {
                let message = read_guest_str(&mut caller, ptr, len)?;
                Err(GuestThrow { message }.into())
            },
        )
        .map_err(|e| register_error("throw", &e))?;

    Ok(())
}

/// Handle lifecycle: explicit drop and duplication.
pub fn register_lifecycle(linker: &mut Linker<BridgeState>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_object_drop_ref",
            |mut caller: Caller<'_, BridgeState>, handle: u32| -> Result<(), wasmtime::Error> {
                caller.data_mut().heap.take(handle)?;
                Ok(())
            },
        )
        .map_err(|e| register_error("drop ref", &e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "__wbindgen_object_clone_ref",
            |mut caller: Caller<'_, BridgeState>, handle: u32| -> Result<u32, wasmtime::Error> {
                Ok(caller.data_mut().heap.clone_handle(handle)?)
            },
        )
        .map_err(|e| register_error("clone ref", &e))?;

    Ok(())
}
