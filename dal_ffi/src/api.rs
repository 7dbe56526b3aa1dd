//! The exported C functions.
//!
//! All state lives in three places: one process-wide [`DataLayer`], one
//! process-wide [`HandleTable`], and a per-thread last-error slot. The
//! handle table is the only thing a foreign pointer can reach; raw handle
//! values are packed generation identities cast to opaque pointers, never
//! addresses, so a stale or forged pointer fails lookup instead of
//! dereferencing freed memory.
//!
//! The table lock is held only for lookups and mutations, never across a
//! blocking transfer, so calls on distinct handles proceed in parallel.

use std::cell::RefCell;
use std::os::raw::{c_char, c_int};
use std::sync::LazyLock;

use parking_lot::Mutex;
use tracing::{debug, warn};

use dal_core::registry::{HandleEntry, HandleId, HandleKind, HandleTable};
use dal_core::{DataLayer, Error};

use crate::codes::{code_name, error_code, DAL_EBADF, DAL_EINVAL, DAL_EUNAVAIL};

/// Opaque read handle as seen from C.
#[repr(C)]
pub struct dal_reader {
    _opaque: [u8; 0],
}

/// Opaque write handle as seen from C.
#[repr(C)]
pub struct dal_writer {
    _opaque: [u8; 0],
}

static LAYER: LazyLock<Option<DataLayer>> = LazyLock::new(|| match DataLayer::new() {
    Ok(layer) => Some(layer),
    Err(e) => {
        warn!(error = %e, "data layer failed to start");
        None
    }
});

static HANDLES: LazyLock<Mutex<HandleTable>> = LazyLock::new(|| Mutex::new(HandleTable::new()));

thread_local! {
    static LAST_ERROR: RefCell<Option<(c_int, String)>> = const { RefCell::new(None) };
}

fn set_last_error(e: &Error) -> c_int {
    let code = error_code(e);
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some((code, e.to_string())));
    code
}

fn layer() -> Option<&'static DataLayer> {
    let layer = LAYER.as_ref();
    if layer.is_none() {
        LAST_ERROR.with(|slot| {
            *slot.borrow_mut() = Some((DAL_EUNAVAIL, "data layer failed to start".to_string()));
        });
    }
    layer
}

/// Read a C path argument. `None` sets the last error and means "fail the
/// call with an invalid-path report".
unsafe fn path_arg<'a>(path: *const c_char) -> Option<&'a str> {
    if path.is_null() {
        set_last_error(&Error::InvalidPath("null path".into()));
        return None;
    }
    match unsafe { std::ffi::CStr::from_ptr(path) }.to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            set_last_error(&Error::InvalidPath("path is not valid UTF-8".into()));
            None
        }
    }
}

fn lookup(raw: u64, kind: HandleKind) -> Option<HandleEntry> {
    let entry = HANDLES.lock().get(HandleId::from_raw(raw))?;
    if entry.kind != kind {
        return None;
    }
    Some(entry)
}

/// Open a streaming reader for `path`.
///
/// Returns an opaque handle, or null with the thread's last error set.
#[no_mangle]
pub unsafe extern "C" fn dal_reader_open(path: *const c_char) -> *mut dal_reader {
    let Some(path) = (unsafe { path_arg(path) }) else {
        return std::ptr::null_mut();
    };
    let Some(layer) = layer() else {
        return std::ptr::null_mut();
    };

    match layer.port().open_read(path) {
        Ok(channel) => {
            let id = HANDLES.lock().insert(HandleEntry {
                kind: HandleKind::Reader,
                channel,
            });
            debug!(path, id = ?id, "reader opened");
            id.to_raw() as *mut dal_reader
        }
        Err(e) => {
            set_last_error(&e);
            std::ptr::null_mut()
        }
    }
}

/// Open a streaming writer for `path`.
///
/// Returns an opaque handle, or null with the thread's last error set.
#[no_mangle]
pub unsafe extern "C" fn dal_writer_open(path: *const c_char) -> *mut dal_writer {
    let Some(path) = (unsafe { path_arg(path) }) else {
        return std::ptr::null_mut();
    };
    let Some(layer) = layer() else {
        return std::ptr::null_mut();
    };

    match layer.port().open_write(path) {
        Ok(channel) => {
            let id = HANDLES.lock().insert(HandleEntry {
                kind: HandleKind::Writer,
                channel,
            });
            debug!(path, id = ?id, "writer opened");
            id.to_raw() as *mut dal_writer
        }
        Err(e) => {
            set_last_error(&e);
            std::ptr::null_mut()
        }
    }
}

/// Read up to `len` bytes into `buf`.
///
/// Returns the count transferred, `0` at end of stream (repeatably), or a
/// negative error code.
///
/// # Safety
/// `buf` must point to `len` writable bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn dal_reader_read(
    reader: *mut dal_reader,
    buf: *mut u8,
    len: usize,
) -> isize {
    if reader.is_null() {
        return DAL_EBADF as isize;
    }
    if buf.is_null() && len > 0 {
        return DAL_EINVAL as isize;
    }
    let Some(entry) = lookup(reader as u64, HandleKind::Reader) else {
        warn!(raw = reader as u64, "read on unknown reader handle");
        return DAL_EBADF as isize;
    };
    let Some(layer) = layer() else {
        return DAL_EUNAVAIL as isize;
    };

    let slice: &mut [u8] = if len == 0 {
        &mut []
    } else {
        unsafe { std::slice::from_raw_parts_mut(buf, len) }
    };
    match layer.port().read(entry.channel, slice) {
        Ok(n) => n as isize,
        Err(e) => set_last_error(&e) as isize,
    }
}

/// Write `len` bytes from `data`.
///
/// Returns the count accepted (possibly short), or a negative error code.
/// A zero-length write returns `0` and has no effect.
///
/// # Safety
/// `data` must point to `len` readable bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn dal_writer_write(
    writer: *mut dal_writer,
    data: *const u8,
    len: usize,
) -> isize {
    if writer.is_null() {
        return DAL_EBADF as isize;
    }
    if data.is_null() && len > 0 {
        return DAL_EINVAL as isize;
    }
    let Some(entry) = lookup(writer as u64, HandleKind::Writer) else {
        warn!(raw = writer as u64, "write on unknown writer handle");
        return DAL_EBADF as isize;
    };
    let Some(layer) = layer() else {
        return DAL_EUNAVAIL as isize;
    };

    let slice: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };
    match layer.port().write(entry.channel, slice) {
        Ok(n) => n as isize,
        Err(e) => set_last_error(&e) as isize,
    }
}

/// Finalize a writer and retire its handle.
///
/// Returns `0` on success or a negative error code. This is the durability
/// point: a failure means the object was not stored. The handle is retired
/// either way; a later `dal_writer_free` on it is a no-op.
#[no_mangle]
pub unsafe extern "C" fn dal_writer_close(writer: *mut dal_writer) -> isize {
    if writer.is_null() {
        return DAL_EBADF as isize;
    }
    let id = HandleId::from_raw(writer as u64);
    let entry = {
        let mut table = HANDLES.lock();
        match table.get(id) {
            Some(entry) if entry.kind == HandleKind::Writer => {
                table.remove(id);
                entry
            }
            Some(_) => {
                // a reader slipped in under the writer type; leave it alive
                warn!(raw = writer as u64, "writer close on a reader handle");
                return DAL_EBADF as isize;
            }
            None => return DAL_EBADF as isize,
        }
    };
    let Some(layer) = layer() else {
        return DAL_EUNAVAIL as isize;
    };

    match layer.port().close(entry.channel) {
        Ok(()) => 0,
        Err(e) => set_last_error(&e) as isize,
    }
}

fn free_handle(raw: u64, kind: HandleKind) {
    let Some(entry) = HANDLES.lock().remove(HandleId::from_raw(raw)) else {
        // remove() already logged the double free or forgery
        return;
    };
    if entry.kind != kind {
        warn!(raw, expected = ?kind, actual = ?entry.kind, "free with mismatched handle type");
    }
    let Some(layer) = layer() else {
        return;
    };
    if let Err(e) = layer.port().close(entry.channel) {
        // free is void; record the loss for dal_errno and the log
        warn!(raw, error = %e, "close during free failed");
        set_last_error(&e);
    }
}

/// Release a reader handle. Null and already-freed handles are no-ops.
#[no_mangle]
pub unsafe extern "C" fn dal_reader_free(reader: *mut dal_reader) {
    if reader.is_null() {
        return;
    }
    free_handle(reader as u64, HandleKind::Reader);
}

/// Release a writer handle, finalizing the stream.
///
/// Null and already-freed handles are no-ops. A finalize failure here is
/// logged and left in the thread's last error; callers that need the
/// verdict use `dal_writer_close` instead.
#[no_mangle]
pub unsafe extern "C" fn dal_writer_free(writer: *mut dal_writer) {
    if writer.is_null() {
        return;
    }
    free_handle(writer as u64, HandleKind::Writer);
}

/// The calling thread's last error code, or `0` if none was recorded.
#[no_mangle]
pub extern "C" fn dal_errno() -> c_int {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(0, |(code, _)| *code))
}

/// The calling thread's last error as a heap-allocated JSON C string
/// (`{"code": ..., "name": ..., "message": ...}`), or null if none was
/// recorded. Release with `dal_string_free`.
#[no_mangle]
pub extern "C" fn dal_last_error_json() -> *mut c_char {
    LAST_ERROR.with(|slot| {
        let borrowed = slot.borrow();
        let Some((code, message)) = borrowed.as_ref() else {
            return std::ptr::null_mut();
        };
        let json = serde_json::json!({
            "code": code,
            "name": code_name(*code),
            "message": message,
        })
        .to_string();
        match std::ffi::CString::new(json) {
            Ok(s) => s.into_raw(),
            Err(_) => std::ptr::null_mut(),
        }
    })
}

/// Release a string returned by `dal_last_error_json`.
///
/// # Safety
/// `s` must be null or a pointer previously returned by this library and
/// not yet freed.
#[no_mangle]
pub unsafe extern "C" fn dal_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(unsafe { std::ffi::CString::from_raw(s) });
}
