//! C-compatible FFI API for embedding the requisition renderer.
//!
//! # ABI Contract
//!
//! All exported functions use the `extern "C"` calling convention and
//! `#[no_mangle]` so symbol names are stable. `include/reqforge.h` is
//! generated from this file at build time.
//!
//! ## Memory management
//! - Buffers and strings returned by `rqf_*` functions live on the Rust heap.
//! - Callers **must** free them with `rqf_free_buffer` / `rqf_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `rqf_last_error`.
//!
//! ## Thread safety
//! - Every render works on its own in-memory store, and `rqf_last_error` is
//!   thread-local, so calls may be made from any number of threads.
//!
//! ## Usage from C
//! ```c
//! #include "reqforge.h"
//! uint8_t *pdf; uint32_t len;
//! if (rqf_render_requisition(json, strlen(json), NULL, &pdf, &len) == 0) {
//!     fwrite(pdf, 1, len, out);
//!     rqf_free_buffer(pdf, len);
//! }
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;
use std::sync::Arc;

use crate::error::{ForgeError, Result};
use crate::ledger::bucket_key;
use crate::merge::MergePipeline;
use crate::pipeline::{PageOrientation, PipelineConfig};
use crate::record::from_json_str;
use crate::store::{FileStore, MemoryFileStore};
use crate::template::{TemplateRegistry, REQUISITION_TEMPLATE};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

// Return codes.
const RQF_OK: c_int = 0;
const RQF_NULL_ARGUMENT: c_int = 1;
const RQF_INVALID_UTF8: c_int = 2;
const RQF_INVALID_RECORD: c_int = 3;
const RQF_RENDER_FAILED: c_int = 4;

// ---------------------------------------------------------------------------
// C-compatible configuration types
// ---------------------------------------------------------------------------

#[repr(C)]
pub enum RqfPageOrientation {
    Portrait = 0,
    Landscape = 1,
}

/// Optional page settings. Fields set to `0` fall back to the A4 defaults
/// (595.28 × 841.89 pt, 40 pt margin).
#[repr(C)]
pub struct RqfRenderConfig {
    pub page_width: f32,
    pub page_height: f32,
    pub page_margin: f32,
    pub orientation: RqfPageOrientation,
}

fn pipeline_config_from_c(cfg: Option<&RqfRenderConfig>) -> PipelineConfig {
    let defaults = PipelineConfig::default();
    let Some(cfg) = cfg else {
        return defaults;
    };
    let or_default = |v: f32, d: f32| if v > 0.0 { v } else { d };
    PipelineConfig {
        page_width: or_default(cfg.page_width, defaults.page_width),
        page_height: or_default(cfg.page_height, defaults.page_height),
        page_margin: or_default(cfg.page_margin, defaults.page_margin),
        orientation: match cfg.orientation {
            RqfPageOrientation::Portrait => PageOrientation::Portrait,
            RqfPageOrientation::Landscape => PageOrientation::Landscape,
        },
        ..defaults
    }
}

/// Merge a record into `template` in a private in-memory store and return
/// the PDF bytes.
fn render_record(template: &str, record_json: &str, config: PipelineConfig) -> Result<Vec<u8>> {
    let record = from_json_str(record_json)?;
    let store = Arc::new(MemoryFileStore::new());
    let registry = TemplateRegistry::register(store.clone(), template, "template")?;
    let outcome = MergePipeline::new(registry, config).render(&record, "Requisition")?;
    store.read(&outcome.file.id)
}

/// # Safety
/// `ptr` must point to `len` readable bytes.
unsafe fn str_arg<'a>(ptr: *const u8, len: u32) -> std::result::Result<&'a str, c_int> {
    let bytes = slice::from_raw_parts(ptr, len as usize);
    std::str::from_utf8(bytes).map_err(|e| {
        set_last_error(&format!("invalid UTF-8: {e}"));
        RQF_INVALID_UTF8
    })
}

/// # Safety
/// `out_buf` and `out_len` must be valid for writes.
unsafe fn hand_out(result: Result<Vec<u8>>, out_buf: *mut *mut u8, out_len: *mut u32) -> c_int {
    match result {
        Ok(bytes) => {
            let len = bytes.len() as u32;
            *out_buf = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
            *out_len = len;
            RQF_OK
        }
        Err(e) => {
            set_last_error(&e.to_string());
            match e {
                ForgeError::InvalidRecord(_) => RQF_INVALID_RECORD,
                _ => RQF_RENDER_FAILED,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Render a JSON requisition record with the built-in template.
///
/// # Parameters
/// - `record_ptr`, `record_len`: UTF-8 JSON (not necessarily null-terminated)
/// - `config`: page settings, or `NULL` for A4 portrait
/// - `out_buf`, `out_len`: on success, the PDF bytes
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `rqf_last_error`.
///
/// # Safety
/// - `record_ptr` must point to `record_len` valid bytes.
/// - `config` must be null or point to a valid `RqfRenderConfig`.
/// - `out_buf` and `out_len` must be valid pointers.
/// - The caller must free `*out_buf` with `rqf_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn rqf_render_requisition(
    record_ptr: *const u8,
    record_len: u32,
    config: *const RqfRenderConfig,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    let template = REQUISITION_TEMPLATE.as_bytes();
    rqf_render_requisition_with_template(
        template.as_ptr(),
        template.len() as u32,
        record_ptr,
        record_len,
        config,
        out_buf,
        out_len,
    )
}

/// Render a JSON requisition record into a caller-supplied HTML template.
///
/// # Safety
/// As [`rqf_render_requisition`]; additionally `template_ptr` must point to
/// `template_len` valid bytes.
#[no_mangle]
pub unsafe extern "C" fn rqf_render_requisition_with_template(
    template_ptr: *const u8,
    template_len: u32,
    record_ptr: *const u8,
    record_len: u32,
    config: *const RqfRenderConfig,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if template_ptr.is_null() || record_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("null pointer argument");
        return RQF_NULL_ARGUMENT;
    }
    let template = match str_arg(template_ptr, template_len) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let record = match str_arg(record_ptr, record_len) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let config = pipeline_config_from_c(config.as_ref());
    hand_out(render_record(template, record, config), out_buf, out_len)
}

/// Ledger bucket for a purpose/branch pair. Null arguments count as blank.
/// The result must be freed with `rqf_free_string`; null only if the key
/// cannot be represented as a C string.
///
/// # Safety
/// Non-null arguments must be valid null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn rqf_bucket_key(purpose: *const c_char, branch: *const c_char) -> *mut c_char {
    let arg = |p: *const c_char| {
        if p.is_null() {
            String::new()
        } else {
            CStr::from_ptr(p).to_string_lossy().into_owned()
        }
    };
    match CString::new(bucket_key(&arg(purpose), &arg(branch))) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a PDF buffer returned by a render call.
///
/// # Safety
/// `buf` must have been returned by an `rqf_render_*` call and `len` must be
/// the length returned with it.
#[no_mangle]
pub unsafe extern "C" fn rqf_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        drop(Box::from_raw(slice::from_raw_parts_mut(buf, len as usize)));
    }
}

/// Free a string returned by `rqf_bucket_key`.
///
/// # Safety
/// `s` must have been returned by this library.
#[no_mangle]
pub unsafe extern "C" fn rqf_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// The last error on this thread, or null. Valid until the next failing
/// `rqf_*` call on the same thread; do **not** free it.
#[no_mangle]
pub extern "C" fn rqf_last_error() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Library version. Do **not** free it.
#[no_mangle]
pub extern "C" fn rqf_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
