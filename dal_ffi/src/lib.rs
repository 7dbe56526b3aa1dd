//! C ABI over the streaming data access layer.
//!
//! Exports the `dal_*` functions declared in `include/dal.h`. Handles are
//! opaque pointers backed by a generation-checked table, so double free and
//! use-after-free from the foreign side degrade to error returns.
//!
//! Built as both `cdylib` (for foreign linkage) and `lib` (so the exported
//! functions can be exercised from Rust integration tests).

#![allow(non_camel_case_types)]

mod api;
mod codes;

pub use api::{
    dal_errno, dal_last_error_json, dal_reader, dal_reader_free, dal_reader_open, dal_reader_read,
    dal_string_free, dal_writer, dal_writer_close, dal_writer_free, dal_writer_open,
    dal_writer_write,
};
pub use codes::{
    error_code, DAL_EACCES, DAL_EBADF, DAL_EFINAL, DAL_EINVAL, DAL_ENOENT, DAL_EIO, DAL_EUNAVAIL,
};
