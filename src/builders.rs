//! Object builders. Every builder allocates first and fills the payload afterwards, with its
//! argument Values registered as roots for the allocation, so a collection triggered by the
//! builder itself keeps and relocates them.

use std::ffi::{c_char, CStr};

use crate::header::Kind;
use crate::runtime::Runtime;
use crate::value::Value;

impl Runtime {
    /// Builds an array holding `elements` in order.
    pub fn array(&mut self, elements: &[Value]) -> Value {
        let mut args = elements.to_vec();
        unsafe { self.array_from_raw(args.as_mut_ptr(), args.len()) }
    }

    /// # Safety
    /// `args` must point at `len` readable and writable Values.
    pub unsafe fn array_from_raw(&mut self, args: *mut Value, len: usize) -> Value {
        let index = self.allocate_rooted(Kind::Array, len, args, len);
        for i in 0..len {
            self.write_slot(index, i, args.add(i).read());
        }
        self.payload(index)
    }

    /// Builds a sexp with constructor `tag` (a [crate::tag_hash::tag_hash]) over `fields`.
    pub fn sexp(&mut self, tag: usize, fields: &[Value]) -> Value {
        let mut args = fields.to_vec();
        unsafe { self.sexp_from_raw(tag, args.as_mut_ptr(), args.len()) }
    }

    /// # Safety
    /// `args` must point at `len` readable and writable Values.
    pub unsafe fn sexp_from_raw(&mut self, tag: usize, args: *mut Value, len: usize) -> Value {
        let index = self.allocate_rooted(Kind::Sexp, len, args, len);
        self.write_slot(index, 0, Value::from_raw(tag));
        for i in 0..len {
            self.write_slot(index, i + 1, args.add(i).read());
        }
        self.payload(index)
    }

    /// Builds a closure entering at `code` and capturing `captured`.
    pub fn closure(&mut self, code: usize, captured: &[Value]) -> Value {
        let mut args = captured.to_vec();
        unsafe { self.closure_from_raw(code, args.as_mut_ptr(), args.len()) }
    }

    /// # Safety
    /// `args` must point at `len` readable and writable Values.
    pub unsafe fn closure_from_raw(&mut self, code: usize, args: *mut Value, len: usize) -> Value {
        let index = self.allocate_rooted(Kind::Closure, len + 1, args, len);
        self.write_slot(index, 0, Value::from_raw(code));
        for i in 0..len {
            self.write_slot(index, i + 1, args.add(i).read());
        }
        self.payload(index)
    }

    /// Builds a string holding a copy of `bytes`.
    pub fn string(&mut self, bytes: &[u8]) -> Value {
        let index = self.allocate(Kind::String, bytes.len());
        let payload = self.payload(index);
        unsafe {
            payload
                .as_ptr::<u8>()
                .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len())
        };
        payload
    }

    /// Builds a string from a NUL terminated byte source.
    ///
    /// # Safety
    /// `source` must be a valid C string.
    pub unsafe fn string_from_c(&mut self, source: *const c_char) -> Value {
        // The source may itself be a heap string that moves when we allocate.
        let bytes = CStr::from_ptr(source).to_bytes().to_vec();
        self.string(&bytes)
    }

    /// Builds a string holding the printed form of `value`.
    pub fn stringify(&mut self, value: Value) -> Value {
        let rendered = self.render(value);
        self.string(rendered.as_bytes())
    }

    fn payload(&self, index: usize) -> Value {
        Value::from_raw(self.heap().payload_addr(index))
    }

    unsafe fn write_slot(&mut self, index: usize, slot: usize, value: Value) {
        self.heap_mut().set_word(index + 1 + slot, value.raw());
    }
}
