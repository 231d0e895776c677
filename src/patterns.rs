//! Pattern-matching predicates. They look only at tag bits and headers, so they are total:
//! an unboxed value, a word that does not address a heap object or an object of the wrong kind
//! simply fails to match.

use crate::header::Kind;
use crate::heap::Heap;
use crate::value::Value;

#[inline]
pub fn is_boxed(value: Value) -> bool {
    !value.is_unboxed()
}

#[inline]
pub fn is_unboxed(value: Value) -> bool {
    value.is_unboxed()
}

fn kind_of(heap: &Heap, value: Value) -> Option<Kind> {
    heap.object(value).map(|obj| obj.kind())
}

pub fn is_array(heap: &Heap, value: Value) -> bool {
    kind_of(heap, value) == Some(Kind::Array)
}

pub fn is_string(heap: &Heap, value: Value) -> bool {
    kind_of(heap, value) == Some(Kind::String)
}

pub fn is_sexp(heap: &Heap, value: Value) -> bool {
    kind_of(heap, value) == Some(Kind::Sexp)
}

pub fn is_closure(heap: &Heap, value: Value) -> bool {
    kind_of(heap, value) == Some(Kind::Closure)
}

/// An array of exactly `len` elements. `len` is a boxed integer.
pub fn array_of_len(heap: &Heap, value: Value, len: Value) -> bool {
    match heap.object(value) {
        Some(obj) => {
            obj.kind() == Kind::Array && len.is_unboxed() && obj.len() as isize == len.as_int()
        }
        None => false,
    }
}

/// Both are strings with the same bytes.
pub fn string_eq(heap: &Heap, x: Value, y: Value) -> bool {
    match (heap.object(x), heap.object(y)) {
        (Some(x), Some(y)) if x.kind() == Kind::String && y.kind() == Kind::String => {
            x.bytes() == y.bytes()
        }
        _ => false,
    }
}

/// A sexp built by constructor `tag` with `arity` sub-terms. Both are boxed integers.
pub fn sexp_with(heap: &Heap, value: Value, tag: Value, arity: Value) -> bool {
    let Some(obj) = heap.object(value) else {
        return false;
    };

    obj.kind() == Kind::Sexp
        && tag.is_unboxed()
        && arity.is_unboxed()
        && obj.sexp_tag() as isize == tag.as_int()
        && obj.len() as isize == arity.as_int()
}
