//! The C ABI that compiled lama code links against. Every function here is a thin shim over a
//! [Runtime] kept in a thread local; entries that may allocate first refresh the root window
//! from `__gc_stack_bottom` and `__gc_stack_top`.

#![allow(non_snake_case, non_upper_case_globals)]

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::ptr;

use crate::builtins::{read_int, write_int};
use crate::config::RuntimeConfig;
use crate::failure::{fail, Fault};
use crate::patterns;
use crate::roots::RootWindow;
use crate::runtime::Runtime;
use crate::tag_hash::{de_hash as name_of, tag_hash};
use crate::value::{box_int, is_unboxed, unbox_int, Value};

/// Bottom of the mutator stack, maintained by compiled code.
#[no_mangle]
pub static mut __gc_stack_bottom: usize = 0;

/// Top of the mutator stack, maintained by compiled code.
#[no_mangle]
pub static mut __gc_stack_top: usize = 0;

/// Publishes the address of the last live operand stack slot.
#[no_mangle]
pub extern "C" fn gc_set_top(addr: usize) {
    unsafe { ptr::addr_of_mut!(__gc_stack_top).write(addr) }
}

/// Publishes the start of the operand stack.
#[no_mangle]
pub extern "C" fn gc_set_bottom(addr: usize) {
    unsafe { ptr::addr_of_mut!(__gc_stack_bottom).write(addr) }
}

thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
    static DE_HASH_BUFFER: RefCell<CString> = RefCell::new(CString::default());
}

fn runtime_from_env() -> Runtime {
    let config = RuntimeConfig::from_env().unwrap_or_else(|err| fail(err.into()));
    Runtime::new(config)
}

fn stack_window() -> RootWindow {
    let (bottom, top) = unsafe {
        (
            ptr::addr_of!(__gc_stack_bottom).read(),
            ptr::addr_of!(__gc_stack_top).read(),
        )
    };
    if bottom == 0 || top == 0 {
        RootWindow::EMPTY
    } else {
        RootWindow::from_bounds(bottom, top)
    }
}

/// Runs `f` on this thread's runtime, creating it on first use.
fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|cell| {
        let mut slot = cell
            .try_borrow_mut()
            .unwrap_or_else(|_| fail(Fault::ReentrantRuntime));
        let runtime = slot.get_or_insert_with(runtime_from_env);
        unsafe { runtime.set_stack_window(stack_window()) };
        f(runtime)
    })
}

fn count(op: &'static str, boxed: Value) -> usize {
    let n = boxed.as_int();
    if !boxed.is_unboxed() || n < 0 {
        fail(Fault::InvalidLength { op, len: n });
    }
    n as usize
}

#[no_mangle]
pub extern "C" fn __gc_init() {
    with_runtime(|_| ());
}

#[no_mangle]
pub extern "C" fn __shutdown() {
    RUNTIME.with(|cell| match cell.try_borrow_mut() {
        Ok(mut slot) => drop(slot.take()),
        Err(_) => fail(Fault::ReentrantRuntime),
    });
}

#[no_mangle]
pub extern "C" fn rtBox(n: isize) -> usize {
    box_int(n)
}

#[no_mangle]
pub extern "C" fn rtUnbox(word: usize) -> isize {
    unbox_int(word)
}

#[no_mangle]
pub extern "C" fn isUnboxed(word: usize) -> bool {
    is_unboxed(word)
}

/// # Safety
/// `slot` must stay valid until it is popped.
#[no_mangle]
pub unsafe extern "C" fn push_extra_root(slot: *mut Value) {
    with_runtime(|rt| rt.push_extra_root(slot));
}

#[no_mangle]
pub extern "C" fn pop_extra_root(slot: *mut Value) {
    with_runtime(|rt| rt.pop_extra_root(slot));
}

/// # Safety
/// `len` Value slots from `start` must stay valid for the lifetime of the runtime.
#[no_mangle]
pub unsafe extern "C" fn gc_register_static_area(start: *mut Value, len: usize) {
    with_runtime(|rt| rt.register_static_roots(start, len));
}

/// Reports `message` and terminates.
///
/// # Safety
/// `message` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn failure(message: *const c_char) -> ! {
    let message = CStr::from_ptr(message).to_string_lossy().into_owned();
    fail(Fault::Message(message))
}

/// `args[0..n-1]` are the sub-terms, `args[n-1]` the boxed constructor tag.
///
/// # Safety
/// `args` must point at `unbox(bn)` Values.
#[no_mangle]
pub unsafe extern "C" fn Bsexp(args: *mut Value, bn: Value) -> Value {
    let n = count("Bsexp", bn);
    if n == 0 {
        fail(Fault::InvalidLength { op: "Bsexp", len: 0 });
    }
    let tag = args.add(n - 1).read();
    with_runtime(|rt| rt.sexp_from_raw(tag.as_int() as usize, args, n - 1))
}

/// # Safety
/// `args` must point at `unbox(bn)` Values.
#[no_mangle]
pub unsafe extern "C" fn Barray(args: *mut Value, bn: Value) -> Value {
    let n = count("Barray", bn);
    with_runtime(|rt| rt.array_from_raw(args, n))
}

/// `args[0]` is the entry point, `args[1..=n]` the captured values.
///
/// # Safety
/// `args` must point at `unbox(bn) + 1` words.
#[no_mangle]
pub unsafe extern "C" fn Bclosure(args: *mut Value, bn: Value) -> Value {
    let n = count("Bclosure", bn);
    let code = args.read().raw();
    with_runtime(|rt| rt.closure_from_raw(code, args.add(1), n))
}

/// # Safety
/// `args[0]` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn Bstring(args: *mut Value) -> Value {
    let source = args.read().as_ptr::<c_char>();
    with_runtime(|rt| rt.string_from_c(source))
}

/// # Safety
/// `args` must point at one Value.
#[no_mangle]
pub unsafe extern "C" fn Lstring(args: *mut Value) -> Value {
    let value = args.read();
    with_runtime(|rt| rt.stringify(value))
}

#[no_mangle]
pub extern "C" fn Bboxed_patt(x: Value) -> Value {
    Value::bool(patterns::is_boxed(x))
}

#[no_mangle]
pub extern "C" fn Bunboxed_patt(x: Value) -> Value {
    Value::bool(patterns::is_unboxed(x))
}

#[no_mangle]
pub extern "C" fn Barray_tag_patt(x: Value) -> Value {
    with_runtime(|rt| Value::bool(patterns::is_array(rt.heap(), x)))
}

#[no_mangle]
pub extern "C" fn Bstring_tag_patt(x: Value) -> Value {
    with_runtime(|rt| Value::bool(patterns::is_string(rt.heap(), x)))
}

#[no_mangle]
pub extern "C" fn Bsexp_tag_patt(x: Value) -> Value {
    with_runtime(|rt| Value::bool(patterns::is_sexp(rt.heap(), x)))
}

#[no_mangle]
pub extern "C" fn Bclosure_tag_patt(x: Value) -> Value {
    with_runtime(|rt| Value::bool(patterns::is_closure(rt.heap(), x)))
}

#[no_mangle]
pub extern "C" fn Barray_patt(d: Value, n: Value) -> Value {
    with_runtime(|rt| Value::bool(patterns::array_of_len(rt.heap(), d, n)))
}

#[no_mangle]
pub extern "C" fn Bstring_patt(x: Value, y: Value) -> Value {
    with_runtime(|rt| Value::bool(patterns::string_eq(rt.heap(), x, y)))
}

#[no_mangle]
pub extern "C" fn Btag(d: Value, t: Value, n: Value) -> Value {
    with_runtime(|rt| Value::bool(patterns::sexp_with(rt.heap(), d, t, n)))
}

#[no_mangle]
pub extern "C" fn Llength(p: Value) -> Value {
    with_runtime(|rt| Value::int(rt.length(p) as isize))
}

#[no_mangle]
pub extern "C" fn Belem(p: Value, i: Value) -> Value {
    with_runtime(|rt| rt.elem(p, unboxed_index("Belem", i)))
}

#[no_mangle]
pub extern "C" fn Bsta(x: Value, i: Value, v: Value) -> Value {
    with_runtime(|rt| rt.set_elem(x, unboxed_index("Bsta", i), v))
}

fn unboxed_index(op: &'static str, i: Value) -> isize {
    if !i.is_unboxed() {
        fail(Fault::NotUnboxed { op, value: i.raw() });
    }
    i.as_int()
}

#[no_mangle]
pub extern "C" fn Lread() -> Value {
    let stdin = std::io::stdin();
    read_int(&mut stdin.lock(), &mut std::io::stdout())
}

#[no_mangle]
pub extern "C" fn Lwrite(n: Value) -> Value {
    write_int(&mut std::io::stdout(), n)
}

#[no_mangle]
pub extern "C" fn printValue(p: Value) {
    with_runtime(|rt| {
        if let Err(err) = rt.print_value(p, &mut std::io::stdout()) {
            crate::failure!("printValue: {err}");
        }
    })
}

/// # Safety
/// `name` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn LtagHash(name: *const c_char) -> Value {
    let name = CStr::from_ptr(name).to_string_lossy();
    Value::int(tag_hash(&name) as isize)
}

/// The constructor name of a boxed tag as [LtagHash] returns it. The string stays valid until
/// the next call on the same thread.
#[no_mangle]
pub extern "C" fn de_hash(tag: Value) -> *const c_char {
    let name = name_of(tag.as_int() as usize);
    DE_HASH_BUFFER.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        // Alphabet symbols are never NUL.
        *buffer = CString::new(name).unwrap_or_default();
        buffer.as_ptr()
    })
}
