//! Drives the runtime the way compiled code does: through the C entry points, with the roots
//! published in `__gc_stack_bottom` and `__gc_stack_top`. Those are process globals, so
//! everything lives in a single test.

use std::ffi::{CStr, CString};
use std::ptr;

use lamart::ffi::*;
use lamart::Value;

const FRAME_SLOTS: usize = 4;

struct Frame {
    slots: *mut Value,
}

impl Frame {
    fn get(&self, i: usize) -> Value {
        unsafe { self.slots.add(i).read_volatile() }
    }

    fn set(&self, i: usize, value: Value) {
        unsafe { self.slots.add(i).write_volatile(value) }
    }
}

fn tag(name: &str) -> Value {
    let name = CString::new(name).unwrap();
    unsafe { LtagHash(name.as_ptr()) }
}

fn string_of(value: Value) -> String {
    let len = Llength(value).as_int();
    let bytes: Vec<u8> = (0..len)
        .map(|i| Belem(value, Value::int(i)).as_int() as u8)
        .collect();
    String::from_utf8(bytes).unwrap()
}

fn churn() {
    for _ in 0..64 {
        let mut args = [Value::int(0); 8];
        unsafe { Barray(args.as_mut_ptr(), Value::int(8)) };
    }
}

#[test]
fn compiled_code_round_trip() {
    std::env::set_var("LAMA_FAILURE", "panic");
    std::env::set_var("LAMA_HEAP_INITIAL", "64");
    std::env::set_var("LAMA_HEAP_MAX", "4096");
    __gc_init();

    let mut storage = vec![Value::FALSE; FRAME_SLOTS].into_boxed_slice();
    let frame = Frame {
        slots: storage.as_mut_ptr(),
    };

    // A downward growing stack: the bottom is the high end.
    gc_set_bottom(unsafe { frame.slots.add(FRAME_SLOTS) } as usize);
    gc_set_top(frame.slots as usize);
    assert_eq!(unsafe { ptr::addr_of!(__gc_stack_top).read() }, frame.slots as usize);

    // Leave garbage below everything the frame keeps, so the next collection has to move it.
    churn();

    let cons = tag("Cons");
    let nil = tag("Nil");

    let mut args = [nil];
    frame.set(0, unsafe { Bsexp(args.as_mut_ptr(), Value::int(1)) });

    let mut args = [Value::int(1), frame.get(0), cons];
    frame.set(1, unsafe { Bsexp(args.as_mut_ptr(), Value::int(3)) });

    let mut args = [frame.get(1)];
    frame.set(2, unsafe { Lstring(args.as_mut_ptr()) });

    let mut args = [Value::int(1), Value::int(2), Value::int(3)];
    frame.set(3, unsafe { Barray(args.as_mut_ptr(), Value::int(3)) });

    let mut extra = {
        let mut args = [Value::from_raw(0x1000), Value::int(9)];
        unsafe { Bclosure(args.as_mut_ptr(), Value::int(1)) }
    };
    unsafe { push_extra_root(&mut extra) };

    let before = frame.get(3);
    churn();
    assert_ne!(frame.get(3), before);

    assert_eq!(Btag(frame.get(1), cons, Value::int(2)), Value::TRUE);
    assert_eq!(Btag(frame.get(1), nil, Value::int(2)), Value::FALSE);
    assert_eq!(Btag(frame.get(0), nil, Value::int(0)), Value::TRUE);
    assert_eq!(Llength(frame.get(1)), Value::int(2));
    assert_eq!(Bsexp_tag_patt(frame.get(1)), Value::TRUE);

    assert_eq!(Bstring_tag_patt(frame.get(2)), Value::TRUE);
    assert_eq!(string_of(frame.get(2)), "Cons (1, Nil)");

    assert_eq!(Barray_tag_patt(frame.get(3)), Value::TRUE);
    assert_eq!(Barray_patt(frame.get(3), Value::int(3)), Value::TRUE);
    assert_eq!(Llength(frame.get(3)), Value::int(3));
    assert_eq!(Belem(frame.get(3), Value::int(2)), Value::int(3));
    Bsta(frame.get(3), Value::int(0), Value::int(10));
    assert_eq!(Belem(frame.get(3), Value::int(0)), Value::int(10));

    // An empty array on top of the heap, then pushed below fresh garbage.
    let mut args: [Value; 0] = [];
    frame.set(0, unsafe { Barray(args.as_mut_ptr(), Value::int(0)) });
    for _ in 0..2 {
        assert_eq!(Barray_tag_patt(frame.get(0)), Value::TRUE);
        assert_eq!(Barray_patt(frame.get(0), Value::int(0)), Value::TRUE);
        assert_eq!(Llength(frame.get(0)), Value::int(0));
        let mut args = [frame.get(0)];
        assert_eq!(string_of(unsafe { Lstring(args.as_mut_ptr()) }), "[]");
        churn();
    }

    assert_eq!(Bclosure_tag_patt(extra), Value::TRUE);
    assert_eq!(Llength(extra), Value::int(2));
    assert_eq!(Belem(extra, Value::int(0)).raw(), 0x1000);
    assert_eq!(Belem(extra, Value::int(1)), Value::int(9));
    pop_extra_root(&mut extra);

    assert_eq!(Bunboxed_patt(Value::int(4)), Value::TRUE);
    assert_eq!(Bboxed_patt(frame.get(3)), Value::TRUE);

    let name = unsafe { CStr::from_ptr(de_hash(cons)) };
    assert_eq!(name.to_str().unwrap(), "Cons");

    assert_eq!(rtUnbox(rtBox(-21)), -21);
    assert!(isUnboxed(rtBox(3)));

    gc_set_bottom(0);
    gc_set_top(0);
    __shutdown();
    drop(storage);
}
