//! Built-in functions over already allocated objects, and the console primitives.

use std::io::{BufRead, Write};

use crate::failure::{fail, Fault};
use crate::header::Kind;
use crate::heap::ObjRef;
use crate::runtime::Runtime;
use crate::value::Value;

/// Prompt written by [read_int] before it reads.
pub const READ_PROMPT: &str = " > ";

impl Runtime {
    fn expect_object(&self, op: &'static str, value: Value) -> ObjRef<'_> {
        if value.is_unboxed() {
            fail(Fault::NotBoxed {
                op,
                value: value.as_int(),
            });
        }
        self.object(value).unwrap_or_else(|| {
            fail(Fault::NotAnObject {
                op,
                found: format!("{:#x}", value.raw()),
            })
        })
    }

    /// The length recorded in the header: bytes of a string, elements of an array, sub-terms
    /// of a sexp, and for a closure its code word plus the captured values.
    pub fn length(&self, value: Value) -> usize {
        self.expect_object("length", value).len()
    }

    /// Reads element `index`: a byte of a string, an array element, a sexp sub-term or a
    /// closure word (0 is the entry point, captured values follow).
    pub fn elem(&self, value: Value, index: isize) -> Value {
        let (obj, slot) = self.element_slot("elem", value, index);
        match obj.kind() {
            Kind::String => Value::int(obj.bytes()[slot] as isize),
            _ => Value::from_raw(obj.slot(slot)),
        }
    }

    /// Writes element `index` and returns the stored value. Strings only take unboxed bytes.
    pub fn set_elem(&mut self, target: Value, index: isize, value: Value) -> Value {
        let (obj, slot) = self.element_slot("sta", target, index);
        let (header, kind) = (obj.index(), obj.kind());

        match kind {
            Kind::String => {
                if !value.is_unboxed() {
                    fail(Fault::NotUnboxed {
                        op: "sta",
                        value: value.raw(),
                    });
                }
                let byte = target.as_ptr::<u8>();
                unsafe { byte.add(slot).write(value.as_int() as u8) };
            }
            _ => unsafe { self.heap_mut().set_word(header + 1 + slot, value.raw()) },
        }

        value
    }

    /// Checks the bounds of `index` and maps it to a payload slot (a byte for strings).
    fn element_slot(&self, op: &'static str, value: Value, index: isize) -> (ObjRef<'_>, usize) {
        let obj = self.expect_object(op, value);
        let len = self.length(value);
        if index < 0 || index as usize >= len {
            fail(Fault::IndexOutOfBounds { op, index, len });
        }

        let index = index as usize;
        let slot = match obj.kind() {
            Kind::String | Kind::Array | Kind::Closure => index,
            Kind::Sexp => index + 1,
        };
        (obj, slot)
    }
}

/// Writes the prompt and reads one integer from `input`.
pub fn read_int(input: &mut impl BufRead, output: &mut impl Write) -> Value {
    let prompted = write!(output, "{READ_PROMPT}").and_then(|_| output.flush());
    if let Err(err) = prompted {
        fail(Fault::BadInput(format!("read: {err}")));
    }

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => fail(Fault::BadInput("read: unexpected end of input".into())),
        Ok(_) => {}
        Err(err) => fail(Fault::BadInput(format!("read: {err}"))),
    }

    match line.trim().parse::<isize>() {
        Ok(n) => Value::int(n),
        Err(_) => fail(Fault::BadInput(format!(
            "read: {:?} is not an integer",
            line.trim()
        ))),
    }
}

/// Prints the integer held by `value` on its own line.
pub fn write_int(output: &mut impl Write, value: Value) -> Value {
    if let Err(err) = writeln!(output, "{}", value.as_int()) {
        fail(Fault::BadInput(format!("write: {err}")));
    }
    Value::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::failure::FailureMode;
    use crate::tag_hash::tag_hash;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::fixed(256).with_failure_mode(FailureMode::Panic))
    }

    #[test]
    fn test_length() {
        let mut rt = runtime();
        let string = rt.string(b"four");
        let array = rt.array(&[Value::int(1); 3]);
        let sexp = rt.sexp(tag_hash("T"), &[Value::int(1); 2]);
        let closure = rt.closure(0x80, &[Value::int(1)]);

        assert_eq!(rt.length(string), 4);
        assert_eq!(rt.length(array), 3);
        assert_eq!(rt.length(sexp), 2);
        assert_eq!(rt.length(closure), 2);
    }

    #[test]
    fn test_closure_elements() {
        let mut rt = runtime();
        let closure = rt.closure(0x80, &[Value::int(7)]);

        assert_eq!(rt.elem(closure, 0).raw(), 0x80);
        assert_eq!(rt.elem(closure, 1), Value::int(7));

        rt.set_elem(closure, 1, Value::int(8));
        let obj = rt.object(closure).unwrap();
        assert_eq!(obj.code(), 0x80);
        assert_eq!(obj.fields().collect::<Vec<_>>(), vec![Value::int(8)]);
    }

    #[test]
    fn test_empty_array() {
        let mut rt = runtime();
        let empty = rt.array(&[]);
        assert_eq!(rt.length(empty), 0);
    }

    #[test]
    fn test_elem_and_set_elem() {
        let mut rt = runtime();
        let string = rt.string(b"abc");
        let array = rt.array(&[Value::int(1), Value::int(2)]);
        let sexp = rt.sexp(tag_hash("T"), &[Value::int(10), Value::int(20)]);

        assert_eq!(rt.elem(string, 1), Value::int(b'b' as isize));
        assert_eq!(rt.elem(array, 0), Value::int(1));
        assert_eq!(rt.elem(sexp, 1), Value::int(20));

        rt.set_elem(string, 0, Value::int(b'x' as isize));
        rt.set_elem(array, 1, string);
        rt.set_elem(sexp, 0, Value::int(11));

        assert_eq!(rt.object(string).unwrap().bytes(), b"xbc");
        assert_eq!(rt.elem(array, 1), string);
        assert_eq!(rt.elem(sexp, 0), Value::int(11));
        assert_eq!(rt.object(sexp).unwrap().sexp_tag(), tag_hash("T"));
    }

    #[test]
    #[should_panic(expected = "index 2 out of bounds for length 2")]
    fn test_elem_out_of_bounds() {
        let mut rt = runtime();
        let array = rt.array(&[Value::int(1), Value::int(2)]);
        rt.elem(array, 2);
    }

    #[test]
    #[should_panic(expected = "boxed value expected")]
    fn test_length_of_unboxed() {
        let rt = runtime();
        rt.length(Value::int(3));
    }

    #[test]
    fn test_read_int() {
        let mut input = "  42\n".as_bytes();
        let mut output = Vec::new();
        assert_eq!(read_int(&mut input, &mut output), Value::int(42));
        assert_eq!(output, READ_PROMPT.as_bytes());
    }

    #[test]
    #[should_panic(expected = "is not an integer")]
    fn test_read_int_rejects_garbage() {
        crate::failure::set_mode(FailureMode::Panic);
        let mut input = "forty two\n".as_bytes();
        read_int(&mut input, &mut Vec::new());
    }

    #[test]
    fn test_write_int() {
        let mut output = Vec::new();
        assert_eq!(write_int(&mut output, Value::int(-5)), Value::FALSE);
        assert_eq!(output, b"-5\n");
    }
}
