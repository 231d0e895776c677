//! The printed form of values, shared by `printValue` and `Lstring`.

use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};

use crate::header::Kind;
use crate::heap::{Heap, ObjRef};
use crate::runtime::Runtime;
use crate::tag_hash::{de_hash, CONS_TAG_HASH};
use crate::value::Value;

/// A value paired with the heap it lives in, printable through [Display].
#[derive(Clone, Copy)]
pub struct Printed<'h> {
    heap: &'h Heap,
    value: Value,
}

impl<'h> Printed<'h> {
    pub fn new(heap: &'h Heap, value: Value) -> Self {
        Self { heap, value }
    }

    fn with(&self, value: Value) -> Self {
        Self::new(self.heap, value)
    }
}

impl Display for Printed<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.value.is_unboxed() {
            return write!(f, "{}", self.value.as_int());
        }

        let Some(obj) = self.heap.object(self.value) else {
            return write!(f, "{:#x}", self.value.raw());
        };

        match obj.kind() {
            Kind::String => write!(f, "\"{}\"", String::from_utf8_lossy(obj.bytes())),
            Kind::Array => {
                write!(f, "[")?;
                self.write_fields(f, obj)?;
                write!(f, "]")
            }
            Kind::Sexp if obj.sexp_tag() == CONS_TAG_HASH && obj.len() == 2 => {
                self.write_list(f, obj)
            }
            Kind::Sexp => {
                write!(f, "{}", de_hash(obj.sexp_tag()))?;
                if !obj.is_empty() {
                    write!(f, " (")?;
                    self.write_fields(f, obj)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Kind::Closure => {
                write!(f, "<closure {:#x}", obj.code())?;
                for captured in obj.fields() {
                    write!(f, ", {}", self.with(captured))?;
                }
                write!(f, ">")
            }
        }
    }
}

impl Printed<'_> {
    fn write_fields(&self, f: &mut Formatter<'_>, obj: ObjRef<'_>) -> fmt::Result {
        for (i, field) in obj.fields().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.with(field))?;
        }
        Ok(())
    }

    /// `cons` cells print as `{a, b, c}`. The walk stops at the first unboxed tail.
    fn write_list(&self, f: &mut Formatter<'_>, first: ObjRef<'_>) -> fmt::Result {
        write!(f, "{{")?;

        let mut cell = first;
        loop {
            let mut fields = cell.fields();
            let head = fields.next().unwrap_or_default();
            let tail = fields.next().unwrap_or_default();
            write!(f, "{}", self.with(head))?;

            if tail.is_unboxed() {
                break;
            }
            write!(f, ", ")?;

            match self.heap.object(tail) {
                Some(next)
                    if next.kind() == Kind::Sexp
                        && next.sexp_tag() == CONS_TAG_HASH
                        && next.len() == 2 =>
                {
                    cell = next
                }
                _ => {
                    write!(f, "{}", self.with(tail))?;
                    break;
                }
            }
        }

        write!(f, "}}")
    }
}

impl Runtime {
    pub fn printed(&self, value: Value) -> Printed<'_> {
        Printed::new(self.heap(), value)
    }

    /// The printed form of `value` as an owned string.
    pub fn render(&self, value: Value) -> String {
        self.printed(value).to_string()
    }

    /// Writes the printed form of `value` to `out`.
    pub fn print_value(&self, value: Value, out: &mut impl Write) -> io::Result<()> {
        write!(out, "{}", self.printed(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::failure::FailureMode;
    use crate::runtime::Runtime;
    use crate::tag_hash::{tag_hash, CONS_TAG_HASH};
    use crate::value::{Value, WORD_SIZE};

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::fixed(512).with_failure_mode(FailureMode::Panic))
    }

    #[test]
    fn test_scalars() {
        let rt = runtime();
        assert_eq!(rt.render(Value::int(-12)), "-12");
        assert_eq!(rt.render(Value::from_raw(WORD_SIZE * 2)), format!("{:#x}", WORD_SIZE * 2));
    }

    #[test]
    fn test_string_and_array() {
        let mut rt = runtime();
        let string = rt.string(b"hi");
        let array = rt.array(&[Value::int(1), string, Value::int(3)]);
        assert_eq!(rt.render(array), "[1, \"hi\", 3]");
        let empty = rt.array(&[]);
        assert_eq!(rt.render(empty), "[]");
    }

    #[test]
    fn test_constructors() {
        let mut rt = runtime();
        let nil = rt.sexp(tag_hash("Nil"), &[]);
        let cons = rt.sexp(tag_hash("Cons"), &[Value::int(1), nil]);
        assert_eq!(rt.render(nil), "Nil");
        assert_eq!(rt.render(cons), "Cons (1, Nil)");
    }

    #[test]
    fn test_list_syntax() {
        let mut rt = runtime();
        let tail = rt.sexp(CONS_TAG_HASH, &[Value::int(3), Value::FALSE]);
        let middle = rt.sexp(CONS_TAG_HASH, &[Value::int(2), tail]);
        let list = rt.sexp(CONS_TAG_HASH, &[Value::int(1), middle]);
        assert_eq!(rt.render(list), "{1, 2, 3}");
    }

    #[test]
    fn test_closure() {
        let mut rt = runtime();
        let closure = rt.closure(0x1000, &[Value::int(4), Value::int(5)]);
        assert_eq!(rt.render(closure), "<closure 0x1000, 4, 5>");
    }

    #[test]
    fn test_print_value_writes() {
        let mut rt = runtime();
        let array = rt.array(&[Value::int(1)]);
        let mut out = Vec::new();
        rt.print_value(array, &mut out).unwrap();
        assert_eq!(out, b"[1]");
    }
}
