//! Integration tests for the KScr execution core
//!
//! Tests the full pipeline:
//! - Source compilation into statement trees
//! - Class loading and entrypoint execution
//! - Control flow, exceptions and exit codes
//! - Standard IO pipe through captured buffers
//! - Bytecode write/load round trips

use kscr::bytecode::codec;
use kscr::config::{Compression, RuntimeConfig};
use kscr::interp::{ErrorKind, InterpResult, Interpreter, Numeric, ObjectRef, Registers, Value, is_thrown};
use kscr::model::ClassStore;
use kscr::span::SourcePosition;
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

/// Output sink shared between the interpreter and the test.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Outcome {
    result: InterpResult<i32>,
    exit_code: i32,
    exit_message: Option<String>,
    output: String,
    trace: Vec<String>,
}

fn interpreter(config: RuntimeConfig, input: &str) -> (Interpreter, SharedBuf) {
    let out = SharedBuf::default();
    let vm = Interpreter::with_io(
        config,
        Box::new(out.clone()),
        Box::new(Cursor::new(input.as_bytes().to_vec())),
    )
    .unwrap();
    (vm, out)
}

fn run_config(source: &str, input: &str, config: RuntimeConfig) -> Outcome {
    let classes = kscr::compile("test.kscr", source).unwrap();
    let (mut vm, out) = interpreter(config, input);
    vm.load(classes).unwrap();
    let result = vm.execute();
    Outcome {
        exit_code: vm.exit_code(),
        exit_message: vm.exit_message().map(str::to_string),
        output: out.text(),
        trace: vm.stack_trace().iter().map(|t| t.local.clone()).collect(),
        result,
    }
}

fn run_with_input(source: &str, input: &str) -> Outcome {
    run_config(source, input, RuntimeConfig::default())
}

fn run(source: &str) -> Outcome {
    run_with_input(source, "")
}

/// Exit code of a program that must finish without an uncaught error.
fn exit_code(source: &str) -> i32 {
    let outcome = run(source);
    match outcome.result {
        Ok(code) => code,
        Err(e) => panic!("program failed: {e:?}"),
    }
}

fn output(source: &str) -> String {
    let outcome = run(source);
    if let Err(e) = &outcome.result {
        panic!("program failed: {e:?}");
    }
    outcome.output
}

// ============================================
// Type model
// ============================================

#[test]
fn test_can_hold_is_reflexive_and_void_is_bottom() {
    let classes = ClassStore::new().unwrap();
    let p = *classes.primitives();
    for ty in [p.num_int, p.str_t, p.range_t, p.type_t, p.num_t] {
        assert!(classes.can_hold(ty, ty));
        assert!(classes.can_hold(p.void_t, ty));
        assert!(classes.can_hold(ty, p.void_t));
    }
    assert!(!classes.can_hold(p.num_int, p.str_t));
}

#[test]
fn test_user_classes_hold_subclasses() {
    let source = r#"
        public class Animal { }
        public class Dog extends Animal { }
        public class App {
            public static int main() {
                Animal a = new Dog();
                if (a instanceof Dog) return 1;
                return 0;
            }
        }
    "#;
    assert_eq!(exit_code(source), 1);
}

// ============================================
// Values and references
// ============================================

#[test]
fn test_numeric_literals_are_interned() {
    let (mut vm, _) = interpreter(RuntimeConfig::default(), "");
    let a = vm.numeric_ref(Numeric::compile("5").unwrap());
    let b = vm.numeric_ref(Numeric::compile("5").unwrap());
    assert!(Rc::ptr_eq(&a, &b));
    let long = vm.numeric_ref(Numeric::compile("5l").unwrap());
    assert!(!Rc::ptr_eq(&a, &long));
    assert!(a.value().same(&b.value()));
}

#[test]
fn test_width_homogeneous_arithmetic() {
    assert_eq!(exit_code("return 5 + 3;"), 8);
    assert_eq!(exit_code("return 5 / 2;"), 2);
    assert_eq!(output("stdio << 5.0d / 2.0d;"), "2.5\n");
}

#[test]
fn test_declared_width_accepts_int_literals() {
    assert_eq!(exit_code("long x = 5; x = x + 1; return x;"), 6);
    assert_eq!(exit_code("long x = 5; x += 1; x++; return x;"), 7);
    assert_eq!(exit_code("double d = 5; return d / 2;"), 2);
    assert_eq!(exit_code("float f = 3; f = f * 2; return f;"), 6);
}

#[test]
fn test_declared_width_with_suffixed_literals() {
    assert_eq!(output("double d = 5.0d; stdio << d / 2.0d;"), "2.5\n");
    assert_eq!(output("float f = 1.5f; stdio << f * 2.0f;"), "3\n");
    assert_eq!(exit_code("long x = 5l; x = x + 2l; return x;"), 7);
}

#[test]
fn test_width_accessors_bridge_mixed_operands() {
    assert_eq!(exit_code("long x = 5l; return x.intValue() + 1;"), 6);
    assert_eq!(output("int i = 5; stdio << i.doubleValue() / 2.0d;"), "2.5\n");
    assert_eq!(exit_code("int i = 4; long y = i.longValue(); return y + 1l;"), 5);
}

#[test]
fn test_mixed_width_operands_fail_fast() {
    for source in ["return 5l + 1;", "long x = 5l; x += 1; return x;", "double d = 5.0d; return d / 2;"] {
        let outcome = run(source);
        let err = outcome.result.unwrap_err();
        assert!(!is_thrown(&err), "{source}");
        assert!(err.root_cause().message.contains("Mixed-width"), "{source}");
        assert_eq!(outcome.exit_code, -1);
    }
}

#[test]
fn test_ref_type_checking() {
    let classes = ClassStore::new().unwrap();
    let p = *classes.primitives();
    let r = ObjectRef::new(p.num_t);
    let err = r.set_value(&classes, Value::str("x")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
    r.set_value(&classes, Value::int(7)).unwrap();
    assert!(r.value().same(&Value::int(7)));
}

#[test]
fn test_declared_str_rejects_number() {
    let outcome = run("str s = 5;");
    let err = outcome.result.unwrap_err();
    assert_eq!(err.root_cause().kind, ErrorKind::TypeMismatch);
    assert_eq!(outcome.exit_code, -1);
}

// ============================================
// Frames and scopes
// ============================================

#[test]
fn test_locals_do_not_outlive_their_step() {
    let (mut vm, _) = interpreter(RuntimeConfig::default(), "");
    let receiver = vm.to_ref(Value::Null);
    let int = vm.classes().primitives().num_int;
    vm.step_into(&SourcePosition::system(), receiver, "call".into(), Registers::DEFAULT, |vm| {
        vm.put_local("x", ObjectRef::new(int));
        vm.step_inside("block", Registers::DEFAULT, |vm| {
            assert!(vm.get_local("x").is_some());
            vm.put_local("y", ObjectRef::new(int));
            Ok(())
        })?;
        assert!(vm.get_local("x").is_some());
        assert!(vm.get_local("y").is_none());
        Ok(())
    })
    .unwrap();
    assert!(vm.get_local("x").is_none());
}

#[test]
fn test_block_local_is_unreachable_after_block() {
    let outcome = run("if (true) { int inner = 1; } return inner;");
    let err = outcome.result.unwrap_err();
    assert_eq!(err.root_cause().kind, ErrorKind::UndefinedVariable);
}

// ============================================
// Control flow
// ============================================

#[test]
fn test_if_false_branch_not_evaluated() {
    assert_eq!(exit_code("if (false) { throw 5; } else { return 1; }"), 1);
}

#[test]
fn test_else_if_chain() {
    let source = "int x = 2; if (x == 1) return 10; else if (x == 2) return 20; else return 30;";
    assert_eq!(exit_code(source), 20);
}

#[test]
fn test_for_loop_runs_five_times() {
    let source = r#"
        int count = 0;
        for (int i = 0; i < 5; i++) {
            stdio << i;
            count++;
        }
        return count;
    "#;
    let outcome = run(source);
    assert_eq!(outcome.result.unwrap(), 5);
    assert_eq!(outcome.output, "0\n1\n2\n3\n4\n");
}

#[test]
fn test_return_inside_loop_leaves_method() {
    let source = "for (int i = 0; i < 100; i++) { if (i == 3) return i; } return -1;";
    assert_eq!(exit_code(source), 3);
}

#[test]
fn test_foreach_over_ranges() {
    assert_eq!(output("foreach (i : 0~3) stdio << i;"), "0\n1\n2\n");
    assert_eq!(output("foreach (int i : 3~0) stdio << i;"), "3\n2\n1\n");
}

#[test]
fn test_foreach_over_array() {
    let source = r#"
        str[] words = new str[] { "a", "b" };
        foreach (w : words) stdio << w;
    "#;
    assert_eq!(output(source), "a\nb\n");
}

#[test]
fn test_while_and_do_loops() {
    assert_eq!(output("int n = 3; while (n > 0) { stdio << n; n--; }"), "3\n2\n1\n");
    assert_eq!(exit_code("int n = 0; do { n++; } while (n < 3); return n;"), 3);
    assert_eq!(exit_code("int n = 10; do n++; while (false); return n;"), 11);
}

// ============================================
// Operators
// ============================================

#[test]
fn test_precedence_end_to_end() {
    let source = r#"
        public class Calc {
            public static num compute() {
                return 2 + 3 * 4;
            }

            public static int main() {
                return compute();
            }
        }
    "#;
    assert_eq!(exit_code(source), 14);
    assert_eq!(exit_code("return (2 + 3) * 4;"), 20);
    assert_eq!(exit_code("return 10 - 4 - 3;"), 3);
}

#[test]
fn test_infix_power() {
    assert_eq!(exit_code("return 2 ^ 3;"), 8);
    assert_eq!(exit_code("return 2 pow 3;"), 8);
    assert_eq!(exit_code("return 2 * 3 pow 2;"), 18);
    assert_eq!(exit_code("int b = 3; return b ^ 2 + 1;"), 10);
    assert_eq!(exit_code("return 2.opPow(5);"), 32);
}

#[test]
fn test_compound_and_increment_operators() {
    let source = r#"
        int x = 5;
        x += 3;
        x *= 2;
        int before = x++;
        stdio << before;
        stdio << x;
        stdio << --x;
    "#;
    assert_eq!(output(source), "16\n17\n16\n");
}

#[test]
fn test_logic_short_circuit() {
    let source = r#"
        str s = null;
        if (s != null && s.length() > 0) return 1;
        if (s == null || s.length() > 0) return 2;
        return 3;
    "#;
    assert_eq!(exit_code(source), 2);
}

#[test]
fn test_string_concat_and_null_fallback() {
    let source = r#"
        str name = null;
        stdio << "hello " + (name ?? "world");
        stdio << "n=" + 5;
    "#;
    assert_eq!(output(source), "hello world\nn=5\n");
}

#[test]
fn test_explicit_operator_members() {
    assert_eq!(exit_code("return 5.opPlus(3);"), 8);
    assert_eq!(exit_code("return 1.opLShift(4);"), 16);
}

// ============================================
// Exceptions
// ============================================

#[test]
fn test_throw_numeric_sets_exit_code() {
    let outcome = run("throw 3;");
    let err = outcome.result.unwrap_err();
    assert!(is_thrown(&err));
    assert_eq!(outcome.exit_code, 3);
}

#[test]
fn test_uncaught_exception_message() {
    let outcome = run("throw new Exception(\"boom\");");
    assert!(outcome.result.is_err());
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.exit_message.as_deref(), Some("boom"));
}

#[test]
fn test_try_catch_finally_counter() {
    let source = r#"
        int counter = 0;
        int caught = 0;
        try {
            throw 7;
        } catch (e) {
            caught = e;
        } finally {
            counter++;
        }
        stdio << caught;
        return counter;
    "#;
    let outcome = run(source);
    assert_eq!(outcome.result.unwrap(), 1);
    assert_eq!(outcome.output, "7\n");
}

#[test]
fn test_finally_runs_once_when_catch_rethrows() {
    let source = r#"
        public class Guard {
            static int counter = 0;

            static void work() {
                try {
                    throw 1;
                } catch (e) {
                    throw 2;
                } finally {
                    counter++;
                }
            }

            public static int main() {
                try {
                    work();
                } catch (x) {
                    stdio << x;
                }
                return counter;
            }
        }
    "#;
    let outcome = run(source);
    assert_eq!(outcome.result.unwrap(), 1);
    assert_eq!(outcome.output, "2\n");
}

#[test]
fn test_finally_runs_when_catch_type_is_unknown() {
    let source = r#"
        try {
            throw 1;
        } catch (Nope e) {
            return 1;
        } finally {
            stdio << "fin";
        }
        return 0;
    "#;
    let outcome = run(source);
    let err = outcome.result.unwrap_err();
    assert!(!is_thrown(&err));
    assert_eq!(err.root_cause().message, "Unknown type: Nope");
    assert_eq!(outcome.output, "fin\n");
    assert_eq!(outcome.exit_code, -1);
}

const RESOURCE_CLASSES: &str = r#"
    public class Res implements Closeable {
        private str name;

        public Res(str name) {
            this.name = name;
        }

        public void close() {
            stdio << "close " + name;
        }
    }
"#;

#[test]
fn test_resources_close_before_finally() {
    let source = format!(
        "{RESOURCE_CLASSES}{}",
        r#"
        public class App {
            public static int main() {
                try (Res a = new Res("a"); Res b = new Res("b")) {
                    stdio << "body";
                } catch (e) {
                    stdio << "catch";
                } finally {
                    stdio << "finally";
                }
                return 0;
            }
        }
        "#
    );
    let outcome = run(&source);
    assert_eq!(outcome.result.unwrap(), 0);
    assert_eq!(outcome.output, "body\nclose b\nclose a\nfinally\n");
}

#[test]
fn test_resources_close_before_catch() {
    let source = format!(
        "{RESOURCE_CLASSES}{}",
        r#"
        public class App {
            public static int main() {
                try (Res a = new Res("a")) {
                    stdio << "body";
                    throw 5;
                } catch (e) {
                    stdio << "catch " + e;
                } finally {
                    stdio << "finally";
                }
                return 1;
            }
        }
        "#
    );
    let outcome = run(&source);
    assert_eq!(outcome.result.unwrap(), 1);
    assert_eq!(outcome.output, "body\nclose a\ncatch 5\nfinally\n");
}

#[test]
fn test_resources_close_on_return() {
    let source = format!(
        "{RESOURCE_CLASSES}{}",
        r#"
        public class App {
            static int open() {
                try (Res a = new Res("a")) {
                    stdio << "body";
                    return 7;
                } finally {
                    stdio << "finally";
                }
                return 0;
            }

            public static int main() {
                int code = open();
                stdio << "returned " + code;
                return code;
            }
        }
        "#
    );
    let outcome = run(&source);
    assert_eq!(outcome.result.unwrap(), 7);
    assert_eq!(outcome.output, "body\nclose a\nfinally\nreturned 7\n");
}

#[test]
fn test_null_member_access_is_catchable() {
    let source = r#"
        str s = null;
        try {
            s.length();
        } catch (e) {
            return 4;
        }
        return 0;
    "#;
    assert_eq!(exit_code(source), 4);
}

#[test]
fn test_fatal_errors_are_not_catchable() {
    let outcome = run("try { int x = 1 / 0; } catch (e) { return 2; } return 3;");
    let err = outcome.result.unwrap_err();
    assert!(!is_thrown(&err));
    assert_eq!(err.root_cause().kind, ErrorKind::DivisionByZero);
    assert_eq!(outcome.exit_code, -1);
}

#[test]
fn test_throwing_non_throwable_is_fatal() {
    let outcome = run("throw \"text\";");
    let err = outcome.result.unwrap_err();
    assert!(!is_thrown(&err));
    assert!(err.root_cause().message.contains("not instanceof Throwable"));
}

#[test]
fn test_stack_trace_lists_frames() {
    let source = r#"
        public class Trace {
            static void fail() {
                throw 9;
            }

            public static void main() {
                fail();
            }
        }
    "#;
    let outcome = run(source);
    assert_eq!(outcome.exit_code, 9);
    assert!(outcome.trace.iter().any(|t| t.contains("fail")));
    assert!(outcome.trace.iter().any(|t| t.contains("main")));
}

#[test]
fn test_missing_return_is_fatal() {
    let source = r#"
        public class Broken {
            static int value() { int x = 1; }
            public static int main() { return value(); }
        }
    "#;
    let err = run(source).result.unwrap_err();
    assert!(err.root_cause().message.contains("no value returned"));
}

#[test]
fn test_call_depth_limit() {
    let source = r#"
        public class Deep {
            static int down(int n) { return down(n + 1); }
            public static int main() { return down(0); }
        }
    "#;
    let config = RuntimeConfig {
        max_call_depth: 50,
        ..RuntimeConfig::default()
    };
    let outcome = run_config(source, "", config);
    let err = outcome.result.unwrap_err();
    assert_eq!(err.root_cause().kind, ErrorKind::StackOverflow);
}

// ============================================
// Classes and members
// ============================================

#[test]
fn test_constructor_fields_and_methods() {
    let source = r#"
        public class Point {
            private int x;
            private int y;

            public Point(int x, int y) {
                this.x = x;
                this.y = y;
            }

            public int sum() {
                return x + y;
            }
        }

        public class App {
            public static int main() {
                Point p = new Point(2, 5);
                return p.sum();
            }
        }
    "#;
    assert_eq!(exit_code(source), 7);
}

#[test]
fn test_property_getter_and_initializer() {
    let source = r#"
        public class Box {
            private int value = 21;
            public int Twice { get { return value * 2; } }
        }

        public class App {
            public static int main() {
                return new Box().Twice;
            }
        }
    "#;
    assert_eq!(exit_code(source), 42);
}

#[test]
fn test_read_only_property_rejects_write() {
    let source = r#"
        public class Box {
            public int Fixed { get { return 1; } }
        }

        public class App {
            public static void main() {
                Box b = new Box();
                b.Fixed = 2;
            }
        }
    "#;
    let err = run(source).result.unwrap_err();
    assert_eq!(err.root_cause().kind, ErrorKind::NotSettable);
}

#[test]
fn test_static_initializer_runs_before_main() {
    let source = r#"
        public class Setup {
            static int base;

            static {
                base = 40;
            }

            public static int main() {
                return base + 2;
            }
        }
    "#;
    assert_eq!(exit_code(source), 42);
}

#[test]
fn test_user_operator_overload() {
    let source = r#"
        public class Money {
            int cents;
            public Money(int cents) { this.cents = cents; }
            public Money opPlus(Money other) { return new Money(cents + other.cents); }
        }

        public class App {
            public static int main() {
                Money total = new Money(150) + new Money(75);
                return total.cents;
            }
        }
    "#;
    assert_eq!(exit_code(source), 225);
}

#[test]
fn test_arrays() {
    let source = r#"
        int[] xs = new int[] { 1, 2, 3 };
        xs[1] = 5;
        int[] zeros = new int[4];
        return xs[0] + xs[1] + xs.length() + zeros[3];
    "#;
    assert_eq!(exit_code(source), 9);
}

#[test]
fn test_array_index_out_of_bounds() {
    let err = run("int[] xs = new int[2]; return xs[2];").result.unwrap_err();
    assert_eq!(err.root_cause().kind, ErrorKind::IndexOutOfBounds);
}

#[test]
fn test_negative_index_reports_array_length() {
    for source in [
        "int[] xs = new int[2]; return xs[-1];",
        "int[] xs = new int[2]; xs[-1] = 3;",
        "int[] xs = new int[2]; return xs.get(-1);",
    ] {
        let err = run(source).result.unwrap_err();
        let cause = err.root_cause();
        assert_eq!(cause.kind, ErrorKind::IndexOutOfBounds, "{source}");
        assert_eq!(cause.message, "index -1 out of bounds for length 2", "{source}");
    }
}

#[test]
fn test_abstract_type_cannot_be_instantiated() {
    let source = r#"
        public abstract class Shape { }
        public class App {
            public static void main() { Shape s = new Shape(); }
        }
    "#;
    let err = run(source).result.unwrap_err();
    assert!(err.root_cause().message.contains("abstract"));
}

// ============================================
// Standard IO and pipes
// ============================================

#[test]
fn test_stdio_consume_reads_numbers_and_strings() {
    let source = r#"
        stdio >> int n;
        stdio >> str word;
        stdio << word;
        return n + 1;
    "#;
    let outcome = run_with_input(source, "41\nhello\n");
    assert_eq!(outcome.result.unwrap(), 42);
    assert_eq!(outcome.output, "hello\n");
}

#[test]
fn test_listener_maps_sequence() {
    let source = "foreach (v : 1~4 >> x -> x * 10) stdio << v;";
    assert_eq!(output(source), "10\n20\n30\n");
}

// ============================================
// Bytecode persistence
// ============================================

#[test]
fn test_written_bytecode_runs_identically() {
    let source = r#"
        public class Loop {
            public static int main() {
                int total = 0;
                foreach (i : 0~4) {
                    total += i;
                    stdio << total;
                }
                return total;
            }
        }
    "#;
    let original = run(source);
    let classes = kscr::compile("test.kscr", source).unwrap();
    for compression in [Compression::None, Compression::Gzip, Compression::Zlib] {
        let bytes = codec::write(&classes, compression).unwrap();
        let loaded = codec::load(&bytes).unwrap();
        assert_eq!(loaded, classes);

        let (mut vm, out) = interpreter(RuntimeConfig::default(), "");
        vm.load(loaded).unwrap();
        assert_eq!(vm.execute().unwrap(), 6);
        assert_eq!(out.text(), original.output);
    }
}

// ============================================
// Diagnostics
// ============================================

#[test]
fn test_compile_error_reports_span() {
    let err = kscr::compile("bad.kscr", "return (1 + ;").unwrap_err();
    let span = err.span().unwrap();
    assert_eq!(span.start, 12);
    insta::assert_snapshot!(err.to_string(), @"Parser error at 12..13: expected expression, found ';'");
}
