use std::io::Write;

use crate::runtime::{error::ErrorKind, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Int,
    Repr,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "repr" => Builtin::Repr,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Repr => "repr",
        }
    }

    pub fn call(self, args: Vec<Value>, out: &mut impl Write) -> Result<Value, ErrorKind> {
        match self {
            Builtin::Print => {
                let line = args
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(out, "{line}")?;
                Ok(Value::None)
            }
            Builtin::Len => match self.one(args)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(ErrorKind::Type(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            },
            Builtin::Str => Ok(Value::str(&self.one(args)?.to_string())),
            Builtin::Repr => Ok(Value::str(&self.one(args)?.repr())),
            Builtin::Int => {
                let arg = self.one(args)?;
                if let Some(i) = arg.as_int() {
                    return Ok(Value::Int(i));
                }
                match &arg {
                    Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                        ErrorKind::Value(format!(
                            "invalid literal for int() with base 10: {}",
                            arg.repr()
                        ))
                    }),
                    other => Err(ErrorKind::Type(format!(
                        "int() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    fn one(self, args: Vec<Value>) -> Result<Value, ErrorKind> {
        let given = args.len();
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(arg), None) => Ok(arg),
            _ => Err(ErrorKind::Type(format!(
                "{}() takes exactly one argument ({given} given)",
                self.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(b: Builtin, args: Vec<Value>) -> (Result<Value, ErrorKind>, String) {
        let mut out = Vec::new();
        let result = b.call(args, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn print_joins_with_spaces() {
        let (result, out) = call(
            Builtin::Print,
            vec![Value::Int(1), Value::str("a"), Value::None],
        );
        assert!(matches!(result, Ok(Value::None)));
        assert_eq!(out, "1 a None\n");
    }

    #[test]
    fn print_without_arguments_prints_blank_line() {
        let (_, out) = call(Builtin::Print, vec![]);
        assert_eq!(out, "\n");
    }

    #[test]
    fn len_counts_characters() {
        let (result, _) = call(Builtin::Len, vec![Value::str("héllo")]);
        assert!(matches!(result, Ok(Value::Int(5))));
    }

    #[test]
    fn int_parses_strings() {
        assert!(matches!(
            call(Builtin::Int, vec![Value::str(" -42 ")]).0,
            Ok(Value::Int(-42))
        ));
        let (err, _) = call(Builtin::Int, vec![Value::str("4x")]);
        assert_eq!(
            err.unwrap_err().to_string(),
            "ValueError: invalid literal for int() with base 10: '4x'"
        );
    }

    #[test]
    fn arity_is_checked() {
        let (err, _) = call(Builtin::Len, vec![Value::str("a"), Value::str("b")]);
        assert_eq!(
            err.unwrap_err().to_string(),
            "TypeError: len() takes exactly one argument (2 given)"
        );
    }

    #[test]
    fn lookup_round_trips_names() {
        for b in [
            Builtin::Print,
            Builtin::Len,
            Builtin::Str,
            Builtin::Int,
            Builtin::Repr,
        ] {
            assert_eq!(Builtin::lookup(b.name()), Some(b));
        }
        assert_eq!(Builtin::lookup("open"), None);
    }
}
