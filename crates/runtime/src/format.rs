//! The format engine.
//!
//! A single pure function expands a printf-style format string over a
//! slice of values. It backs the `format` stdlib function, `printf` /
//! `fprintf`, and the VM's runtime error messages, and never touches I/O.
//!
//! Specifier syntax: `%[flags][width][.precision]conv` with flags `-`,
//! `0`, `+` and space, and conversions `s i d f e g x o b c B %`.
//! On any error the partial output is discarded.

use crate::error::RuntimeError;
use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid conversion specifier '%{spec}'")]
    UnknownSpecifier { spec: char },

    #[error("incomplete conversion specifier at end of format string")]
    IncompleteSpecifier,

    #[error("no argument supplied for conversion '%{spec}' (argument {index})")]
    MissingArgument { spec: char, index: usize },

    #[error("conversion '%{spec}' expects {expected}, but argument {index} is of type {got}")]
    TypeMismatch {
        spec: char,
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("argument {index} ({value}) is not a valid character code")]
    BadCharCode { index: usize, value: i64 },
}

impl From<FormatError> for RuntimeError {
    fn from(e: FormatError) -> Self {
        RuntimeError::new(format!("error in format string: {}", e))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    space_sign: bool,
    width: usize,
    precision: Option<usize>,
}

/// Expand `fmt` over `args`, producing a new string.
pub fn render(fmt: &str, args: &[Value]) -> Result<String, FormatError> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }

        let mut spec = Spec::default();

        // Flags
        loop {
            match chars.peek() {
                Some('-') => spec.left_align = true,
                Some('0') => spec.zero_pad = true,
                Some('+') => spec.plus_sign = true,
                Some(' ') => spec.space_sign = true,
                _ => break,
            }
            chars.next();
        }

        // Width
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + d as usize;
            chars.next();
        }

        // Precision
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut prec = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                prec = prec * 10 + d as usize;
                chars.next();
            }
            spec.precision = Some(prec);
        }

        let conv = chars.next().ok_or(FormatError::IncompleteSpecifier)?;

        if conv == '%' {
            out.push('%');
            continue;
        }

        let index = next_arg;
        let arg = args
            .get(index)
            .ok_or(FormatError::MissingArgument { spec: conv, index })?;
        next_arg += 1;

        let body = match conv {
            's' => convert_string(arg, conv, index, &spec)?,
            'i' | 'd' => convert_int(arg, conv, index, &spec, 10, true)?,
            'x' => convert_int(arg, conv, index, &spec, 16, false)?,
            'o' => convert_int(arg, conv, index, &spec, 8, false)?,
            'b' => convert_int(arg, conv, index, &spec, 2, false)?,
            'f' | 'e' | 'g' => convert_float(arg, conv, index, &spec)?,
            'c' => convert_char(arg, conv, index)?,
            'B' => convert_bool(arg, conv, index)?,
            other => return Err(FormatError::UnknownSpecifier { spec: other }),
        };

        pad_into(&mut out, body, &spec);
    }

    Ok(out)
}

fn convert_string(arg: &Value, spec: char, index: usize, s: &Spec) -> Result<String, FormatError> {
    let text = match arg {
        Value::String(str) => str.to_str_lossy().into_owned(),
        _ => {
            return Err(FormatError::TypeMismatch {
                spec,
                index,
                expected: "a string",
                got: arg.type_name(),
            });
        }
    };
    Ok(match s.precision {
        Some(p) => text.chars().take(p).collect(),
        None => text,
    })
}

fn convert_int(
    arg: &Value,
    spec: char,
    index: usize,
    s: &Spec,
    base: u32,
    signed: bool,
) -> Result<String, FormatError> {
    let v = match arg {
        Value::Int(i) => *i,
        _ => {
            return Err(FormatError::TypeMismatch {
                spec,
                index,
                expected: "an integer",
                got: arg.type_name(),
            });
        }
    };

    let (sign, digits) = if signed {
        let sign = if v < 0 {
            "-"
        } else if s.plus_sign {
            "+"
        } else if s.space_sign {
            " "
        } else {
            ""
        };
        (sign, v.unsigned_abs())
    } else {
        // Unsigned bases render the two's complement bit pattern
        ("", v as u64)
    };

    let mut digits = match base {
        2 => format!("{:b}", digits),
        8 => format!("{:o}", digits),
        16 => format!("{:x}", digits),
        _ => format!("{}", digits),
    };

    if let Some(p) = s.precision {
        while digits.len() < p {
            digits.insert(0, '0');
        }
    }

    Ok(format!("{}{}", sign, digits))
}

fn convert_float(arg: &Value, spec: char, index: usize, s: &Spec) -> Result<String, FormatError> {
    let v = match arg.as_float_lossy() {
        Some(f) => f,
        None => {
            return Err(FormatError::TypeMismatch {
                spec,
                index,
                expected: "a number",
                got: arg.type_name(),
            });
        }
    };

    let sign_prefix = if v.is_sign_positive() {
        if s.plus_sign {
            "+"
        } else if s.space_sign {
            " "
        } else {
            ""
        }
    } else {
        ""
    };

    let body = match spec {
        'f' => format!("{:.*}", s.precision.unwrap_or(6), v),
        'e' => format!("{:.*e}", s.precision.unwrap_or(6), v),
        // Shortest representation that round-trips
        _ => format!("{}", v),
    };

    Ok(format!("{}{}", sign_prefix, body))
}

fn convert_char(arg: &Value, spec: char, index: usize) -> Result<String, FormatError> {
    let code = match arg {
        Value::Int(i) => *i,
        _ => {
            return Err(FormatError::TypeMismatch {
                spec,
                index,
                expected: "an integer character code",
                got: arg.type_name(),
            });
        }
    };

    let ch = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or(FormatError::BadCharCode { index, value: code })?;

    Ok(ch.to_string())
}

fn convert_bool(arg: &Value, spec: char, index: usize) -> Result<String, FormatError> {
    match arg {
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        _ => Err(FormatError::TypeMismatch {
            spec,
            index,
            expected: "a boolean",
            got: arg.type_name(),
        }),
    }
}

/// Apply width, alignment and zero padding to a converted body.
fn pad_into(out: &mut String, body: String, s: &Spec) {
    let len = body.chars().count();
    if len >= s.width {
        out.push_str(&body);
        return;
    }

    let fill = s.width - len;
    if s.left_align {
        out.push_str(&body);
        for _ in 0..fill {
            out.push(' ');
        }
    } else if s.zero_pad {
        // Keep a leading sign in front of the zeros
        let mut chars = body.chars();
        let first = chars.next();
        if let Some(c @ ('-' | '+' | ' ')) = first {
            out.push(c);
            for _ in 0..fill {
                out.push('0');
            }
            out.push_str(chars.as_str());
        } else {
            for _ in 0..fill {
                out.push('0');
            }
            out.push_str(&body);
        }
    } else {
        for _ in 0..fill {
            out.push(' ');
        }
        out.push_str(&body);
    }
}
