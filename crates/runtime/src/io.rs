//! The io library.
//!
//! File handles are weak userinfo values: `fopen` leaks a `FileHandle`
//! shell and hands out the raw pointer, and `fclose` drops the inner
//! stream but never frees the shell. A stale handle therefore reads a
//! closed-stream marker instead of dangling into freed memory, and the
//! runtime never auto-closes anything. The `stdin` / `stdout` / `stderr`
//! constants are process-lifetime handles that `fclose` leaves untouched.

use crate::error::RuntimeError;
use crate::format;
use crate::stdlib::{arg_int, arg_string, check_argc, check_argc_min};
use crate::value::Value;
use crate::vm::Vm;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

enum Stream {
    /// An owned file; `None` once fclose has run
    File(Option<File>),
    Stdin,
    Stdout,
    Stderr,
}

pub struct FileHandle {
    stream: RefCell<Stream>,
}

impl FileHandle {
    fn into_weak(self) -> Value {
        Value::WeakUserInfo(Box::into_raw(Box::new(self)) as *mut ())
    }
}

/// Recover a handle from a weak userinfo argument.
///
/// # Safety
/// The pointer must have been produced by `fopen`, `tmpfile` or the
/// standard-stream constants. Handles are leaked rather than freed, so
/// every such pointer stays valid for the life of the process; passing a
/// foreign weak userinfo value here is library misuse, exactly as it is
/// for the underlying `FILE*` convention this mirrors.
fn handle_arg<'a>(
    fname: &str,
    args: &'a [Value],
    index: usize,
) -> Result<&'a FileHandle, RuntimeError> {
    match &args[index] {
        Value::WeakUserInfo(p) if !p.is_null() => Ok(unsafe { &*(*p as *const FileHandle) }),
        other => Err(RuntimeError::new(format!(
            "{}: argument {} must be a file handle, got {}",
            fname,
            index + 1,
            other.type_name()
        ))),
    }
}

/// Read one line (without the trailing newline); `None` at end of input.
fn read_line(r: &mut dyn Read) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte)? {
            0 => {
                if buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(buf));
            }
            _ => {
                if byte[0] == b'\n' {
                    return Ok(Some(buf));
                }
                buf.push(byte[0]);
            }
        }
    }
}

fn closed_error(fname: &str) -> RuntimeError {
    RuntimeError::new(format!("{}: file handle is closed", fname))
}

fn write_to(fname: &str, handle: &FileHandle, bytes: &[u8]) -> Result<(), RuntimeError> {
    let mut stream = handle.stream.borrow_mut();
    let result = match &mut *stream {
        Stream::File(Some(f)) => f.write_all(bytes),
        Stream::File(None) => return Err(closed_error(fname)),
        Stream::Stdout => std::io::stdout().write_all(bytes),
        Stream::Stderr => std::io::stderr().write_all(bytes),
        Stream::Stdin => {
            return Err(RuntimeError::new(format!(
                "{}: cannot write to standard input",
                fname
            )));
        }
    };
    result.map_err(|e| RuntimeError::new(format!("{}: write failed: {}", fname, e)))
}

fn native_getline(_vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
    match read_line(&mut std::io::stdin()) {
        Ok(Some(bytes)) => Ok(Value::String(std::rc::Rc::new(
            crate::string::SparkString::from_owned(bytes),
        ))),
        Ok(None) => Ok(Value::Nil),
        Err(e) => Err(RuntimeError::new(format!("getline: read failed: {}", e))),
    }
}

fn native_print(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut out = String::new();
    for v in args {
        out.push_str(&v.to_display_string());
    }
    out.push('\n');
    print!("{}", out);
    Ok(Value::Nil)
}

fn native_dbgprint(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut out = String::new();
    for v in args {
        out.push_str(&format!("{:?}", v));
    }
    out.push('\n');
    print!("{}", out);
    Ok(Value::Nil)
}

fn render_format(fname: &str, fmt_idx: usize, args: &[Value]) -> Result<String, RuntimeError> {
    let fmt = arg_string(fname, args, fmt_idx)?;
    format::render(&fmt.to_str_lossy(), &args[fmt_idx + 1..]).map_err(RuntimeError::from)
}

/// printf(fmt, ...) -> number of bytes written to stdout.
fn native_printf(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_min("printf", args, 1)?;
    let text = render_format("printf", 0, args)?;
    print!("{}", text);
    Ok(Value::Int(text.len() as i64))
}

/// fprintf(handle, fmt, ...) -> number of bytes written.
fn native_fprintf(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_min("fprintf", args, 2)?;
    let handle = handle_arg("fprintf", args, 0)?;
    let text = render_format("fprintf", 1, args)?;
    write_to("fprintf", handle, text.as_bytes())?;
    Ok(Value::Int(text.len() as i64))
}

/// fopen(name, mode) -> file handle, or nil when the file cannot be opened.
fn native_fopen(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fopen", args, 2)?;
    let name = arg_string("fopen", args, 0)?;
    let mode = arg_string("fopen", args, 1)?;

    let mut opts = OpenOptions::new();
    // The 'b' of C stdio modes is meaningless here and simply ignored
    match mode.to_str_lossy().trim_end_matches('b') {
        "r" => opts.read(true),
        "r+" => opts.read(true).write(true),
        "w" => opts.write(true).create(true).truncate(true),
        "w+" => opts.read(true).write(true).create(true).truncate(true),
        "a" => opts.append(true).create(true),
        "a+" => opts.read(true).append(true).create(true),
        other => {
            return Err(RuntimeError::new(format!(
                "fopen: invalid mode '{}'",
                other
            )));
        }
    };

    match opts.open(name.to_str_lossy().as_ref()) {
        Ok(f) => Ok(FileHandle {
            stream: RefCell::new(Stream::File(Some(f))),
        }
        .into_weak()),
        Err(_) => Ok(Value::Nil),
    }
}

/// fclose(handle): closes the stream; the standard streams are never closed.
fn native_fclose(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fclose", args, 1)?;
    let handle = handle_arg("fclose", args, 0)?;
    let mut stream = handle.stream.borrow_mut();
    if let Stream::File(f) = &mut *stream {
        *f = None;
    }
    Ok(Value::Nil)
}

fn native_fgetline(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fgetline", args, 1)?;
    let handle = handle_arg("fgetline", args, 0)?;
    let mut stream = handle.stream.borrow_mut();
    let result = match &mut *stream {
        Stream::File(Some(f)) => read_line(f),
        Stream::File(None) => return Err(closed_error("fgetline")),
        Stream::Stdin => read_line(&mut std::io::stdin()),
        _ => {
            return Err(RuntimeError::new(
                "fgetline: cannot read from an output stream",
            ));
        }
    };

    match result {
        Ok(Some(bytes)) => Ok(Value::String(std::rc::Rc::new(
            crate::string::SparkString::from_owned(bytes),
        ))),
        Ok(None) => Ok(Value::Nil),
        Err(e) => Err(RuntimeError::new(format!("fgetline: read failed: {}", e))),
    }
}

/// fread(handle, n) -> string of exactly n bytes, or nil on short read.
fn native_fread(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fread", args, 2)?;
    let handle = handle_arg("fread", args, 0)?;
    let n = arg_int("fread", args, 1)?;
    if n < 0 {
        return Err(RuntimeError::new("fread: byte count must not be negative"));
    }

    let mut buf = vec![0u8; n as usize];
    let mut stream = handle.stream.borrow_mut();
    let result = match &mut *stream {
        Stream::File(Some(f)) => f.read_exact(&mut buf),
        Stream::File(None) => return Err(closed_error("fread")),
        Stream::Stdin => std::io::stdin().read_exact(&mut buf),
        _ => return Err(RuntimeError::new("fread: cannot read from an output stream")),
    };

    match result {
        Ok(()) => Ok(Value::String(std::rc::Rc::new(
            crate::string::SparkString::from_owned(buf),
        ))),
        Err(_) => Ok(Value::Nil),
    }
}

/// fwrite(handle, str) -> whether the write succeeded.
fn native_fwrite(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fwrite", args, 2)?;
    let handle = handle_arg("fwrite", args, 0)?;
    let text = arg_string("fwrite", args, 1)?;
    Ok(Value::Bool(
        write_to("fwrite", handle, text.as_bytes()).is_ok(),
    ))
}

/// fflush(handle) or fflush(nil) for the standard output streams.
fn native_fflush(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fflush", args, 1)?;

    if args[0].is_nil() {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        return Ok(Value::Nil);
    }

    let handle = handle_arg("fflush", args, 0)?;
    let mut stream = handle.stream.borrow_mut();
    let result = match &mut *stream {
        Stream::File(Some(f)) => f.flush(),
        Stream::File(None) => return Err(closed_error("fflush")),
        Stream::Stdout => std::io::stdout().flush(),
        Stream::Stderr => std::io::stderr().flush(),
        Stream::Stdin => Ok(()),
    };
    result.map_err(|e| RuntimeError::new(format!("fflush: flush failed: {}", e)))?;
    Ok(Value::Nil)
}

fn native_ftell(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("ftell", args, 1)?;
    let handle = handle_arg("ftell", args, 0)?;
    let mut stream = handle.stream.borrow_mut();
    match &mut *stream {
        Stream::File(Some(f)) => f
            .stream_position()
            .map(|p| Value::Int(p as i64))
            .map_err(|e| RuntimeError::new(format!("ftell: {}", e))),
        Stream::File(None) => Err(closed_error("ftell")),
        _ => Err(RuntimeError::new("ftell: not a seekable stream")),
    }
}

/// fseek(handle, offset, whence) with whence one of "set", "cur", "end".
fn native_fseek(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fseek", args, 3)?;
    let handle = handle_arg("fseek", args, 0)?;
    let offset = arg_int("fseek", args, 1)?;
    let whence = arg_string("fseek", args, 2)?;

    let pos = match whence.to_str_lossy().as_ref() {
        "set" => SeekFrom::Start(offset.max(0) as u64),
        "cur" => SeekFrom::Current(offset),
        "end" => SeekFrom::End(offset),
        other => {
            return Err(RuntimeError::new(format!(
                "fseek: whence must be \"set\", \"cur\" or \"end\", got \"{}\"",
                other
            )));
        }
    };

    let mut stream = handle.stream.borrow_mut();
    match &mut *stream {
        Stream::File(Some(f)) => {
            f.seek(pos)
                .map_err(|e| RuntimeError::new(format!("fseek: {}", e)))?;
            Ok(Value::Nil)
        }
        Stream::File(None) => Err(closed_error("fseek")),
        _ => Err(RuntimeError::new("fseek: not a seekable stream")),
    }
}

/// feof(handle) -> whether the read position is at the end of the file.
fn native_feof(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("feof", args, 1)?;
    let handle = handle_arg("feof", args, 0)?;
    let mut stream = handle.stream.borrow_mut();
    match &mut *stream {
        Stream::File(Some(f)) => {
            let pos = f
                .stream_position()
                .map_err(|e| RuntimeError::new(format!("feof: {}", e)))?;
            let len = f
                .metadata()
                .map_err(|e| RuntimeError::new(format!("feof: {}", e)))?
                .len();
            Ok(Value::Bool(pos >= len))
        }
        Stream::File(None) => Err(closed_error("feof")),
        _ => Ok(Value::Bool(false)),
    }
}

fn native_remove(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("remove", args, 1)?;
    let name = arg_string("remove", args, 0)?;
    Ok(Value::Bool(
        std::fs::remove_file(name.to_str_lossy().as_ref()).is_ok(),
    ))
}

fn native_rename(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("rename", args, 2)?;
    let old = arg_string("rename", args, 0)?;
    let new = arg_string("rename", args, 1)?;
    Ok(Value::Bool(
        std::fs::rename(old.to_str_lossy().as_ref(), new.to_str_lossy().as_ref()).is_ok(),
    ))
}

/// tmpfile() -> handle to an anonymous read/write temporary file.
fn native_tmpfile(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("tmpfile", args, 0)?;

    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let path = std::env::temp_dir().join(format!(
        "sparkling-tmp-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| RuntimeError::new(format!("tmpfile: {}", e)))?;

    // Unlink immediately; the open handle keeps the data alive
    let _ = std::fs::remove_file(&path);

    Ok(FileHandle {
        stream: RefCell::new(Stream::File(Some(file))),
    }
    .into_weak())
}

/// readfile(name) -> the whole file as a string.
///
/// Newlines are preserved exactly as stored; only `getline`/`fgetline`
/// strip them.
fn native_readfile(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("readfile", args, 1)?;
    let name = arg_string("readfile", args, 0)?;
    match std::fs::read(name.to_str_lossy().as_ref()) {
        Ok(bytes) => Ok(Value::String(std::rc::Rc::new(
            crate::string::SparkString::from_owned(bytes),
        ))),
        Err(e) => Err(RuntimeError::new(format!(
            "can't read file `{}': {}",
            name.to_str_lossy(),
            e
        ))),
    }
}

pub fn load(vm: &mut Vm) {
    vm.add_lib_funcs(
        "",
        &[
            ("getline", native_getline),
            ("print", native_print),
            ("dbgprint", native_dbgprint),
            ("printf", native_printf),
            ("fopen", native_fopen),
            ("fclose", native_fclose),
            ("fprintf", native_fprintf),
            ("fgetline", native_fgetline),
            ("fread", native_fread),
            ("fwrite", native_fwrite),
            ("fflush", native_fflush),
            ("ftell", native_ftell),
            ("fseek", native_fseek),
            ("feof", native_feof),
            ("remove", native_remove),
            ("rename", native_rename),
            ("tmpfile", native_tmpfile),
            ("readfile", native_readfile),
        ],
    );

    // Standard streams as weak handles; the shells live for the process
    let streams = [
        ("stdin", Stream::Stdin),
        ("stdout", Stream::Stdout),
        ("stderr", Stream::Stderr),
    ];
    for (name, stream) in streams {
        let handle = FileHandle {
            stream: RefCell::new(stream),
        }
        .into_weak();
        vm.add_lib_values("", &[(name, handle)]);
    }
}
