use std::{
    fs,
    path::Path,
    process::{Command, Output},
};

use freezec::{marshal::core::loads, runtime::vm::Interpreter};
use pretty_assertions::assert_eq;

fn freeze_module(args: &[&Path]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_freeze_module"))
        .args(args)
        .env_remove("FREEZE_LOG")
        .output()
        .expect("failed to run freeze_module")
}

fn run(input: &Path, output: &Path, module: &str) -> Output {
    freeze_module(&[input, output, Path::new(module)])
}

fn array_bytes(text: &str) -> Vec<u8> {
    let (_, body) = text.split_once('{').expect("array opener");
    let (body, _) = body.rsplit_once("};").expect("array closer");
    body.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().expect("decimal byte"))
        .collect()
}

#[test]
fn freezes_print_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("greet.py");
    let output = dir.path().join("greet.h");
    fs::write(&input, "print(1)\n").unwrap();

    let result = run(&input, &output, "greet");
    assert!(result.status.success(), "{result:?}");

    let stdout = String::from_utf8(result.stdout).unwrap();
    assert_eq!(
        stdout,
        format!(
            "input: {}\noutput: {}\nmodule: greet\n",
            input.display(),
            output.display()
        )
    );

    let text = fs::read_to_string(&output).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("/* Auto-generated by freeze_module */"));
    assert_eq!(lines.next(), Some("const unsigned char M_greet[] = {"));
    assert_eq!(text.lines().last(), Some("};"));
    for row in text.lines().filter(|l| l.starts_with("    ")) {
        assert!(row.matches(',').count() <= 16);
    }

    let mut vm = Interpreter::new(Vec::new());
    vm.run_image("greet", &array_bytes(&text)).unwrap();
    assert_eq!(String::from_utf8(vm.into_output()).unwrap(), "1\n");
}

#[test]
fn runs_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("boot.py");
    fs::write(
        &input,
        "def greet(name):\n    return 'hello ' + name\n\nprint(greet('world'))\n",
    )
    .unwrap();
    let first = dir.path().join("a.h");
    let second = dir.path().join("b.h");

    assert!(run(&input, &first, "boot").status.success());
    assert!(run(&input, &second, "boot").status.success());
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn frozen_code_matches_direct_execution() {
    let src = "\
i = 0
acc = ''
while i < 5:
    acc = acc + str(i * i)
    i = i + 1
print(acc, len(acc), -7 // 2)
";
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("loop.py");
    let output = dir.path().join("loop.h");
    fs::write(&input, src).unwrap();
    assert!(run(&input, &output, "loop").status.success());

    let frozen = array_bytes(&fs::read_to_string(&output).unwrap());
    let mut from_image = Interpreter::new(Vec::new());
    from_image.run_image("loop", &frozen).unwrap();

    let unit = freezec::compiler::core::compile(
        src,
        "<frozen loop>",
        freezec::compiler::core::CompileOptions::default(),
    )
    .unwrap();
    assert_eq!(loads(&frozen).unwrap(), unit);
    let mut direct = Interpreter::new(Vec::new());
    direct.run("loop", &unit).unwrap();

    assert_eq!(from_image.into_output(), direct.into_output());
}

#[test]
fn empty_input_is_a_valid_module() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.py");
    let output = dir.path().join("empty.h");
    fs::write(&input, "").unwrap();

    assert!(run(&input, &output, "empty").status.success());
    let bytes = array_bytes(&fs::read_to_string(&output).unwrap());
    let mut vm = Interpreter::new(Vec::new());
    vm.run_image("empty", &bytes).unwrap();
    assert!(vm.into_output().is_empty());
}

#[test]
fn missing_input_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("does_not_exist.py");
    let output = dir.path().join("out.h");

    let result = run(&input, &output, "m");
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains(&input.display().to_string()),
        "stderr: {stderr}"
    );
    assert!(!output.exists());
}

#[test]
fn syntax_error_keeps_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.py");
    let output = dir.path().join("broken.h");
    fs::write(&input, "def f(:\n    pass\n").unwrap();
    fs::write(&output, "/* previous build */\n").unwrap();

    let result = run(&input, &output, "broken");
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("<frozen broken>"), "stderr: {stderr}");
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "/* previous build */\n"
    );
}

#[test]
fn syntax_error_creates_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.py");
    let output = dir.path().join("broken.h");
    fs::write(&input, "x = = 1\n").unwrap();

    assert_eq!(run(&input, &output, "broken").status.code(), Some(1));
    assert!(!output.exists());
}

#[test]
fn overlong_module_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("m.py");
    let output = dir.path().join("m.h");
    fs::write(&input, "pass\n").unwrap();

    let result = run(&input, &output, &"n".repeat(118));
    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("at most 126 allowed"));
    assert!(!output.exists());

    // 117 bytes plus "<frozen >" is exactly 126.
    assert!(run(&input, &output, &"n".repeat(117)).status.success());
}

#[test]
fn wrong_argument_count_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("m.py");

    let result = freeze_module(&[&input]);
    assert_eq!(result.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&result.stderr).contains("Usage"));

    let extra = freeze_module(&[&input, &input, &input, &input]);
    assert_eq!(extra.status.code(), Some(2));
}

#[test]
fn deeply_nested_input_is_a_syntax_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("deep.py");
    let output = dir.path().join("deep.h");

    for src in [
        format!("x = {}1{}\n", "(".repeat(1000), ")".repeat(1000)),
        format!("x = {}1\n", "-".repeat(50_000)),
        format!("x = {}True\n", "not ".repeat(50_000)),
    ] {
        fs::write(&input, src).unwrap();
        let result = run(&input, &output, "deep");
        assert_eq!(result.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&result.stderr);
        assert!(stderr.contains("nested too deeply"), "stderr: {stderr}");
        assert!(!output.exists());
    }
}

#[cfg(target_os = "linux")]
#[test]
fn write_failure_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("m.py");
    fs::write(&input, "x = 'payload'\n").unwrap();

    let result = run(&input, Path::new("/dev/full"), "m");
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("error when writing to '/dev/full'"),
        "stderr: {stderr}"
    );
}

#[test]
fn optimize_variable_needs_use_environment() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("checked.py");
    let output = dir.path().join("checked.h");
    fs::write(&input, "assert False\nprint('ok')\n").unwrap();
    let freeze = |extra: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_freeze_module"))
            .args(extra)
            .args([&input, &output])
            .arg("checked")
            .env("FREEZE_OPTIMIZE", "1")
            .env_remove("FREEZE_LOG")
            .output()
            .expect("failed to run freeze_module")
    };
    let run_frozen = || {
        let bytes = array_bytes(&fs::read_to_string(&output).unwrap());
        let mut vm = Interpreter::new(Vec::new());
        vm.run_image("checked", &bytes).map(|_| vm.into_output())
    };

    assert!(freeze(&[]).status.success());
    let err = run_frozen().unwrap_err();
    assert_eq!(err.kind.to_string(), "AssertionError");

    assert!(freeze(&["--use-environment"]).status.success());
    assert_eq!(run_frozen().unwrap(), b"ok\n");
}
