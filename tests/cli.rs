use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn tubular() -> Command {
    Command::cargo_bin("tubular").unwrap()
}

#[test]
fn help_exits_zero() {
    tubular()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn missing_input_file_exits_one() {
    tubular()
        .arg("no-such-file.tub")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unable to open file"));
}

#[test]
fn compiles_counted_loop_to_a_module() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .assert()
        .success()
        .stdout(predicate::str::contains("(module"))
        .stdout(predicate::str::contains("(memory (export \"memory\") 1)"))
        .stdout(predicate::str::contains("(func $main (export \"main\")"))
        .stdout(predicate::str::contains("(func $_strcat "));
}

#[test]
fn compiles_with_all_optimizations_disabled() {
    tubular()
        .arg(demo("fact.tub"))
        .args(["--no-inline", "--no-unroll", "--tail=off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(func $fact_acc (export \"fact_acc\")"));
}

#[test]
fn compiles_with_reordered_passes() {
    tubular()
        .arg(demo("fact.tub"))
        .arg("--pass-order=tail,inline,unroll")
        .assert()
        .success()
        .stdout(predicate::str::contains("(module"));
}

#[test]
fn compiles_string_helpers_program() {
    tubular()
        .arg(demo("strings.tub"))
        .assert()
        .success()
        .stdout(predicate::str::contains("(call $_repeat_string)"))
        .stdout(predicate::str::contains("(call $_str_cmp)"));
}

#[test]
fn duplicate_pass_order_exits_one_before_compiling() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .arg("--pass-order=inline,inline,tail")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate pass 'inline'"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn incomplete_pass_order_exits_one() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .arg("--pass-order=inline,tail")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "--pass-order must specify inline, unroll, and tail exactly once.",
        ));
}

#[test]
fn unknown_pass_name_exits_one() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .arg("--pass-order=inline,unroll,fuse")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown pass 'fuse'"));
}

#[test]
fn out_of_range_unroll_factor_exits_one() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .arg("--unroll-factor=20")
        .assert()
        .failure();
}

#[test]
fn repeated_unroll_factor_exits_one() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .args(["--unroll-factor=4", "--unroll-factor=8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate --unroll-factor"));
}

#[test]
fn no_unroll_conflicts_with_larger_factor() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .args(["--no-unroll", "--unroll-factor=4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot combine --no-unroll"));
}

#[test]
fn no_unroll_with_factor_one_is_valid() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .args(["--no-unroll", "--unroll-factor=1"])
        .assert()
        .success();
}

#[test]
fn conflicting_tail_modes_exit_one() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .args(["--tail=loop", "--tail=off"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conflicting --tail options"));
}

#[test]
fn unknown_flag_exits_one() {
    tubular()
        .arg(demo("sum_loop.tub"))
        .arg("--frobnicate")
        .assert()
        .failure();
}

#[test]
fn parse_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.tub");
    std::fs::write(&path, "function broken( {\n").unwrap();

    tubular().arg(path).assert().failure();
}

#[test]
fn missing_return_path_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noreturn.tub");
    std::fs::write(
        &path,
        "function f(int n) : int { if (n < 0) return 0; }\n",
    )
    .unwrap();

    tubular()
        .arg(path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("must guarantee a return statement"));
}

#[test]
fn unrolled_output_still_contains_the_remainder_loop() {
    // The main loop and the remainder loop both lower to block/loop pairs
    tubular()
        .arg(demo("sum_loop.tub"))
        .arg("--unroll-factor=4")
        .assert()
        .success()
        .stdout(predicate::str::contains("(block $exit0"))
        .stdout(predicate::str::contains("(block $exit1"));
}

#[test]
fn tail_loopified_output_gains_a_synthetic_loop() {
    // With --tail=off fact_acc keeps its recursive call; with the default
    // loopification the self-call disappears in favor of a loop branch
    tubular()
        .arg(demo("fact.tub"))
        .args(["--no-inline", "--no-unroll", "--tail=off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(call $fact_acc)"));

    tubular()
        .arg(demo("fact.tub"))
        .args(["--no-inline", "--no-unroll", "--tail=loop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(br $loop0)"));
}
