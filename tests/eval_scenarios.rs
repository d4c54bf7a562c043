//! End-to-end scenarios driven through the `cjsh` binary with `-c`.

use assert_cmd::Command;
use predicates::prelude::*;

fn cjsh(script: &str) -> Command {
    let mut cmd = Command::cargo_bin("cjsh").expect("binary builds");
    cmd.arg("-c").arg(script);
    cmd.env("PATH", "/usr/bin:/bin");
    cmd
}

#[test]
fn echo_prints_its_argument() {
    cjsh("echo hello").assert().success().stdout("hello\n");
}

#[test]
fn assignments_then_expansion() {
    cjsh("A=1 B=2; echo $A-$B")
        .assert()
        .success()
        .stdout("1-2\n");
}

#[test]
fn for_loop_iterates_in_source_order() {
    cjsh("for i in 1 2 3; do echo $i; done")
        .assert()
        .success()
        .stdout("1\n2\n3\n");
}

#[test]
fn pipeline_links_stdout_to_stdin() {
    cjsh("echo a|tr a-z A-Z").assert().success().stdout("A\n");
}

#[test]
fn local_variable_shadows_global() {
    cjsh("f() { local x=9; echo $x; }; x=1; f; echo $x")
        .assert()
        .success()
        .stdout("9\n1\n");
}

#[test]
fn errexit_terminates_the_script() {
    cjsh("set -e; false; echo unreached")
        .assert()
        .code(1)
        .stdout("");
}

#[test]
fn case_selects_the_first_matching_arm() {
    cjsh("case foo in f*) echo yes;; *) echo no;; esac")
        .assert()
        .success()
        .stdout("yes\n");
}

#[test]
fn default_expansion_when_unset() {
    cjsh("echo \"${NOPE:-default}\"")
        .assert()
        .success()
        .stdout("default\n");
}

#[test]
fn background_job_appears_in_jobs_listing() {
    cjsh("sleep 0.1 & jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("sleep"));
}

#[test]
fn arithmetic_respects_precedence() {
    cjsh("echo $((2+3*4))").assert().success().stdout("14\n");
}

// --- status flow laws -------------------------------------------------------

#[test]
fn false_sets_dollar_question_to_one() {
    cjsh("false; echo $?").assert().success().stdout("1\n");
}

#[test]
fn subshell_exit_status_is_observable() {
    cjsh("(exit 7); echo $?").assert().success().stdout("7\n");
}

#[test]
fn exit_code_of_dash_c_is_last_status() {
    cjsh("exit 42").assert().code(42);
    cjsh("true").assert().code(0);
    cjsh("false").assert().code(1);
}

#[test]
fn syntax_error_exits_2() {
    cjsh("if then").assert().code(2);
}

#[test]
fn command_not_found_exits_127() {
    cjsh("definitely-no-such-command-xyz 2>/dev/null")
        .assert()
        .code(127);
}

// --- quoting and here-docs --------------------------------------------------

#[test]
fn single_quotes_round_trip_verbatim() {
    cjsh("echo 'no $EXPANSION here'")
        .assert()
        .success()
        .stdout("no $EXPANSION here\n");
}

#[test]
fn double_quotes_preserve_inner_spacing() {
    cjsh("V='a  b'; echo \"$V\"")
        .assert()
        .success()
        .stdout("a  b\n");
}

#[test]
fn heredoc_with_quoted_delimiter_is_verbatim() {
    cjsh("cat <<'EOF'\n$HOME stays literal\nEOF")
        .assert()
        .success()
        .stdout("$HOME stays literal\n");
}

#[test]
fn heredoc_with_unquoted_delimiter_expands() {
    cjsh("X=inner; cat <<EOF\nvalue: $X\nEOF")
        .assert()
        .success()
        .stdout("value: inner\n");
}

#[test]
fn herestring_feeds_stdin() {
    cjsh("cat <<< hello").assert().success().stdout("hello\n");
}

#[test]
fn unterminated_heredoc_is_a_syntax_error() {
    cjsh("cat <<EOF\nno end").assert().code(2);
}

// --- expansion boundaries ---------------------------------------------------

#[test]
fn glob_without_matches_stays_literal() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("cjsh").unwrap();
    cmd.current_dir(dir.path());
    cmd.env("PATH", "/usr/bin:/bin");
    cmd.arg("-c").arg("echo *.nomatch");
    cmd.assert().success().stdout("*.nomatch\n");
}

#[test]
fn glob_expands_against_real_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "").unwrap();
    std::fs::write(dir.path().join("b.txt"), "").unwrap();
    let mut cmd = Command::cargo_bin("cjsh").unwrap();
    cmd.current_dir(dir.path());
    cmd.env("PATH", "/usr/bin:/bin");
    cmd.arg("-c").arg("echo *.txt");
    cmd.assert().success().stdout("a.txt b.txt\n");
}

#[test]
fn brace_expansion_product() {
    cjsh("echo x{a,b}y").assert().success().stdout("xay xby\n");
}

#[test]
fn brace_range_expands() {
    cjsh("echo {1..5}")
        .assert()
        .success()
        .stdout("1 2 3 4 5\n");
}

#[test]
fn oversized_brace_range_stays_literal() {
    cjsh("echo {1..99999999999}")
        .assert()
        .success()
        .stdout(predicate::str::contains("{1..99999999999}"));
}

#[test]
fn word_splitting_honors_ifs() {
    cjsh("V='a:b:c'; IFS=:; for p in $V; do echo $p; done")
        .assert()
        .success()
        .stdout("a\nb\nc\n");
}

#[test]
fn quoted_at_preserves_argument_boundaries() {
    cjsh(r#"f() { echo $#; }; set -- "a b" c; f "$@""#)
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn parameter_strip_and_replace() {
    cjsh("P=a/b/c.txt; echo ${P##*/} ${P%.txt}")
        .assert()
        .success()
        .stdout("c.txt a/b/c\n");
    cjsh("V=aaa; echo ${V/a/b} ${V//a/b}")
        .assert()
        .success()
        .stdout("baa bbb\n");
}

#[test]
fn case_conversion_ops() {
    cjsh("V=word; echo ${V^} ${V^^}")
        .assert()
        .success()
        .stdout("Word WORD\n");
}

#[test]
fn indirect_expansion() {
    cjsh("ref=target; target=found; echo ${!ref}")
        .assert()
        .success()
        .stdout("found\n");
}

// --- cd / pwd ---------------------------------------------------------------

#[test]
fn cd_with_no_args_goes_home() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("cjsh").unwrap();
    cmd.env("PATH", "/usr/bin:/bin");
    cmd.env("HOME", dir.path());
    cmd.arg("-c").arg("cd; pwd");
    let home = dir.path().to_string_lossy().to_string();
    cmd.assert().success().stdout(predicate::str::contains(home));
}

#[test]
fn cd_dash_returns_and_prints_oldpwd() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let script = format!(
        "cd {}; cd {}; cd - >/dev/null; pwd",
        a.path().display(),
        b.path().display()
    );
    cjsh(&script).assert().success().stdout(predicate::str::contains(
        a.path().file_name().unwrap().to_string_lossy().to_string(),
    ));
}

#[test]
fn cd_to_missing_directory_fails_without_state_change() {
    cjsh("cd /definitely/not/here 2>/dev/null; echo $?")
        .assert()
        .success()
        .stdout("1\n");
}

// --- control flow -----------------------------------------------------------

#[test]
fn break_and_continue() {
    cjsh("for i in 1 2 3; do [ $i = 2 ] && break; echo $i; done")
        .assert()
        .success()
        .stdout("1\n");
    cjsh("for i in 1 2 3; do [ $i = 2 ] && continue; echo $i; done")
        .assert()
        .success()
        .stdout("1\n3\n");
}

#[test]
fn return_sets_function_status() {
    cjsh("f() { return 5; }; f; echo $?")
        .assert()
        .success()
        .stdout("5\n");
}

#[test]
fn while_loop_with_counter() {
    cjsh("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done")
        .assert()
        .success()
        .stdout("0\n1\n2\n");
}

#[test]
fn until_loop_runs_while_condition_fails() {
    cjsh("i=0; until [ $i -ge 2 ]; do echo $i; i=$((i+1)); done")
        .assert()
        .success()
        .stdout("0\n1\n");
}

#[test]
fn conditional_command_pattern_match() {
    cjsh("[[ hello == h* ]] && echo matched")
        .assert()
        .success()
        .stdout("matched\n");
}

#[test]
fn negation_inverts_pipeline_status() {
    cjsh("! false").assert().code(0);
    cjsh("! true").assert().code(1);
}

#[test]
fn pipefail_reports_rightmost_failure() {
    cjsh("set -o pipefail; false | true").assert().code(1);
}

#[test]
fn arithmetic_for_loop() {
    cjsh("for ((i=0; i<3; i++)); do echo $i; done")
        .assert()
        .success()
        .stdout("0\n1\n2\n");
}

// --- command substitution ---------------------------------------------------

#[test]
fn command_substitution_trims_trailing_newlines() {
    cjsh("echo \"[$(echo inner)]\"")
        .assert()
        .success()
        .stdout("[inner]\n");
}

#[test]
fn command_substitution_of_external_output() {
    cjsh("x=$(echo one two | tr a-z A-Z); echo $x")
        .assert()
        .success()
        .stdout("ONE TWO\n");
}

#[test]
fn backtick_substitution() {
    cjsh("echo `echo legacy`")
        .assert()
        .success()
        .stdout("legacy\n");
}

// --- redirections -----------------------------------------------------------

#[test]
fn output_redirection_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("out.txt");
    let script = format!("echo content > {}", file.display());
    cjsh(&script).assert().success();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "content\n");
}

#[test]
fn append_redirection_appends() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("out.txt");
    let script = format!("echo one > {f}; echo two >> {f}", f = file.display());
    cjsh(&script).assert().success();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "one\ntwo\n");
}

#[test]
fn input_redirection_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("in.txt");
    std::fs::write(&file, "from file\n").unwrap();
    let script = format!("cat < {}", file.display());
    cjsh(&script).assert().success().stdout("from file\n");
}

#[test]
fn stderr_merges_into_stdout_with_dup() {
    cjsh("sh -c 'echo oops >&2' 2>&1 | cat")
        .assert()
        .success()
        .stdout("oops\n");
}

#[test]
fn noclobber_blocks_plain_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("exists.txt");
    std::fs::write(&file, "original").unwrap();
    let script = format!("set -C; echo new > {} 2>/dev/null", file.display());
    cjsh(&script).assert().code(1);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");
}

// --- aliases, functions, builtins ------------------------------------------

#[test]
fn alias_expands_at_command_position() {
    cjsh("alias greet='echo hi'; greet there")
        .assert()
        .success()
        .stdout("hi there\n");
}

#[test]
fn readonly_variable_rejects_rewrite() {
    cjsh("readonly RO=1; RO=2 2>/dev/null; echo $RO")
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn unknown_command_reports_not_found() {
    cjsh("ehco hi")
        .assert()
        .code(127)
        .stderr(predicate::str::contains("command not found"));
}

#[test]
fn type_classifies_builtins() {
    cjsh("type echo")
        .assert()
        .success()
        .stdout(predicate::str::contains("shell builtin"));
}

// --- scripts from files -----------------------------------------------------

#[test]
fn script_file_receives_positional_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("args.sh");
    std::fs::write(&script, "echo $0:$1:$2:$#\n").unwrap();
    let mut cmd = Command::cargo_bin("cjsh").unwrap();
    cmd.env("PATH", "/usr/bin:/bin");
    cmd.arg(script.to_string_lossy().to_string())
        .arg("first")
        .arg("second");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("first:second:2"));
}

#[test]
fn missing_script_file_exits_127() {
    let mut cmd = Command::cargo_bin("cjsh").unwrap();
    cmd.env("PATH", "/usr/bin:/bin");
    cmd.arg("/definitely/no/such/script.sh");
    cmd.assert().code(127);
}

#[test]
fn stdin_script_is_evaluated() {
    let mut cmd = Command::cargo_bin("cjsh").unwrap();
    cmd.env("PATH", "/usr/bin:/bin");
    cmd.write_stdin("echo from-stdin\n");
    cmd.assert().success().stdout("from-stdin\n");
}

#[test]
fn source_builtin_runs_in_current_shell() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("lib.sh");
    std::fs::write(&script, "SOURCED=yes\n").unwrap();
    let cmdline = format!(". {}; echo $SOURCED", script.display());
    cjsh(&cmdline).assert().success().stdout("yes\n");
}
