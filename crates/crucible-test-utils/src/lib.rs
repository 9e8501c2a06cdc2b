//! Shared test utilities for crucible integration tests.
//!
//! Fake agent backends as shell scripts. Every backend program is
//! invoked as `program [args..] --input <file> --output <file>`, so
//! each generated script starts with the same argument-parsing
//! preamble that binds `$INPUT` and `$OUTPUT`.
//!
//! Unix-only, like the process-group handling these scripts exercise.

use std::path::{Path, PathBuf};

/// Write an executable `#!/bin/sh` script with the given body.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// Argument-parsing preamble shared by every fake backend.
const ARG_PREAMBLE: &str = r#"INPUT=""
OUTPUT=""
while [ $# -gt 0 ]; do
  case "$1" in
    --input) INPUT="$2"; shift 2 ;;
    --output) OUTPUT="$2"; shift 2 ;;
    *) shift ;;
  esac
done
"#;

/// Write a fake backend script. `body` runs with `$INPUT` and `$OUTPUT`
/// already bound to the exchange file paths.
pub fn write_backend_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    write_script(dir, name, &format!("{ARG_PREAMBLE}{body}"))
}

/// A backend that writes a fixed JSON document to its output file and
/// exits successfully.
pub fn json_backend(dir: &Path, name: &str, output: &serde_json::Value) -> PathBuf {
    let payload = output.to_string().replace('\'', "'\\''");
    write_backend_script(dir, name, &format!("printf '%s' '{payload}' > \"$OUTPUT\"\n"))
}

/// A backend that exits with `code` after printing `stderr_msg` to
/// stderr. Never produces output.
pub fn failing_backend(dir: &Path, name: &str, code: i32, stderr_msg: &str) -> PathBuf {
    write_backend_script(
        dir,
        name,
        &format!("echo '{stderr_msg}' >&2\nexit {code}\n"),
    )
}

/// A backend that spawns a background child, records both pids to
/// `pidfile` (parent first, child second, one per line), then sleeps.
///
/// Used to verify that timeouts and cancellation kill the whole
/// process tree, not just the direct child.
pub fn sleeping_backend(dir: &Path, name: &str, sleep_secs: u64, pidfile: &Path) -> PathBuf {
    let pidfile = pidfile.display();
    write_backend_script(
        dir,
        name,
        &format!(
            "sleep {sleep_secs} &\nCHILD=$!\necho $$ > \"{pidfile}\"\necho $CHILD >> \"{pidfile}\"\nwait $CHILD\n"
        ),
    )
}

/// A designer backend that bumps a counter file on every call and
/// emits a draft artifact whose HTML carries the call number.
pub fn counting_designer(dir: &Path, name: &str, counter: &Path) -> PathBuf {
    let counter = counter.display();
    write_backend_script(
        dir,
        name,
        &format!(
            "N=0\n[ -f \"{counter}\" ] && N=$(cat \"{counter}\")\nN=$((N+1))\nprintf '%s' \"$N\" > \"{counter}\"\nprintf '{{\"html\":\"<h1>draft %s</h1>\",\"css\":\"h1 {{ color: teal; }}\",\"js\":\"\"}}' \"$N\" > \"$OUTPUT\"\n"
        ),
    )
}

/// A validator backend that bumps a counter file and answers with a
/// fixed response text.
pub fn responding_validator(dir: &Path, name: &str, counter: &Path, response: &str) -> PathBuf {
    let counter = counter.display();
    write_backend_script(
        dir,
        name,
        &format!(
            "N=0\n[ -f \"{counter}\" ] && N=$(cat \"{counter}\")\nN=$((N+1))\nprintf '%s' \"$N\" > \"{counter}\"\nprintf '{{\"response\":\"{response}\"}}' > \"$OUTPUT\"\n"
        ),
    )
}

/// A validator backend that copies its full input payload (the `input`
/// field of the wire file, extracted with `jq`) to `capture` before
/// answering, so tests can inspect exactly what it was sent.
pub fn capturing_validator(dir: &Path, name: &str, capture: &Path, response: &str) -> PathBuf {
    let capture = capture.display();
    write_backend_script(
        dir,
        name,
        &format!(
            "jq '.input' \"$INPUT\" > \"{capture}\"\nprintf '{{\"response\":\"{response}\"}}' > \"$OUTPUT\"\n"
        ),
    )
}

/// A fake headless browser. Understands `--screenshot=<path>` the way
/// chromium does and writes placeholder bytes there.
pub fn fake_browser(dir: &Path, name: &str) -> PathBuf {
    write_script(
        dir,
        name,
        "for a in \"$@\"; do\n  case \"$a\" in\n    --screenshot=*) printf 'fake png bytes' > \"${a#--screenshot=}\" ;;\n  esac\ndone\n",
    )
}

/// A browser that always fails to render.
pub fn broken_browser(dir: &Path, name: &str) -> PathBuf {
    write_script(dir, name, "echo 'render crashed' >&2\nexit 1\n")
}

/// Read a counter file written by the counting scripts. Missing or
/// empty file reads as zero.
pub fn read_count(counter: &Path) -> u32 {
    std::fs::read_to_string(counter)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Whether a process is still alive, by signal 0.
#[cfg(unix)]
pub fn process_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}
