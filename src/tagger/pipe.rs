//! Running a child process fed from a list of lines.

use std::{
    io::{self, Read, Write},
    path::Path,
    process::{Command, Stdio},
    sync::LazyLock,
    thread,
};

use regex::Regex;

use super::TaggerError;

static UNSAFE_SHELL_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_@%+=:,./-]").expect("shell char regex is valid"));

/// Runs `program`, writing each input line to its stdin while collecting its
/// stdout.
///
/// Errors are reported in order of precedence: failing to write the input,
/// failing to read the output, then an unsuccessful exit status.
pub(super) fn run_with_input(
    program: &Path,
    args: &[&str],
    input: &[String],
) -> Result<String, TaggerError> {
    let command = escape_command(program, args);
    tracing::debug!("Executing: {command}");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| TaggerError::Unavailable {
            program: program.display().to_string(),
            source,
        })?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (written, read, errors) = thread::scope(|scope| {
        let writer = scope.spawn(move || write_lines(stdin, input));
        let error_reader = scope.spawn(move || read_all(stderr));
        let read = read_all(stdout);
        (
            join(writer),
            read,
            join(error_reader).unwrap_or_default(),
        )
    });

    let status = child.wait().map_err(|source| TaggerError::Output {
        command: command.clone(),
        source,
    })?;

    written.map_err(|source| TaggerError::Input {
        command: command.clone(),
        source,
    })?;
    let output = read.map_err(|source| TaggerError::Output {
        command: command.clone(),
        source,
    })?;
    if !status.success() {
        return Err(TaggerError::Failed {
            command,
            status,
            stderr: errors,
        });
    }
    Ok(output)
}

/// Runs `program` with no input and returns its stdout.
pub(super) fn run(program: &Path, args: &[&str]) -> Result<String, TaggerError> {
    run_with_input(program, args, &[])
}

fn write_lines(stdin: Option<impl Write>, lines: &[String]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    for line in lines {
        writeln!(stdin, "{line}")?;
    }
    stdin.flush()
}

fn read_all(pipe: Option<impl Read>) -> io::Result<String> {
    let mut text = String::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_string(&mut text)?;
    }
    Ok(text)
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe thread panicked")))
}

/// Formats a command line so that it can be pasted into a shell.
fn escape_command(program: &Path, args: &[&str]) -> String {
    let program = program.to_string_lossy();
    std::iter::once(program.as_ref())
        .chain(args.iter().copied())
        .map(escape_arg)
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_arg(arg: &str) -> String {
    if UNSAFE_SHELL_CHAR.is_match(arg) {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("--fields=n", "--fields=n"; "safe")]
    #[test_case("-", "-"; "dash")]
    #[test_case("a b", "'a b'"; "space")]
    #[test_case("it's", r#"'it'"'"'s'"#; "quote")]
    fn shell_escaping(arg: &str, expected: &str) {
        assert_eq!(escape_arg(arg), expected);
    }

    #[test]
    fn command_line() {
        assert_eq!(
            escape_command(Path::new("/usr/bin/ctags"), &["-f", "-", "--kinds-C=f"]),
            "/usr/bin/ctags -f - --kinds-C=f"
        );
    }

    #[cfg(unix)]
    #[test]
    fn input_is_echoed() {
        let output = run_with_input(
            Path::new("cat"),
            &[],
            &["first".to_string(), "second".to_string()],
        )
        .unwrap();
        assert_eq!(output, "first\nsecond\n");
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_is_checked() {
        let error = run(Path::new("false"), &[]).unwrap_err();
        assert!(matches!(error, TaggerError::Failed { .. }));
    }

    #[test]
    fn missing_program() {
        let error = run(Path::new("definitely-not-a-real-program-4711"), &[]).unwrap_err();
        assert!(matches!(error, TaggerError::Unavailable { .. }));
    }
}
