//! Reset command implementation.

use crate::cli::ResetArgs;
use crate::error::Result;
use crate::output::Formatter;
use billsort_pipeline::ProgressLedger;
use std::io::{self, BufRead, Write};

/// Execute the reset command.
pub fn execute_reset(args: ResetArgs, formatter: &Formatter) -> Result<()> {
    let ledger = ProgressLedger::new(&args.output);
    if !ledger.path().exists() {
        println!(
            "{}",
            formatter.info(&format!("No progress ledger in {}", args.output.display()))
        );
        return Ok(());
    }

    // Confirm deletion unless --yes is specified
    if !args.yes {
        let stdin = io::stdin();
        let prompt = format!(
            "Delete {}? The next run will reprocess every file. [y/N]: ",
            ledger.path().display()
        );
        if !confirm(&prompt, &mut stdin.lock(), &mut io::stdout())? {
            println!("{}", formatter.info("Operation cancelled"));
            return Ok(());
        }
    }

    ledger.clear()?;
    println!(
        "{}",
        formatter.success(&format!("Removed {}", ledger.path().display()))
    );
    Ok(())
}

/// Ask `prompt` and read a yes/no answer; anything but `y`/`yes` is no.
fn confirm<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "{}", prompt)?;
    output.flush()?;

    let mut response = String::new();
    input.read_line(&mut response)?;
    let answer = response.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use billsort_pipeline::RunSettings;
    use std::io::Cursor;
    use std::path::Path;

    #[test]
    fn test_confirm_answers() {
        let mut out = Vec::new();
        assert!(confirm("? ", &mut Cursor::new("y\n"), &mut out).unwrap());
        assert!(confirm("? ", &mut Cursor::new("YES\n"), &mut out).unwrap());
        assert!(!confirm("? ", &mut Cursor::new("\n"), &mut out).unwrap());
        assert!(!confirm("? ", &mut Cursor::new(""), &mut out).unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), "? ? ? ? ");
    }

    #[test]
    fn test_reset_removes_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::new(dir.path());
        ledger.init(Path::new("/in"), 1, RunSettings::default());
        assert!(ledger.path().exists());

        let args = ResetArgs {
            output: dir.path().to_path_buf(),
            yes: true,
        };
        execute_reset(args, &Formatter::new(OutputFormat::Quiet, false)).unwrap();
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_reset_without_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let args = ResetArgs {
            output: dir.path().to_path_buf(),
            yes: true,
        };
        assert!(execute_reset(args, &Formatter::new(OutputFormat::Quiet, false)).is_ok());
    }
}
