//! Interactive prompting for connection details the user left out.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{bail, Context, Result};
use secrecy::SecretString;

pub trait Prompter {
    /// Ask for a visible, non-empty value.
    fn ask(&mut self, label: &str) -> Result<String>;

    /// Ask for a value that may be left blank.
    fn ask_optional(&mut self, label: &str) -> Result<Option<String>>;

    /// Ask for a secret without echoing it.
    fn password(&mut self, label: &str) -> Result<SecretString>;
}

/// Prompts on stderr and reads from the controlling terminal.
pub struct Terminal;

impl Terminal {
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }
}

impl Prompter for Terminal {
    fn ask(&mut self, label: &str) -> Result<String> {
        let stdin = io::stdin();
        ask_with(&mut stdin.lock(), &mut io::stderr(), label)
    }

    fn ask_optional(&mut self, label: &str) -> Result<Option<String>> {
        let stdin = io::stdin();
        ask_optional_with(&mut stdin.lock(), &mut io::stderr(), label)
    }

    fn password(&mut self, label: &str) -> Result<SecretString> {
        eprint!("{label}: ");
        let password = rpassword::read_password().context("reading password")?;
        Ok(SecretString::from(password))
    }
}

/// Refuses to prompt; used with `--no-prompt` or when stdin is not a terminal.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn ask(&mut self, label: &str) -> Result<String> {
        bail!("{label} is required (pass it as a flag or in a profile)")
    }

    fn ask_optional(&mut self, _label: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn password(&mut self, label: &str) -> Result<SecretString> {
        bail!("{label} is required (set SYSCHECK_PASSWORD or run interactively)")
    }
}

/// Repeat the question until a non-blank answer arrives. End of input is an error.
pub fn ask_with<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> Result<String> {
    loop {
        write!(output, "{label}: ").context("writing prompt")?;
        output.flush().context("writing prompt")?;

        let mut line = String::new();
        if input.read_line(&mut line).context("reading answer")? == 0 {
            bail!("no answer for {label} (end of input)");
        }
        let answer = line.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
    }
}

/// One line, blank meaning "none". End of input also means "none".
pub fn ask_optional_with<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
) -> Result<Option<String>> {
    write!(output, "{label}: ").context("writing prompt")?;
    output.flush().context("writing prompt")?;

    let mut line = String::new();
    input.read_line(&mut line).context("reading answer")?;
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_answers() {
        let mut input = io::Cursor::new("\n   \nexample.com\n");
        let mut output = Vec::new();
        let answer = ask_with(&mut input, &mut output, "Host").unwrap();
        assert_eq!(answer, "example.com");
        assert_eq!(String::from_utf8(output).unwrap(), "Host: Host: Host: ");
    }

    #[test]
    fn end_of_input_is_an_error() {
        let mut input = io::Cursor::new("");
        let mut output = Vec::new();
        let err = ask_with(&mut input, &mut output, "OS").unwrap_err();
        assert!(err.to_string().contains("OS"));
    }

    #[test]
    fn optional_answer_may_be_blank() {
        let mut output = Vec::new();
        let none = ask_optional_with(&mut io::Cursor::new("\n"), &mut output, "Domain").unwrap();
        assert_eq!(none, None);
        let some = ask_optional_with(&mut io::Cursor::new(" CORP \n"), &mut output, "Domain").unwrap();
        assert_eq!(some.as_deref(), Some("CORP"));
    }

    #[test]
    fn no_prompt_names_the_missing_value() {
        let err = NoPrompt.ask("Host").unwrap_err();
        assert!(err.to_string().starts_with("Host is required"));
    }
}
