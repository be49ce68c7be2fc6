//! `page-shot <url> <output-path>`: save a full-page screenshot of a web page.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;

/// Exit status for a missing argument.
const USAGE_EXIT_CODE: i32 = 1;

/// Save a full-page screenshot of a web page using headless Chrome
#[derive(Parser, Debug)]
#[command(name = "page-shot")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Page to render
    #[arg(allow_hyphen_values = true)]
    url: Option<String>,

    /// Image file to write (.png, .jpg/.jpeg or .webp), replaced if present
    #[arg(allow_hyphen_values = true)]
    output: Option<String>,

    /// Ignored
    #[arg(hide = true, num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

/// Why the command cannot start.
#[derive(Debug, PartialEq, Eq)]
enum Usage {
    MissingUrl,
    MissingOutput,
}

impl Usage {
    fn message(&self) -> &'static str {
        match self {
            Usage::MissingUrl => "Please provide a URL to screenshot",
            Usage::MissingOutput => "Please provide a filename to save the screenshot",
        }
    }
}

impl Cli {
    /// Empty strings count as missing.
    fn into_args(self) -> std::result::Result<(String, PathBuf), Usage> {
        let url = self
            .url
            .filter(|s| !s.is_empty())
            .ok_or(Usage::MissingUrl)?;
        let output = self
            .output
            .filter(|s| !s.is_empty())
            .ok_or(Usage::MissingOutput)?;
        Ok((url, PathBuf::from(output)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let (url, output) = match cli.into_args() {
        Ok(args) => args,
        Err(usage) => {
            println!("{}", usage.message());
            std::process::exit(USAGE_EXIT_CODE);
        }
    };

    cdp_page_shot::capture::run(&url, &output).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<(String, PathBuf), Usage> {
        Cli::try_parse_from(std::iter::once("page-shot").chain(args.iter().copied()))
            .unwrap()
            .into_args()
    }

    #[test]
    fn url_is_required_first() {
        assert_eq!(parse(&[]), Err(Usage::MissingUrl));
    }

    #[test]
    fn output_is_required_second() {
        assert_eq!(parse(&["https://example.com"]), Err(Usage::MissingOutput));
    }

    #[test]
    fn empty_url_is_missing() {
        assert_eq!(parse(&["", "out.png"]), Err(Usage::MissingUrl));
    }

    #[test]
    fn empty_output_is_missing() {
        assert_eq!(parse(&["https://example.com", ""]), Err(Usage::MissingOutput));
    }

    #[test]
    fn leading_hyphen_is_a_url() {
        let (url, output) = parse(&["-x", "out.png"]).unwrap();
        assert_eq!((url.as_str(), output), ("-x", PathBuf::from("out.png")));
    }

    #[test]
    fn both_arguments() {
        let (url, output) = parse(&["https://example.com", "out.png"]).unwrap();
        assert_eq!(url, "https://example.com");
        assert_eq!(output, PathBuf::from("out.png"));
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let (url, output) = parse(&["http://a", "b.png", "c", "--d"]).unwrap();
        assert_eq!((url.as_str(), output), ("http://a", PathBuf::from("b.png")));
    }

    #[test]
    fn messages() {
        assert!(Usage::MissingUrl.message().contains("URL"));
        assert!(Usage::MissingOutput.message().contains("filename"));
    }
}
