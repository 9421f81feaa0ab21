use std::env;
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

use fetchcrunch_web::{CrunchConfig, FetchCrunch, Payload};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Crunch(CliOptions),
    Help,
    Version,
}

/// Flags given on the command line. Anything left unset falls back to the
/// config file, then to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliOptions {
    config: Option<PathBuf>,
    template: Option<String>,
    iterations: Option<u32>,
    direct_eval: bool,
    empty_url: bool,
}

impl CliOptions {
    fn into_config(self) -> Result<CrunchConfig, String> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
                CrunchConfig::from_json(&text)
                    .map_err(|e| format!("failed to parse {}: {e}", path.display()))?
            }
            None => CrunchConfig::default(),
        };

        if let Some(template) = self.template {
            config.template = template;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        config.direct_eval |= self.direct_eval;
        config.empty_url |= self.empty_url;
        Ok(config)
    }
}

pub async fn run_from_env() -> Result<(), String> {
    run_from_args(env::args().skip(1).collect()).await
}

pub async fn run_from_args(args: Vec<String>) -> Result<(), String> {
    match parse_command(args)? {
        CliCommand::Help => {
            println!("{}", help_text());
            Ok(())
        }
        CliCommand::Version => {
            println!("fetchcrunch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Crunch(options) => {
            init_tracing();
            let config = options.into_config()?;
            let script = read_script().await?;
            let document = crunch_script(config, script).await?;

            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(&document)
                .await
                .map_err(|e| format!("failed to write document: {e}"))?;
            stdout
                .flush()
                .await
                .map_err(|e| format!("failed to write document: {e}"))
        }
    }
}

/// Crunches `script` with the flate2 codec.
pub async fn crunch_script(config: CrunchConfig, script: Vec<u8>) -> Result<Vec<u8>, String> {
    let script = trim_script(&script);
    let payload = match std::str::from_utf8(script) {
        Ok(text) => Payload::from(text),
        Err(_) => Payload::from(script),
    };
    FetchCrunch::with_config(config)
        .crunch(payload)
        .await
        .map_err(|e| e.to_string())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn read_script() -> Result<Vec<u8>, String> {
    if std::io::stdin().is_terminal() {
        eprintln!("Paste the script, then press Ctrl-D:");
    }
    let mut script = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut script)
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(script)
}

/// Statement separators at either end only cost bytes.
fn trim_script(script: &[u8]) -> &[u8] {
    let trimmed = |b: &u8| b == &b';' || b.is_ascii_whitespace();
    let start = script.iter().position(|b| !trimmed(b)).unwrap_or(script.len());
    let end = script
        .iter()
        .rposition(|b| !trimmed(b))
        .map_or(start, |at| at + 1);
    &script[start..end]
}

fn parse_command(args: Vec<String>) -> Result<CliCommand, String> {
    let mut options = CliOptions::default();

    let mut i = 0usize;
    while i < args.len() {
        let token = args[i].as_str();
        match token {
            "--help" | "-h" => return Ok(CliCommand::Help),
            "--version" | "-V" => return Ok(CliCommand::Version),
            "--direct-eval" => options.direct_eval = true,
            "--empty-url" => options.empty_url = true,
            x if x.starts_with("--template=") => {
                options.template = Some(x["--template=".len()..].to_string());
            }
            x if x.starts_with("--config=") => {
                let path = &x["--config=".len()..];
                if path.is_empty() {
                    return Err("--config requires a file".to_string());
                }
                options.config = Some(PathBuf::from(path));
            }
            x if x.starts_with("--iterations=") => {
                let value = &x["--iterations=".len()..];
                let iterations = value
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid iterations: {value}"))?;
                options.iterations = Some(iterations);
            }
            x if x.starts_with('-') => {
                return Err(format!("unknown flag: {x}\n\n{}", help_text()));
            }
            x => return Err(format!("unexpected argument: {x}\n\n{}", help_text())),
        }
        i += 1;
    }

    Ok(CliCommand::Crunch(options))
}

fn help_text() -> String {
    [
        "fetchcrunch",
        "",
        "Reads a script from stdin and writes a self-extracting HTML document to stdout.",
        "",
        "Usage:",
        "  fetchcrunch [OPTIONS] < script.js > index.html",
        "",
        "Options:",
        "  --template=HTML     wrapper markup with one __bootstrap__ attribute value",
        "                      (default: <svg onload=__bootstrap__>)",
        "  --iterations=N      compressor effort hint (default: 50)",
        "  --direct-eval       use eval(s) instead of (0,eval)(s)",
        "  --empty-url         fetch `` instead of `#`",
        "  --config=FILE       JSON config; flags override its values",
        "  --version           print the version",
        "  --help              print this help",
        "",
        "Logging goes to stderr and follows RUST_LOG (default: warn).",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_crunches_with_defaults() {
        assert_eq!(
            parse_command(Vec::new()),
            Ok(CliCommand::Crunch(CliOptions::default()))
        );
    }

    #[test]
    fn flags_are_parsed() {
        let command = parse_command(args(&[
            "--template=<body onload=\"__bootstrap__\">",
            "--iterations=15",
            "--direct-eval",
            "--empty-url",
            "--config=crunch.json",
        ]))
        .expect("valid flags");
        assert_eq!(
            command,
            CliCommand::Crunch(CliOptions {
                config: Some(PathBuf::from("crunch.json")),
                template: Some("<body onload=\"__bootstrap__\">".to_string()),
                iterations: Some(15),
                direct_eval: true,
                empty_url: true,
            })
        );
    }

    #[test]
    fn help_and_version_win() {
        assert_eq!(parse_command(args(&["--direct-eval", "--help"])), Ok(CliCommand::Help));
        assert_eq!(parse_command(args(&["--version"])), Ok(CliCommand::Version));
    }

    #[test]
    fn invalid_flags_are_rejected() {
        assert!(parse_command(args(&["--iterations=0"])).is_err());
        assert!(parse_command(args(&["--iterations=many"])).is_err());
        assert!(parse_command(args(&["--config="])).is_err());
        assert!(parse_command(args(&["--minify"])).is_err());
        assert!(parse_command(args(&["script.js"])).is_err());
    }

    #[test]
    fn flags_override_the_config_file() {
        let path = env::temp_dir().join(format!("fetchcrunch-cli-{}.json", std::process::id()));
        fs::write(&path, r#"{"template":"<body onload=__bootstrap__>","iterations":7,"emptyUrl":true}"#)
            .expect("write config");

        let config = CliOptions {
            config: Some(path.clone()),
            iterations: Some(3),
            direct_eval: true,
            ..CliOptions::default()
        }
        .into_config()
        .expect("valid config");
        fs::remove_file(&path).ok();

        assert_eq!(config.template, "<body onload=__bootstrap__>");
        assert_eq!(config.iterations, 3);
        assert!(config.direct_eval);
        assert!(config.empty_url);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let options = CliOptions {
            config: Some(PathBuf::from("/nonexistent/fetchcrunch.json")),
            ..CliOptions::default()
        };
        assert!(options.into_config().is_err());
    }

    #[test]
    fn script_is_trimmed() {
        assert_eq!(trim_script(b"  ;alert(1);;\n"), b"alert(1)");
        assert_eq!(trim_script(b";\n; "), b"");
        assert_eq!(trim_script(b"a; b"), b"a; b");
    }

    #[tokio::test]
    async fn crunched_script_inflates_to_the_trimmed_input() {
        let document = crunch_script(CrunchConfig::default(), b"alert(1);\n".to_vec())
            .await
            .expect("crunches");

        let mut inflated = Vec::new();
        flate2::read::DeflateDecoder::new(document.as_slice())
            .read_to_end(&mut inflated)
            .expect("raw deflate");
        assert!(inflated.ends_with(b"\nalert(1)"));
    }
}
