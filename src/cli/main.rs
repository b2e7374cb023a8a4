//! # twoway CLI
//!
//! Parses a template file, builds it against a JSON environment, and prints
//! the placeholder SQL, the formatted SQL, and the bound parameters.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twoway::{Environment, LiteralFormatter, PreparedSql, StandardFormatter, TemplateError};

const DEFAULT_LOG_FILTER: &str = "twoway=info";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    template_path: Option<String>,
    env_path: Option<String>,
    env_json: Option<String>,
    json_output: bool,
    show_help: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let exit_code = run(std::env::args_os(), &mut stdout, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run<I, W, E>(args: I, out: &mut W, err: &mut E) -> i32
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let options = match parse_args(args) {
        Ok(options) => options,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            let _ = write_usage(err);
            return 2;
        }
    };

    if options.show_help {
        if write_usage(out).is_err() {
            return 1;
        }
        return 0;
    }

    let Some(template_path) = options.template_path.as_deref() else {
        let _ = writeln!(err, "error: missing template path");
        let _ = write_usage(err);
        return 2;
    };

    let prepared = match prepare(template_path, &options) {
        Ok(prepared) => prepared,
        Err(error) => {
            let _ = writeln!(err, "error: {error}");
            return 1;
        }
    };

    let written = if options.json_output {
        serde_json::to_writer_pretty(&mut *out, &prepared)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(out))
    } else {
        write_prepared(out, &prepared)
    };
    if written.is_err() {
        return 1;
    }
    0
}

fn prepare(template_path: &str, options: &CliOptions) -> Result<PreparedSql, TemplateError> {
    let env = match (&options.env_path, &options.env_json) {
        (Some(path), _) => Environment::from_json_str(&fs::read_to_string(path)?)?,
        (None, Some(json)) => Environment::from_json_str(json)?,
        (None, None) => Environment::new(),
    };
    tracing::debug!(template = template_path, variables = env.len(), "building template");
    let node = twoway::parse_file(template_path)?;
    twoway::build(&node, &env)
}

fn parse_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut iter = args.into_iter();
    let _argv0 = iter.next();

    let mut options = CliOptions {
        template_path: None,
        env_path: None,
        env_json: None,
        json_output: false,
        show_help: false,
    };

    while let Some(argument) = iter.next() {
        let arg = argument.to_string_lossy();
        match arg.as_ref() {
            "-h" | "--help" => options.show_help = true,
            "--json" => options.json_output = true,
            "-e" | "--env" => {
                let next = iter
                    .next()
                    .ok_or_else(|| String::from("missing JSON file path for `-e/--env`"))?;
                set_env_path(&mut options, next.to_string_lossy().into_owned())?;
            }
            "--env-json" => {
                let next = iter
                    .next()
                    .ok_or_else(|| String::from("missing JSON argument for `--env-json`"))?;
                set_env_json(&mut options, next.to_string_lossy().into_owned())?;
            }
            other => {
                if let Some(value) = other.strip_prefix("--env=") {
                    set_env_path(&mut options, value.to_owned())?;
                    continue;
                }
                if let Some(value) = other.strip_prefix("--env-json=") {
                    set_env_json(&mut options, value.to_owned())?;
                    continue;
                }
                if other.starts_with('-') && other != "-" {
                    return Err(format!("unknown option `{other}`"));
                }
                if options.template_path.is_some() {
                    return Err(format!("unexpected argument `{other}`"));
                }
                options.template_path = Some(other.to_owned());
            }
        }
    }

    Ok(options)
}

fn set_env_path(options: &mut CliOptions, path: String) -> Result<(), String> {
    if options.env_path.is_some() || options.env_json.is_some() {
        return Err(String::from("the environment may only be provided once"));
    }
    options.env_path = Some(path);
    Ok(())
}

fn set_env_json(options: &mut CliOptions, json: String) -> Result<(), String> {
    if options.env_path.is_some() || options.env_json.is_some() {
        return Err(String::from("the environment may only be provided once"));
    }
    options.env_json = Some(json);
    Ok(())
}

fn write_prepared<W>(out: &mut W, prepared: &PreparedSql) -> io::Result<()>
where
    W: Write,
{
    writeln!(out, "-- raw")?;
    writeln!(out, "{}", prepared.raw_sql)?;
    writeln!(out, "-- formatted")?;
    writeln!(out, "{}", prepared.formatted_sql)?;
    writeln!(out, "-- parameters ({})", prepared.parameters.len())?;
    for parameter in &prepared.parameters {
        let mut literal = String::new();
        StandardFormatter.format_literal(&parameter.value, &mut literal);
        writeln!(
            out,
            "{}: {} ({}, template offset {})",
            parameter.index,
            literal,
            parameter.value.type_name(),
            parameter.source_offset
        )?;
    }
    Ok(())
}

fn write_usage<W>(out: &mut W) -> io::Result<()>
where
    W: Write,
{
    writeln!(
        out,
        "Usage: twoway TEMPLATE [-e|--env ENV.json | --env-json JSON] [--json]\n\
         \n\
         Builds a two-way SQL template and prints the prepared SQL.\n\
         \n\
         Examples:\n\
         \n\
         twoway query.sql\n\
         twoway query.sql -e params.json\n\
         twoway query.sql --env-json '{{\"name\": \"hoge\"}}' --json\n\
         \n\
         Set RUST_LOG (default `{DEFAULT_LOG_FILTER}`) to control diagnostics on stderr.",
    )
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::fs;

    use super::{parse_args, run};

    fn parse_from(args: &[&str]) -> Result<super::CliOptions, String> {
        let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        parse_args(os_args)
    }

    fn run_with(args: &[&str]) -> (i32, String, String) {
        let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = run(os_args, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).expect("stdout is utf-8"),
            String::from_utf8(err).expect("stderr is utf-8"),
        )
    }

    fn write_template(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, contents).expect("write template");
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn parse_args_template_and_env() {
        let options = parse_from(&["twoway", "q.sql", "-e", "env.json"]).expect("valid args");
        assert_eq!(options.template_path.as_deref(), Some("q.sql"));
        assert_eq!(options.env_path.as_deref(), Some("env.json"));
        assert!(!options.json_output);

        let options = parse_from(&["twoway", "--env-json={}", "--json", "q.sql"]).expect("valid args");
        assert_eq!(options.env_json.as_deref(), Some("{}"));
        assert!(options.json_output);
    }

    #[test]
    fn parse_args_rejects_two_environments() {
        let error = parse_from(&["twoway", "q.sql", "-e", "a.json", "--env-json", "{}"])
            .expect_err("two environments");
        assert!(error.contains("only be provided once"));
    }

    #[test]
    fn parse_args_rejects_unknown_option_and_extra_path() {
        assert!(parse_from(&["twoway", "--bogus"]).is_err());
        assert!(parse_from(&["twoway", "a.sql", "b.sql"]).is_err());
        assert!(parse_from(&["twoway", "-e"]).is_err());
    }

    #[test]
    fn help_exits_zero() {
        let (code, out, _) = run_with(&["twoway", "--help"]);
        assert_eq!(code, 0);
        assert!(out.starts_with("Usage: twoway"));
    }

    #[test]
    fn missing_template_is_usage_error() {
        let (code, _, err) = run_with(&["twoway"]);
        assert_eq!(code, 2);
        assert!(err.contains("missing template path"));
    }

    #[test]
    fn builds_template_with_inline_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_template(
            &dir,
            "q.sql",
            "select * from emp where /*%if name != null*/ename = /*name*/'x'/*%end*/\n",
        );
        let (code, out, err) = run_with(&["twoway", &path, "--env-json", r#"{"name": "it's"}"#]);
        assert_eq!(code, 0, "stderr: {err}");
        assert_eq!(
            out,
            "-- raw\n\
             select * from emp where ename = ?\n\
             -- formatted\n\
             select * from emp where ename = 'it''s'\n\
             -- parameters (1)\n\
             1: 'it''s' (string, template offset 52)\n"
        );
    }

    #[test]
    fn builds_template_with_env_file_as_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_template(&dir, "q.sql", "select * from t where id in /*ids*/(1)");
        let env = write_template(&dir, "env.json", r#"{"ids": [3, 4]}"#);
        let (code, out, _) = run_with(&["twoway", &path, "-e", &env, "--json"]);
        assert_eq!(code, 0);
        let json: serde_json::Value = serde_json::from_str(&out).expect("json output");
        assert_eq!(json["raw_sql"], "select * from t where id in (?, ?)");
        assert_eq!(json["parameters"][1]["value"], 4);
        assert_eq!(json["parameters"][1]["index"], 2);
    }

    #[test]
    fn template_errors_exit_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_template(&dir, "q.sql", "select 1 /*%if a*/x");
        let (code, _, err) = run_with(&["twoway", &path, "--env-json", r#"{"a": true}"#]);
        assert_eq!(code, 1);
        assert!(err.contains("TPL1104"), "stderr: {err}");

        let (code, _, err) = run_with(&["twoway", "/nonexistent/q.sql"]);
        assert_eq!(code, 1);
        assert!(err.contains("I/O error"));
    }

    #[test]
    fn invalid_env_json_exits_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_template(&dir, "q.sql", "select 1");
        let (code, _, err) = run_with(&["twoway", &path, "--env-json", "{not json"]);
        assert_eq!(code, 1);
        assert!(err.contains("invalid environment JSON"));
    }

    #[test]
    fn non_object_env_exits_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_template(&dir, "q.sql", "select * from t where id = /*id*/1");
        let (code, out, err) = run_with(&["twoway", &path, "--env-json", "[1,2]"]);
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert!(err.contains("TPL4002"), "stderr: {err}");
        assert!(err.contains("got list"), "stderr: {err}");
    }
}
