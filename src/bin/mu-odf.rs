use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

use mu_odf::{
    FileEntry, OdfError, OdfPackage, OdfPackageBuilder, ValidationFinding, ValidationReport,
};

#[derive(Clone, Debug)]
enum Json {
    Null,
    Bool(bool),
    Num(u64),
    Str(String),
    Arr(Vec<Json>),
    Obj(Vec<(String, Json)>),
}

impl Json {
    fn render(&self, pretty: bool) -> String {
        let mut out = String::new();
        self.write_into(&mut out, pretty, 0);
        out
    }

    fn write_into(&self, out: &mut String, pretty: bool, depth: usize) {
        match self {
            Json::Null => out.push_str("null"),
            Json::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Json::Num(v) => out.push_str(&v.to_string()),
            Json::Str(v) => write_json_string(out, v),
            Json::Arr(items) => {
                out.push('[');
                if !items.is_empty() && pretty {
                    out.push('\n');
                }
                for (idx, item) in items.iter().enumerate() {
                    if pretty {
                        write_indent(out, depth + 1);
                    }
                    item.write_into(out, pretty, depth + 1);
                    if idx + 1 != items.len() {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if !items.is_empty() && pretty {
                    write_indent(out, depth);
                }
                out.push(']');
            }
            Json::Obj(fields) => {
                out.push('{');
                if !fields.is_empty() && pretty {
                    out.push('\n');
                }
                for (idx, (key, value)) in fields.iter().enumerate() {
                    if pretty {
                        write_indent(out, depth + 1);
                    }
                    write_json_string(out, key);
                    out.push(':');
                    if pretty {
                        out.push(' ');
                    }
                    value.write_into(out, pretty, depth + 1);
                    if idx + 1 != fields.len() {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if !fields.is_empty() && pretty {
                    write_indent(out, depth);
                }
                out.push('}');
            }
        }
    }
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c <= '\u{1f}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut rest = args.into_iter().skip(1).collect::<Vec<_>>();
    let pretty = pop_flag(&mut rest, "--pretty");

    if rest.is_empty() || rest[0] == "--help" || rest[0] == "-h" {
        print_help();
        return Ok(());
    }

    let cmd = rest.remove(0);
    match cmd.as_str() {
        "info" => {
            let path = first_arg(&rest, "info requires <package_path>")?;
            let pkg = OdfPackage::load_file(&path).map_err(display_err)?;
            let documents = pkg.document_paths(None, None).map_err(display_err)?;
            let files = pkg.file_entries().map_err(display_err)?;
            let output = Json::Obj(vec![
                ("package".to_string(), Json::Str(path)),
                (
                    "media_type".to_string(),
                    opt_str(pkg.media_type().map_err(display_err)?),
                ),
                ("base_uri".to_string(), opt_str(pkg.base_uri())),
                ("entry_count".to_string(), Json::Num(files.len() as u64)),
                (
                    "documents".to_string(),
                    Json::Arr(
                        documents
                            .iter()
                            .map(|doc| {
                                Json::Obj(vec![
                                    ("path".to_string(), Json::Str(doc.clone())),
                                    (
                                        "media_type".to_string(),
                                        opt_str(pkg.media_type_of(doc).ok().flatten()),
                                    ),
                                ])
                            })
                            .collect(),
                    ),
                ),
            ]);
            println!("{}", output.render(pretty));
        }
        "list" => {
            let mut args = rest;
            let ndjson = pop_flag(&mut args, "--ndjson");
            let path = first_arg(&args, "list requires <package_path>")?;
            let pkg = OdfPackage::load_file(&path).map_err(display_err)?;
            let manifest = pkg.manifest().map_err(display_err)?;
            let entries: Vec<Json> = manifest.entries().map(file_entry_json).collect();
            if ndjson {
                for entry in entries {
                    println!("{}", entry.render(false));
                }
            } else {
                let output = Json::Obj(vec![
                    ("package".to_string(), Json::Str(path)),
                    ("entries".to_string(), Json::Arr(entries)),
                ]);
                println!("{}", output.render(pretty));
            }
        }
        "validate" => {
            let mut args = rest;
            let strict = pop_flag(&mut args, "--strict");
            let path = first_arg(&args, "validate requires <package_path>")?;
            let report = ValidationReport::shared();
            let loaded = OdfPackageBuilder::new()
                .error_handler(report.clone())
                .load_file(&path);
            let report = report
                .lock()
                .map_err(|_| "validation report lock poisoned".to_string())?
                .clone();

            let output = Json::Obj(vec![
                ("package".to_string(), Json::Str(path.clone())),
                ("valid".to_string(), Json::Bool(report.is_valid() && loaded.is_ok())),
                (
                    "error_count".to_string(),
                    Json::Num(report.error_count() as u64),
                ),
                (
                    "warning_count".to_string(),
                    Json::Num(report.warning_count() as u64),
                ),
                (
                    "load_error".to_string(),
                    loaded
                        .as_ref()
                        .err()
                        .map_or(Json::Null, |err| Json::Str(err.to_string())),
                ),
                (
                    "findings".to_string(),
                    Json::Arr(report.findings().iter().map(finding_json).collect()),
                ),
            ]);
            println!("{}", output.render(pretty));

            let has_failures = loaded.is_err()
                || if strict {
                    report.error_count() > 0 || report.warning_count() > 0
                } else {
                    report.error_count() > 0
                };
            if has_failures {
                return Err(if strict {
                    "validation failed (strict mode)".to_string()
                } else {
                    "validation failed".to_string()
                });
            }
        }
        "cat" => {
            let mut args = rest;
            let original = pop_flag(&mut args, "--original");
            if args.len() < 2 {
                return Err("cat requires <package_path> <entry_path>".to_string());
            }
            let mut pkg = OdfPackage::load_file(&args[0]).map_err(display_err)?;
            let bytes = if original {
                pkg.original_bytes(&args[1])
            } else {
                pkg.bytes(&args[1])
            }
            .map_err(display_err)?
            .ok_or_else(|| format!("no entry '{}' in {}", args[1], args[0]))?;
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|()| stdout.flush())
                .map_err(|e| e.to_string())?;
        }
        "repack" => {
            if rest.len() < 2 {
                return Err("repack requires <input_path> <output_path>".to_string());
            }
            let mut pkg = OdfPackage::load_file(&rest[0]).map_err(display_err)?;
            let flushed = pkg.flush_trees(None).map_err(display_err)?;
            pkg.save_file(&rest[1]).map_err(display_err)?;
            let output = Json::Obj(vec![
                ("input".to_string(), Json::Str(rest[0].clone())),
                ("output".to_string(), Json::Str(rest[1].clone())),
                (
                    "entry_count".to_string(),
                    Json::Num(pkg.file_entries().map_err(display_err)?.len() as u64),
                ),
                ("flushed_trees".to_string(), Json::Num(flushed.len() as u64)),
            ]);
            println!("{}", output.render(pretty));
        }
        _ => {
            return Err(format!(
                "unknown command '{}'; run `mu-odf --help` for usage",
                cmd
            ));
        }
    }

    Ok(())
}

fn first_arg(args: &[String], msg: &str) -> Result<String, String> {
    args.first().cloned().ok_or_else(|| msg.to_string())
}

fn pop_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn opt_str(value: Option<&str>) -> Json {
    value.map_or(Json::Null, |v| Json::Str(v.to_string()))
}

fn file_entry_json(entry: &FileEntry) -> Json {
    Json::Obj(vec![
        ("path".to_string(), Json::Str(entry.path.clone())),
        ("media_type".to_string(), opt_str(entry.media_type())),
        ("size".to_string(), entry.size.map_or(Json::Null, Json::Num)),
        ("version".to_string(), opt_str(entry.version.as_deref())),
        ("encrypted".to_string(), Json::Bool(entry.encryption.is_some())),
    ])
}

fn finding_json(finding: &ValidationFinding) -> Json {
    Json::Obj(vec![
        ("code".to_string(), Json::Str(finding.code.to_string())),
        (
            "severity".to_string(),
            Json::Str(finding.severity.as_str().to_string()),
        ),
        ("message".to_string(), Json::Str(finding.message.clone())),
        ("path".to_string(), opt_str(finding.path.as_deref())),
    ])
}

fn display_err(err: OdfError) -> String {
    err.to_string()
}

fn print_help() {
    let help = r#"mu-odf - inspect and repack OpenDocument packages

USAGE:
  mu-odf [--pretty] <command> [args...]

COMMANDS:
  info <package_path>
  list <package_path> [--ndjson]
  validate <package_path> [--strict]
  cat <package_path> <entry_path> [--original]
  repack <input_path> <output_path>

NOTES:
  - Output is JSON by default.
  - `cat` writes the raw entry bytes to stdout.
  - `cat --original` ignores edits and reads the archive as loaded.
  - `repack` rewrites the package with `mimetype` first and a fresh manifest.
"#;
    println!("{}", help);
}
