use cellflow_compiler::{
    check_object_type, derived_resources_class, load_config, object_type_meta,
    program_src_with_config, recover_project, CompileError, CompilerConfig,
};
use cellflow_model::{ObjectTypeCatalog, Project, Scene};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let Some(command) = args.get(1).map(String::as_str) else {
        print_usage();
        std::process::exit(2);
    };

    let result = match command {
        "inspect" => inspect_command(&args, &cwd),
        "check" => check_command(&args, &cwd),
        "emit" => emit_command(&args, &cwd),
        "recover" => recover_command(&args, &cwd),
        "resources" => resources_command(&args, &cwd),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cellflow inspect <object_type.py>          # print the type and its actions as JSON");
    eprintln!("  cellflow check <object_type.py>            # validate an object type source");
    eprintln!("  cellflow emit --project <p.json> --scene <s.json> [--types <dir>] [--built-ins <dir>] [--out <script.py>]");
    eprintln!("  cellflow recover --project <p.json> --script <script.py> [--out <p.json>]");
    eprintln!("  cellflow resources --project <p.json> [--out <resources.py>]");
    eprintln!();
    eprintln!("  --path <dir> selects the directory holding cellflow.toml (default: current dir)");
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).cloned()
}

fn required_flag(args: &[String], flag: &str) -> Result<String, String> {
    parse_flag_value(args, flag).ok_or_else(|| {
        print_usage();
        format!("missing required flag `{flag}`")
    })
}

fn positional(args: &[String], what: &str) -> Result<String, String> {
    args.get(2)
        .filter(|a| !a.starts_with('-'))
        .cloned()
        .ok_or_else(|| {
            print_usage();
            format!("missing {what}")
        })
}

fn resolve(input: &str, cwd: &Path) -> PathBuf {
    let path = PathBuf::from(input);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

fn config_root(args: &[String], cwd: &Path) -> PathBuf {
    parse_flag_value(args, "--path")
        .map(|p| resolve(&p, cwd))
        .unwrap_or_else(|| cwd.to_path_buf())
}

fn compile_error(path: &Path, err: CompileError) -> String {
    if err.is_internal() {
        format!("{}: internal compiler error: {err}", path.display())
    } else {
        format!("{}: {err} [{}]", path.display(), err.kind())
    }
}

fn read_text(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("failed to read {}: {err}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|err| format!("invalid JSON in {}: {err}", path.display()))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| format!("failed to serialize JSON: {err}"))
}

/// Prints `text` or writes it to `--out` when given.
fn output(args: &[String], cwd: &Path, text: &str) -> Result<(), String> {
    match parse_flag_value(args, "--out") {
        Some(out) => {
            let out = resolve(&out, cwd);
            fs::write(&out, text).map_err(|err| format!("failed to write {}: {err}", out.display()))?;
            info!("wrote {}", out.display());
            Ok(())
        }
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

/// Writes a generated program and marks it executable.
fn write_script(path: &Path, text: &str) -> io::Result<()> {
    fs::write(path, text)?;
    make_executable(path)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Inspects every `*.py` file of `dir` into `catalog`, in file name order.
fn load_catalog_into(catalog: &mut ObjectTypeCatalog, dir: &Path) -> Result<(), String> {
    let entries =
        fs::read_dir(dir).map_err(|err| format!("failed to read {}: {err}", dir.display()))?;
    let mut sources: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "py")
                && path.file_name().is_some_and(|name| name != "__init__.py")
        })
        .collect();
    sources.sort();

    for path in sources {
        let source = read_text(&path)?;
        let meta = object_type_meta(&source).map_err(|err| compile_error(&path, err))?;
        debug!("loaded object type {} from {}", meta.object_type.name, path.display());
        catalog.insert(meta);
    }
    Ok(())
}

/// Built-in type sources (when present) followed by the project's own types.
fn load_project_catalog(
    built_ins_dir: &Path,
    types_dir: &Path,
) -> Result<ObjectTypeCatalog, String> {
    let mut catalog = ObjectTypeCatalog::new();
    if built_ins_dir.is_dir() {
        load_catalog_into(&mut catalog, built_ins_dir)?;
    } else {
        debug!("no built-in type sources in {}", built_ins_dir.display());
    }
    load_catalog_into(&mut catalog, types_dir)?;
    Ok(catalog)
}

fn inspect_command(args: &[String], cwd: &Path) -> Result<(), String> {
    let path = resolve(&positional(args, "object type source")?, cwd);
    let meta = object_type_meta(&read_text(&path)?).map_err(|err| compile_error(&path, err))?;
    println!("{}", to_json(&meta)?);
    Ok(())
}

fn check_command(args: &[String], cwd: &Path) -> Result<(), String> {
    let path = resolve(&positional(args, "object type source")?, cwd);
    check_object_type(&read_text(&path)?).map_err(|err| compile_error(&path, err))?;
    println!("{}: ok", path.display());
    Ok(())
}

fn load_compiler_config(args: &[String], cwd: &Path) -> Result<(PathBuf, CompilerConfig), String> {
    let root = config_root(args, cwd);
    let config = load_config(&root)
        .map_err(|err| format!("failed to load config from {}: {err}", root.display()))?;
    Ok((root, config))
}

fn emit_command(args: &[String], cwd: &Path) -> Result<(), String> {
    let project_path = resolve(&required_flag(args, "--project")?, cwd);
    let scene_path = resolve(&required_flag(args, "--scene")?, cwd);
    let (root, config) = load_compiler_config(args, cwd)?;
    let types_dir = parse_flag_value(args, "--types")
        .map(|p| resolve(&p, cwd))
        .unwrap_or_else(|| root.join(&config.object_types_dir));
    let built_ins_dir = parse_flag_value(args, "--built-ins")
        .map(|p| resolve(&p, cwd))
        .unwrap_or_else(|| root.join(&config.built_in_types_dir));

    let project: Project = read_json(&project_path)?;
    let scene: Scene = read_json(&scene_path)?;
    let catalog = load_project_catalog(&built_ins_dir, &types_dir)?;

    let script = program_src_with_config(&project, &scene, &catalog, &config)
        .map_err(|err| compile_error(&project_path, err))?;

    match parse_flag_value(args, "--out") {
        Some(out) => {
            let out = resolve(&out, cwd);
            write_script(&out, &script)
                .map_err(|err| format!("failed to write {}: {err}", out.display()))?;
            info!("wrote {}", out.display());
            Ok(())
        }
        None => {
            print!("{script}");
            Ok(())
        }
    }
}

fn recover_command(args: &[String], cwd: &Path) -> Result<(), String> {
    let project_path = resolve(&required_flag(args, "--project")?, cwd);
    let script_path = resolve(&required_flag(args, "--script")?, cwd);

    let mut project: Project = read_json(&project_path)?;
    let source = read_text(&script_path)?;
    recover_project(&source, &mut project).map_err(|err| compile_error(&script_path, err))?;

    let mut json = to_json(&project)?;
    json.push('\n');
    output(args, cwd, &json)
}

fn resources_command(args: &[String], cwd: &Path) -> Result<(), String> {
    let project_path = resolve(&required_flag(args, "--project")?, cwd);
    let project: Project = read_json(&project_path)?;
    let text = derived_resources_class(&project.id, &project.parameters)
        .map_err(|err| compile_error(&project_path, err))?;
    output(args, cwd, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static TEST_DIR_SEQ: AtomicU64 = AtomicU64::new(0);

    fn temp_test_dir() -> PathBuf {
        let seq = TEST_DIR_SEQ.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("cellflow_cli_test_{pid}_{nonce}_{seq}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn load_catalog_reads_python_sources_only() {
        let dir = temp_test_dir();
        fs::write(
            dir.join("robot.py"),
            "class Robot:\n    @action\n    def home(self) -> None:\n        pass\n\n    home.__action__ = ActionMetadata()\n",
        )
        .unwrap();
        fs::write(dir.join("__init__.py"), "").unwrap();
        fs::write(dir.join("notes.txt"), "not python").unwrap();

        let catalog = load_catalog(&dir).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.actions_of("Robot").unwrap()[0].name, "home");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_catalog_names_the_broken_file() {
        let dir = temp_test_dir();
        fs::write(dir.join("broken.py"), "x = 1\n").unwrap();
        let err = load_catalog(&dir).unwrap_err();
        assert!(err.contains("broken.py"));
        assert!(err.contains("no_class_definition"));
        let _ = fs::remove_dir_all(dir);
    }

    fn load_catalog(dir: &Path) -> Result<ObjectTypeCatalog, String> {
        let mut catalog = ObjectTypeCatalog::new();
        load_catalog_into(&mut catalog, dir)?;
        Ok(catalog)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn emit_uses_built_in_type_sources() {
        let root = temp_test_dir();
        fs::create_dir_all(root.join("object_types")).unwrap();
        fs::create_dir_all(root.join("built_in_types")).unwrap();
        fs::write(
            root.join("built_in_types").join("robot.py"),
            "class Robot(Generic):\n    @action\n    def home(self) -> None:\n        pass\n\n    home.__action__ = ActionMetadata()\n",
        )
        .unwrap();
        fs::write(
            root.join("project.json"),
            r#"{"id": "demo", "sceneId": "cell", "actions": [
                {"id": "home1", "type": "robot/home", "inputs": ["start"], "outputs": ["end"]}
            ]}"#,
        )
        .unwrap();
        fs::write(
            root.join("scene.json"),
            r#"{"id": "cell", "objects": [{"id": "robot", "type": "Robot"}]}"#,
        )
        .unwrap();

        emit_command(
            &args(&[
                "cellflow", "emit", "--project", "project.json", "--scene", "scene.json",
                "--out", "script.py",
            ]),
            &root,
        )
        .unwrap();
        let script = fs::read_to_string(root.join("script.py")).unwrap();
        assert!(script.contains("from arcor2.object_types import Robot\n"));
        assert!(script.contains("    robot: Robot = res.objects['robot']\n"));
        assert!(script.contains("        robot.home(**res.home1)\n"));

        // without the built-in sources the type is unknown
        fs::remove_dir_all(root.join("built_in_types")).unwrap();
        let err = emit_command(
            &args(&["cellflow", "emit", "--project", "project.json", "--scene", "scene.json"]),
            &root,
        )
        .unwrap_err();
        assert!(err.contains("unknown_object_type"), "{err}");
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn write_script_marks_file_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_test_dir();
        let path = dir.join("script.py");
        write_script(&path, "#!/usr/bin/env python3\n").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn read_json_reports_the_path() {
        let dir = temp_test_dir();
        let path = dir.join("project.json");
        fs::write(&path, "{\"id\": 1}").unwrap();
        let err = read_json::<Project>(&path).unwrap_err();
        assert!(err.starts_with("invalid JSON in "));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn parse_flag_value_takes_the_next_argument() {
        let args: Vec<String> = ["cellflow", "emit", "--project", "p.json", "--out"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parse_flag_value(&args, "--project").as_deref(), Some("p.json"));
        assert_eq!(parse_flag_value(&args, "--out"), None);
        assert!(required_flag(&args, "--scene").is_err());
    }
}
