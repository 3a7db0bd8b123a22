use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().and_then(|n| n.to_str()) == Some("target") {
                    continue;
                }
                collect_rs_files(&path, out);
            } else if path.extension().and_then(|ext| ext.to_str()) == Some("rs") {
                out.push(path);
            }
        }
    }
}

#[test]
fn workspace_never_spawns_processes() {
    // crates/trimpad-ui -> crates
    let crates_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("crate lives under crates/");
    let mut files = Vec::new();
    collect_rs_files(crates_dir, &mut files);
    assert!(!files.is_empty());

    let needles = [concat!("Command", "::new"), concat!("std::process", "::Command")];
    let mut offenders = Vec::new();
    for file in files {
        let content = fs::read_to_string(&file).unwrap_or_else(|_| String::new());
        for (idx, line) in content.lines().enumerate() {
            if needles.iter().any(|needle| line.contains(needle)) {
                offenders.push(format!("{}:{}", file.display(), idx + 1));
            }
        }
    }

    assert!(
        offenders.is_empty(),
        "Launchers are paused with signals, never by running commands. Offenders: {offenders:?}"
    );
}
