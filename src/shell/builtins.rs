use std::env;
use std::path::{Path, PathBuf};

use super::get_shell_state;

/// Get a builtin function by name
///
/// Builtins run in the host process so that they affect the runtime too:
/// the runtime's working directory is the process's.
pub fn get_builtin(name: &str) -> Option<fn(&[String]) -> i32> {
    match name {
        "cd" => Some(cd),
        "pwd" => Some(pwd),
        _ => None,
    }
}

/// Expand a leading `~` or `~/` against `home`
pub fn expand_tilde(path: &str, home: Option<&Path>) -> Option<PathBuf> {
    if path == "~" {
        return home.map(Path::to_path_buf);
    }
    match path.strip_prefix("~/") {
        Some(rest) => home.map(|h| h.join(rest)),
        // ~user syntax is taken literally
        None => Some(PathBuf::from(path)),
    }
}

/// Change the current working directory and print the new one
///
/// Args:
///   - [] -> change to HOME
///   - ["-"] -> change to the previous directory
///   - [path] -> change to path
pub fn cd(args: &[String]) -> i32 {
    if args.len() > 1 {
        eprintln!("cd: too many arguments");
        return 1;
    }

    let home = home::home_dir();
    let target = match args.first().map(String::as_str) {
        None => match home {
            Some(h) => h,
            None => {
                eprintln!("cd: HOME not set");
                return 1;
            }
        },
        Some("-") => {
            let previous = get_shell_state().read().map(|s| s.previous_dir.clone());
            match previous {
                Ok(Some(dir)) => dir,
                _ => {
                    eprintln!("cd: OLDPWD not set");
                    return 1;
                }
            }
        }
        Some(path) => match expand_tilde(path, home.as_deref()) {
            Some(p) => p,
            None => {
                eprintln!("cd: HOME not set");
                return 1;
            }
        },
    };

    // Store current directory as the previous one before changing
    let current_dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("cd: cannot get current directory: {}", e);
            return 1;
        }
    };

    if let Err(e) = env::set_current_dir(&target) {
        eprintln!("cd: {}: {}", target.display(), e);
        return 1;
    }

    if let Ok(mut state) = get_shell_state().write() {
        state.previous_dir = Some(current_dir);
    }

    match env::current_dir() {
        Ok(dir) => {
            println!("{}", dir.display());
            0
        }
        Err(e) => {
            eprintln!("cd: cannot get new directory: {}", e);
            1
        }
    }
}

/// Print the current working directory
pub fn pwd(args: &[String]) -> i32 {
    if !args.is_empty() {
        eprintln!("pwd: too many arguments");
        return 1;
    }

    match env::current_dir() {
        Ok(dir) => {
            println!("{}", dir.display());
            0
        }
        Err(e) => {
            eprintln!("pwd: {}", e);
            1
        }
    }
}
